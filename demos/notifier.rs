//! Notification demo
//!
//! An in-process downstream that can be toggled between healthy and failing,
//! an SMS-style client calling it, and a circuit breaker proxy in front of
//! the client. A timed task sends a notification every second and another
//! flips the downstream every ten seconds, so the breaker cycles through all
//! of its states.
//!
//! Run with `cargo run --example notifier --features async`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripwire::{BreakerError, CircuitBreaker, ConfigResult, Counts, FailureRatio, TripPolicy};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const TOGGLE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("bad response: {0}")]
    BadResponse(u16),
}

/// Downstream service; answers 200 while enabled and 500 otherwise.
struct ExampleServer {
    enabled: AtomicBool,
}

impl ExampleServer {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    async fn handle(&self) -> u16 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.enabled.load(Ordering::SeqCst) {
            tracing::info!(target: "server", "responded with OK");
            200
        } else {
            tracing::info!(target: "server", "responded with Error");
            500
        }
    }

    fn toggle(&self) {
        let enabled = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        tracing::info!(target: "server", enabled, "toggled");
    }
}

trait NotificationClient {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(&self) -> Result<(), Self::Error>;
}

struct SmsClient {
    server: Arc<ExampleServer>,
}

impl SmsClient {
    fn new(server: Arc<ExampleServer>) -> Self {
        Self { server }
    }
}

impl NotificationClient for SmsClient {
    type Error = SendError;

    async fn send(&self) -> Result<(), SendError> {
        match self.server.handle().await {
            status @ 200..=299 => {
                tracing::debug!(status, "sms delivered");
                Ok(())
            }
            status => Err(SendError::BadResponse(status)),
        }
    }
}

fn should_be_switched_to_open(counts: &Counts) -> bool {
    FailureRatio::default().ready_to_trip(counts)
}

/// Guards another client with a circuit breaker.
struct ClientCircuitBreakerProxy<C: NotificationClient> {
    client: C,
    breaker: CircuitBreaker<fn(&Counts) -> bool, C::Error>,
}

impl<C: NotificationClient> ClientCircuitBreakerProxy<C> {
    fn new(client: C) -> ConfigResult<Self> {
        let breaker = CircuitBreaker::<FailureRatio, C::Error>::builder()
            .name("sms")
            .interval(Duration::from_secs(5))
            .timeout(Duration::from_secs(7))
            .policy(should_be_switched_to_open as fn(&Counts) -> bool)
            .on_state_change(|name, from, to| {
                tracing::info!(target: "breaker", breaker = name, %from, %to, "state changed");
            })
            .build()?;

        Ok(Self { client, breaker })
    }
}

impl<C: NotificationClient> NotificationClient for ClientCircuitBreakerProxy<C> {
    type Error = BreakerError<C::Error>;

    async fn send(&self) -> Result<(), Self::Error> {
        self.breaker.call_async(|| self.client.send()).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tripwire=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = Arc::new(ExampleServer::new());
    let client = ClientCircuitBreakerProxy::new(SmsClient::new(Arc::clone(&server)))?;

    let toggler = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TOGGLE_INTERVAL);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                server.toggle();
            }
        })
    };

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = client.send().await {
                    tracing::warn!(target: "main", error = %err, "caught an error");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "main", "shutting down");
                break;
            }
        }
    }

    toggler.abort();
    Ok(())
}
