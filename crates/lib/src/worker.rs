//! Worker loop: pull one message, handle it to a terminal state, acknowledge, repeat.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::delivery::DeliveryConnector;
use crate::handler::{MessageHandler, Outcome};
use crate::llm::CompletionBackend;
use crate::queue::{QueueError, QueueMessage, Subscription};

/// Process-wide counters, shared with the health endpoint.
#[derive(Debug, Default)]
pub struct WorkerStats {
    received: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    acknowledged: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub delivered: u64,
    pub failed: u64,
    pub acknowledged: u64,
}

impl WorkerStats {
    pub fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered.fetch_add(1, Ordering::Relaxed),
            Outcome::Failed(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
        }
    }
}

/// Consume `subscription` until it ends, fails, or `shutdown` resolves.
///
/// Every message is acknowledged once the handler is done with it, whatever the outcome.
/// Shutdown is only observed between messages. A closed subscription is reported as
/// [`QueueError::Closed`]; a receive error is returned as-is.
pub async fn run_worker<S, B, C, F>(
    subscription: &mut S,
    handler: &MessageHandler<B, C>,
    stats: &WorkerStats,
    shutdown: F,
) -> Result<(), QueueError>
where
    S: Subscription,
    B: CompletionBackend,
    C: DeliveryConnector,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                log::info!("shutdown requested, worker loop stopping");
                return Ok(());
            }
            next = subscription.next_message() => next?,
        };
        let Some(message) = next else {
            return Err(QueueError::Closed);
        };
        stats.received.fetch_add(1, Ordering::Relaxed);

        let outcome = handler.handle(message.payload()).await;
        stats.record(&outcome);

        match subscription.acknowledge(&message).await {
            Ok(()) => {
                stats.acknowledged.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("{}", e),
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// Connect to Pulsar, start the health endpoint if configured, and run until shutdown.
#[cfg(feature = "pulsar")]
pub async fn run(settings: crate::config::Settings) -> anyhow::Result<()> {
    use std::sync::Arc;

    use crate::delivery::Relay;
    use crate::llm::OpenAiClient;

    log::debug!("settings: {:?}", settings);
    let mut subscription = crate::queue::connect_pulsar(&settings).await?;
    let backend = OpenAiClient::new(Some(settings.upstream_url.clone()), settings.api_key.clone());
    let handler = MessageHandler::new(backend, Relay::new());
    let stats = Arc::new(WorkerStats::default());

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let health = match settings.health_addr.as_deref() {
        Some(addr) => Some(
            crate::health::spawn_health(addr, settings.topic.clone(), stats.clone(), stop_rx)
                .await?,
        ),
        None => None,
    };

    log::info!(
        "relay worker consuming {} (subscription {})",
        settings.topic,
        settings.subscription
    );
    let result = run_worker(&mut subscription, &handler, &stats, shutdown_signal()).await;

    let _ = stop_tx.send(true);
    if let Some(task) = health {
        let _ = task.await;
    }
    let totals = stats.snapshot();
    log::info!(
        "relay worker stopped: received {}, delivered {}, failed {}, acknowledged {}",
        totals.received,
        totals.delivered,
        totals.failed,
        totals.acknowledged
    );
    result.map_err(Into::into)
}
