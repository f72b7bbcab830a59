//! Wiring of the shared state and the three long-running tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use beacon_core::{BroadcastLoop, EventQueue, LivenessMonitor, SubscriberRegistry};
use beacon_transport::{Transport, WebSocketConfig, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::fanout::{self, FanoutSettings};
use crate::ingest::{self, IngestSettings};
use crate::subscriptions;

/// A running Beacon instance.
pub struct Service {
    ingest_addr: SocketAddr,
    subscribe_addr: SocketAddr,
    queue: Arc<EventQueue>,
    registry: Arc<SubscriberRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Bind both listeners and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if either listener cannot be bound.
    pub async fn start(config: &Config) -> Result<Self> {
        let ingest_addr = config.ingest_addr()?;
        let listener = TcpListener::bind(ingest_addr)
            .await
            .with_context(|| format!("Failed to bind ingestion listener on {ingest_addr}"))?;
        let ingest_addr = listener.local_addr()?;

        let subscribe_addr = config.subscribe_addr()?;
        let transport = WebSocketTransport::new(WebSocketConfig {
            bind_addr: subscribe_addr,
            max_message_size: config.subscribe.max_message_size,
        })
        .await
        .with_context(|| format!("Failed to bind subscriber listener on {subscribe_addr}"))?;
        let subscribe_addr = transport
            .local_addr()
            .ok_or_else(|| anyhow!("Subscriber listener has no local address"))?;

        let queue = Arc::new(EventQueue::with_capacity(config.ingest.max_pending_events));
        let registry = Arc::new(SubscriberRegistry::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ingest_task = tokio::spawn(ingest::run_ingest_server(
            listener,
            Arc::clone(&queue),
            IngestSettings {
                limits: config.ingest.limits(),
                read_timeout: config.ingest.read_timeout(),
            },
            shutdown_rx.clone(),
        ));

        let subscribe_task = tokio::spawn(subscriptions::run_subscription_server(
            Arc::new(transport),
            Arc::clone(&registry),
            config.subscribe.outbox_capacity,
            shutdown_rx.clone(),
        ));

        let fanout_task = tokio::spawn(fanout::run_fanout(
            BroadcastLoop::new(Arc::clone(&queue), Arc::clone(&registry)),
            LivenessMonitor::new(Arc::clone(&registry), config.liveness.policy()),
            FanoutSettings {
                tick: config.broadcast.tick(),
                check_interval: config.liveness.check_interval(),
            },
            shutdown_rx,
        ));

        info!(%ingest_addr, %subscribe_addr, "Beacon started");

        Ok(Self {
            ingest_addr,
            subscribe_addr,
            queue,
            registry,
            shutdown: Arc::new(shutdown),
            tasks: vec![ingest_task, subscribe_task, fanout_task],
        })
    }

    #[must_use]
    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest_addr
    }

    #[must_use]
    pub fn subscribe_addr(&self) -> SocketAddr {
        self.subscribe_addr
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Handle that stops the service when set to `true`.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown)
    }

    /// Wait until every task has stopped.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Service task failed");
            }
        }
    }
}
