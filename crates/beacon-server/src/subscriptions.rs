//! Subscriber accept loop.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::SubscriberRegistry;
use beacon_transport::Transport;
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};

use crate::session;

/// Accept subscribers until shutdown, then close every open session.
pub async fn run_subscription_server(
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriberRegistry>,
    outbox_capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Some(addr) = transport.local_addr() {
        info!("Subscriber endpoint listening on ws://{} ({})", addr, transport.name());
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accepted = transport.accept() => match accepted {
                Ok(pending) => {
                    let id = registry.next_id();
                    let peer = pending.remote_addr().unwrap_or_default();
                    let span = info_span!("session", subscriber = %id, peer = %peer);
                    tokio::spawn(
                        session::run_session(pending, id, Arc::clone(&registry), outbox_capacity)
                            .instrument(span),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept subscriber");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    let open = registry.snapshot();
    info!(subscribers = open.len(), "Subscriber endpoint stopping");
    for subscriber in open {
        registry.evict(subscriber.id());
    }
}
