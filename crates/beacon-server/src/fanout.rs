//! Periodic driver for the broadcast tick and liveness sweeps.
//!
//! Both run on the same task, each on its own interval, so a sweep never
//! overlaps a tick.

use std::time::Duration;

use beacon_core::{BroadcastLoop, LivenessMonitor};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics;

/// Timer settings for [`run_fanout`].
#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    pub tick: Duration,
    pub check_interval: Duration,
}

/// Run broadcast ticks and liveness sweeps until shutdown.
pub async fn run_fanout(
    broadcast: BroadcastLoop,
    liveness: LivenessMonitor,
    settings: FanoutSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(settings.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut check = interval(settings.check_interval);
    check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        tick_ms = settings.tick.as_millis() as u64,
        check_interval_ms = settings.check_interval.as_millis() as u64,
        "Fan-out started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            _ = tick.tick() => {
                let report = broadcast.tick();
                metrics::record_tick(&report);
                if report.events > 0 {
                    debug!(
                        events = report.events,
                        deliveries = report.deliveries,
                        dropped = report.dropped,
                        evicted = report.evicted,
                        "Broadcast tick"
                    );
                }
            }

            _ = check.tick() => {
                let report = liveness.sweep();
                metrics::record_sweep(&report);
                if report.probed > 0 || report.expired > 0 || report.failed > 0 {
                    debug!(
                        checked = report.checked,
                        probed = report.probed,
                        expired = report.expired,
                        failed = report.failed,
                        "Liveness sweep"
                    );
                }
            }
        }
    }

    info!("Fan-out stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{self, SessionEnd};
    use beacon_core::{
        Event, EventQueue, LivenessPolicy, Outbound, SessionState, Subscriber, SubscriberRegistry,
    };
    use beacon_transport::channel::Written;
    use beacon_transport::ChannelConnection;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_events_flushed_on_tick_and_driver_stops() {
        let queue = Arc::new(EventQueue::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let (subscriber, mut outbox) = Subscriber::new(registry.next_id(), 8, None);
        registry.register(Arc::clone(&subscriber));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(run_fanout(
            BroadcastLoop::new(Arc::clone(&queue), Arc::clone(&registry)),
            LivenessMonitor::new(Arc::clone(&registry), LivenessPolicy::default()),
            FanoutSettings {
                tick: Duration::from_millis(50),
                check_interval: Duration::from_secs(1),
            },
            shutdown_rx,
        ));

        queue.push(Event::new("alert", json!({"x": 1}))).unwrap();

        let frame = tokio::time::timeout(Duration::from_millis(100), outbox.recv())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Outbound::Event(_))));
        assert!(queue.is_empty());

        shutdown_tx.send_replace(true);
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_session_closed_after_timeout() {
        let queue = Arc::new(EventQueue::new());
        let registry = Arc::new(SubscriberRegistry::new());

        let (conn, mut peer) = ChannelConnection::pair("mem:silent");
        let (subscriber, outbox) = Subscriber::new(registry.next_id(), 8, None);
        let session = tokio::spawn(session::serve(
            Box::new(conn),
            Arc::clone(&subscriber),
            outbox,
            Arc::clone(&registry),
        ));
        tokio::task::yield_now().await;
        assert!(registry.contains(subscriber.id()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = tokio::spawn(run_fanout(
            BroadcastLoop::new(Arc::clone(&queue), Arc::clone(&registry)),
            LivenessMonitor::new(Arc::clone(&registry), LivenessPolicy::default()),
            FanoutSettings {
                tick: Duration::from_millis(50),
                check_interval: Duration::from_secs(1),
            },
            shutdown_rx,
        ));

        // Probed but still connected at 10s.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(peer.written.try_recv(), Ok(Written::Ping));
        assert!(peer.written.try_recv().is_err());
        assert!(registry.contains(subscriber.id()));

        // Never answers; gone after the 30s timeout.
        tokio::time::sleep(Duration::from_secs(21)).await;
        let end = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Evicted);
        assert!(registry.is_empty());
        assert_eq!(subscriber.state(), SessionState::Closed);

        let mut written = Vec::new();
        while let Ok(frame) = peer.written.try_recv() {
            written.push(frame);
        }
        assert_eq!(written.last(), Some(&Written::Close));

        shutdown_tx.send_replace(true);
        driver.await.unwrap();
    }
}
