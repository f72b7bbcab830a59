//! Idle-subscriber detection.
//!
//! A subscriber that has sent nothing for `probe_after` gets a probe, at
//! most one per `probe_after` window. One that has sent nothing for longer
//! than `timeout` is evicted. Only inbound traffic counts as activity;
//! sending a probe never keeps a silent peer alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::registry::SubscriberRegistry;

/// Default idle time before a probe is sent.
pub const DEFAULT_PROBE_AFTER: Duration = Duration::from_secs(10);

/// Default idle time after which a subscriber is evicted.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe and timeout thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    pub probe_after: Duration,
    pub timeout: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            probe_after: DEFAULT_PROBE_AFTER,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Outcome of checking one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Probe,
    Expired,
}

impl LivenessPolicy {
    /// Judge a subscriber from its idle time and the age of its last probe.
    #[must_use]
    pub fn evaluate(&self, idle: Duration, since_probe: Option<Duration>) -> Verdict {
        if idle > self.timeout {
            return Verdict::Expired;
        }
        if idle < self.probe_after {
            return Verdict::Healthy;
        }
        match since_probe {
            Some(elapsed) if elapsed < self.probe_after => Verdict::Healthy,
            _ => Verdict::Probe,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Subscribers examined.
    pub checked: usize,
    /// Probes queued.
    pub probed: usize,
    /// Subscribers evicted for inactivity.
    pub expired: usize,
    /// Subscribers evicted because the probe could not be queued.
    pub failed: usize,
}

/// Periodically checks every registered subscriber.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<SubscriberRegistry>,
    policy: LivenessPolicy,
}

impl LivenessMonitor {
    #[must_use]
    pub fn new(registry: Arc<SubscriberRegistry>, policy: LivenessPolicy) -> Self {
        Self { registry, policy }
    }

    #[must_use]
    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    /// Check every subscriber against the current time.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Check every subscriber as of `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for subscriber in self.registry.snapshot() {
            report.checked += 1;
            let idle = subscriber.idle_for(now);

            match self.policy.evaluate(idle, subscriber.since_probe(now)) {
                Verdict::Healthy => {}
                Verdict::Probe => match subscriber.probe(now) {
                    Ok(()) => {
                        debug!(subscriber = %subscriber.id(), idle_ms = idle.as_millis() as u64, "Probing idle subscriber");
                        report.probed += 1;
                    }
                    Err(e) => {
                        warn!(subscriber = %subscriber.id(), error = %e, "Probe failed, evicting subscriber");
                        if self.registry.evict(subscriber.id()) {
                            report.failed += 1;
                        }
                    }
                },
                Verdict::Expired => {
                    warn!(
                        subscriber = %subscriber.id(),
                        idle_ms = idle.as_millis() as u64,
                        "Subscriber timed out"
                    );
                    if self.registry.evict(subscriber.id()) {
                        report.expired += 1;
                    }
                }
            }
        }

        report
    }
}
