//! Handle to a live subscriber session.
//!
//! The session task owns the transport. What the rest of the system sees is
//! this handle: a bounded outbox the session drains, the liveness clocks the
//! session updates on inbound traffic, the lifecycle state, and a close
//! signal.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

/// Unique subscriber identifier, increasing over the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Handshaking = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Handshaking,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Work queued for the session's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded event frame.
    Event(Arc<str>),
    /// A liveness probe (ping).
    Probe,
}

/// Receiving side of a subscriber's outbox, drained by its session.
pub type Outbox = mpsc::Receiver<Outbound>;

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The subscriber is not draining its outbox fast enough.
    #[error("Subscriber outbox is full")]
    Full,

    /// The session is gone.
    #[error("Subscriber is closed")]
    Closed,
}

impl<T> From<mpsc::error::TrySendError<T>> for SendError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        }
    }
}

#[derive(Debug)]
struct Clocks {
    /// Last inbound traffic (or registration).
    last_activity: Instant,
    /// Last probe sent since that traffic.
    last_probe: Option<Instant>,
}

/// A registered subscriber.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    remote_addr: Option<String>,
    connected_at: Instant,
    outbox: mpsc::Sender<Outbound>,
    state: AtomicU8,
    clocks: Mutex<Clocks>,
    close: Notify,
}

impl Subscriber {
    /// Create a handshaking subscriber with an outbox of `capacity` frames.
    ///
    /// Returns the shared handle and the outbox receiver for the session.
    /// Nothing can be queued until [`open`](Self::open) is called.
    #[must_use]
    pub fn new(
        id: SubscriberId,
        capacity: usize,
        remote_addr: Option<String>,
    ) -> (Arc<Self>, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let subscriber = Self {
            id,
            remote_addr,
            connected_at: now,
            outbox: tx,
            state: AtomicU8::new(SessionState::Handshaking as u8),
            clocks: Mutex::new(Clocks {
                last_activity: now,
                last_probe: None,
            }),
            close: Notify::new(),
        };
        (Arc::new(subscriber), rx)
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Time since the session opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Queue an encoded event without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox is full or the session has ended.
    pub fn send(&self, frame: Arc<str>) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.outbox.try_send(Outbound::Event(frame))?;
        Ok(())
    }

    /// Queue a liveness probe and remember when it was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox is full or the session has ended.
    pub fn probe(&self, now: Instant) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.outbox.try_send(Outbound::Probe)?;
        self.clocks.lock().last_probe = Some(now);
        Ok(())
    }

    /// Record inbound traffic now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Record inbound traffic at `now`.
    pub fn touch_at(&self, now: Instant) {
        let mut clocks = self.clocks.lock();
        clocks.last_activity = now;
        clocks.last_probe = None;
    }

    /// Time without inbound traffic as of `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.clocks.lock().last_activity)
    }

    /// Time since the last unanswered probe, if one was sent.
    #[must_use]
    pub fn since_probe(&self, now: Instant) -> Option<Duration> {
        self.clocks
            .lock()
            .last_probe
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// Move from `Handshaking` to `Open` and restart the liveness clock.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn open(&self) -> bool {
        let opened = self
            .state
            .compare_exchange(
                SessionState::Handshaking as u8,
                SessionState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if opened {
            self.touch();
        }
        opened
    }

    /// Move from `Open` to `Closing`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Ask the session to shut down.
    ///
    /// The signal is remembered if the session is not currently waiting.
    pub fn request_close(&self) {
        self.begin_close();
        self.close.notify_one();
    }

    /// Resolves once [`request_close`](Self::request_close) has been called.
    pub async fn closed(&self) {
        self.close.notified().await;
    }

    /// Terminal transition, performed by the session after teardown.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }
}
