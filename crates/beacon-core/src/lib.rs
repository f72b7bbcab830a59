//! # beacon-core
//!
//! The moving parts between ingestion and subscribers.
//!
//! - **Event** - Immutable, timestamped unit of data
//! - **EventQueue** - FIFO handoff from ingestion to broadcast
//! - **Subscriber** - Handle to a live session: outbox, clocks, state
//! - **SubscriberRegistry** - Concurrent set of live subscribers
//! - **BroadcastLoop** - Drains the queue and fans events out
//! - **LivenessMonitor** - Probes idle subscribers and evicts dead ones
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐    ┌────────────┐    ┌───────────────┐    ┌────────────────────┐
//! │ Ingestion │───▶│ EventQueue │───▶│ BroadcastLoop │───▶│ SubscriberRegistry │
//! └───────────┘    └────────────┘    └───────────────┘    └────────────────────┘
//!                                                                   ▲
//!                                    ┌─────────────────┐            │
//!                                    │ LivenessMonitor │────────────┘
//!                                    └─────────────────┘
//! ```

pub mod broadcast;
pub mod event;
pub mod liveness;
pub mod queue;
pub mod registry;
pub mod subscriber;

pub use broadcast::{BroadcastLoop, TickReport};
pub use event::Event;
pub use liveness::{LivenessMonitor, LivenessPolicy, SweepReport, Verdict};
pub use queue::{EventQueue, QueueError};
pub use registry::SubscriberRegistry;
pub use subscriber::{Outbound, Outbox, SendError, SessionState, Subscriber, SubscriberId};
