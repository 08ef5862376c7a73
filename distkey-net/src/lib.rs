//! Asynchronous point-to-point channels and reliable broadcast.
//!
//! `PointToPoint` provides authenticated, encrypted unicast between every
//! pair of protocol participants with per-pair message counters and
//! receive scheduling. `ReliableBroadcast` builds Bracha-style echo/ready
//! broadcast on top, tolerating up to `t` Byzantine parties for
//! `t <= (n-1)/3`. Transport is owned by the caller through the `Link`
//! trait; an in-memory implementation backs the tests.

pub mod broadcast;
pub mod channel;
pub mod transport;

pub use broadcast::{RbcError, ReliableBroadcast};
pub use channel::{ChannelError, ChannelStats, PointToPoint, Scheduler, Timeout};
pub use transport::{memory_mesh, memory_pair, Link, LinkError, MemoryLink};
