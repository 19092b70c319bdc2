//! Frame channels.
//!
//! A channel carries frames from the Owner to every Follower. Two backends:
//! - `SingleSlotChannel`: overwrite one key in a shared store; readers get the latest value.
//! - `StreamingChannel`: bind-to-claim TCP publisher; followers subscribe from a background loop.
//!
//! Leader election differs per backend. The single-slot backend never refuses a
//! publisher, so ownership is decided by the device alone. The streaming backend
//! only lets the process that wins the bind publish.

pub mod slot;
pub mod store;
pub mod stream;

pub use slot::SingleSlotChannel;
pub use store::{MemorySlotStore, RedisSlotStore, SlotStore, SqliteSlotStore};
pub use stream::{StreamConfig, StreamingChannel};

use std::time::Duration;

use crate::error::ChannelError;
use crate::frame::Frame;

/// Transport used to hand frames from the Owner to Followers.
pub trait FrameChannel {
    /// Claim the publishing side. Fails with `TransportBindConflict` when another
    /// process already holds it.
    fn claim(&mut self) -> Result<(), ChannelError>;

    /// Give up the publishing side, if held.
    fn release(&mut self);

    /// Make sure the receiving side is live.
    fn follow(&mut self) -> Result<(), ChannelError>;

    /// Best-effort publish. Never blocks indefinitely; failures are swallowed.
    fn publish(&mut self, name: &str, frame: &Frame);

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means something arrived but was addressed to another name.
    fn receive(&mut self, name: &str, timeout: Duration) -> Result<Option<Frame>, ChannelError>;

    /// Tear down every socket and thread. Idempotent.
    fn close(&mut self);
}

impl<C: FrameChannel + ?Sized> FrameChannel for Box<C> {
    fn claim(&mut self) -> Result<(), ChannelError> {
        (**self).claim()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn follow(&mut self) -> Result<(), ChannelError> {
        (**self).follow()
    }

    fn publish(&mut self, name: &str, frame: &Frame) {
        (**self).publish(name, frame)
    }

    fn receive(&mut self, name: &str, timeout: Duration) -> Result<Option<Frame>, ChannelError> {
        (**self).receive(name, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

pub(crate) fn timeout_error(timeout: Duration) -> ChannelError {
    ChannelError::ChannelTimeout {
        timeout_ms: timeout.as_millis(),
    }
}
