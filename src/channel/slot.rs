//! Single-slot channel.
//!
//! The Owner overwrites the value stored under the channel name; Followers read
//! whatever is there. Nobody is refused the publishing side, and a read always
//! answers with the latest value, stale or not. Silence is therefore never
//! signalled: a Follower that wants to notice a dead Owner must keep trying to
//! take the device itself.

use std::time::Duration;

use super::store::SlotStore;
use super::{timeout_error, FrameChannel};
use crate::error::ChannelError;
use crate::frame::{decode_slot, encode_slot, Frame};

/// Channel over a shared key-value slot.
pub struct SingleSlotChannel<S: SlotStore> {
    store: S,
}

impl<S: SlotStore> SingleSlotChannel<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SlotStore> FrameChannel for SingleSlotChannel<S> {
    fn claim(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn release(&mut self) {}

    fn follow(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn publish(&mut self, name: &str, frame: &Frame) {
        if let Err(err) = self.store.put(name, &encode_slot(frame)) {
            log::debug!("SingleSlotChannel: publish to '{}' dropped: {:#}", name, err);
        }
    }

    /// Reads the slot immediately; `timeout` only matters when the slot is empty.
    fn receive(&mut self, name: &str, timeout: Duration) -> Result<Option<Frame>, ChannelError> {
        let value = self
            .store
            .get(name)
            .map_err(|err| ChannelError::Transport(format!("{:#}", err)))?;
        match value {
            Some(bytes) => Ok(Some(decode_slot(&bytes)?)),
            None => Err(timeout_error(timeout)),
        }
    }

    fn close(&mut self) {}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemorySlotStore;

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[test]
    fn empty_slot_reports_timeout() {
        let mut channel = SingleSlotChannel::new(MemorySlotStore::new());
        assert!(matches!(
            channel.receive("cam", TIMEOUT),
            Err(ChannelError::ChannelTimeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn receive_returns_latest_publish_for_the_name() -> anyhow::Result<()> {
        let store = MemorySlotStore::new();
        let mut owner = SingleSlotChannel::new(store.clone());
        let mut follower = SingleSlotChannel::new(store);

        owner.claim()?;
        owner.publish("cam", &Frame::filled(2, 2, 1)?);
        owner.publish("cam", &Frame::filled(2, 2, 9)?);
        owner.publish("other", &Frame::filled(1, 1, 5)?);

        let frame = follower.receive("cam", TIMEOUT)?.expect("frame for cam");
        assert_eq!(frame.as_bytes(), &[9u8; 12]);
        // Reading does not consume the slot.
        assert!(follower.receive("cam", TIMEOUT)?.is_some());
        let other = owner.store().clone().get("other")?;
        assert_eq!(other, Some(encode_slot(&Frame::filled(1, 1, 5)?)));
        Ok(())
    }

    #[test]
    fn corrupt_slot_value_is_a_decode_error() -> anyhow::Result<()> {
        let mut store = MemorySlotStore::new();
        store.put("cam", &[0, 0, 0, 1, 0, 0, 0, 1, 7])?;
        let mut channel = SingleSlotChannel::new(store);
        assert!(matches!(
            channel.receive("cam", TIMEOUT),
            Err(ChannelError::Decode(_))
        ));
        Ok(())
    }
}
