//! Shared camera.
//!
//! Lets any number of independent processes open "the camera" at the same
//! time. One of them actually holds the capture device and publishes every
//! frame; the others receive those frames through a channel and take the
//! device over when the holder disappears.
//!
//! # Roles
//!
//! - **Owner**: holds the device exclusively, captures, publishes.
//! - **Follower**: reads from the channel; on silence, tries to become Owner.
//!
//! Arbitration is entirely cross-process. There is no shared lock: the device
//! driver's exclusive open and, for the streaming channel, contention over
//! binding the publish address decide who owns what.
//!
//! # Module Structure
//!
//! - `frame`: immutable frames, slot wire format, bundled placeholder
//! - `capture`: capture device adapters (synthetic, V4L2)
//! - `channel`: frame channels (single-slot over a key-value store, bind-to-claim stream)
//! - `camera`: the ownership state machine behind `SharedCamera::read()`
//! - `config`: file + environment configuration and camera construction
//! - `status`: optional MQTT role announcements
//!
//! # Example
//!
//! ```no_run
//! use shared_camera::{CameraOptions, MemorySlotStore, SharedCamera, SingleSlotChannel};
//! use shared_camera::{SyntheticConfig, SyntheticDevice};
//!
//! let device = SyntheticDevice::new(SyntheticConfig::default());
//! let channel = SingleSlotChannel::new(MemorySlotStore::new());
//! let mut camera = SharedCamera::new(device, channel, CameraOptions::default());
//! let frame = camera.read();
//! println!("{} frame {}x{}", camera.role(), frame.width(), frame.height());
//! ```

pub mod camera;
pub mod capture;
pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod status;

pub use camera::{CameraOptions, CameraStats, Role, SharedCamera};
#[cfg(feature = "capture-v4l2")]
pub use capture::{V4l2Config, V4l2Device};
pub use capture::{CaptureDevice, SyntheticConfig, SyntheticDevice};
pub use channel::{
    FrameChannel, MemorySlotStore, RedisSlotStore, SingleSlotChannel, SlotStore,
    SqliteSlotStore, StreamConfig, StreamingChannel,
};
pub use config::{CameraConfig, ChannelKind, DeviceKind, DynCamera, StoreKind};
pub use error::{CaptureError, ChannelError, FrameError};
pub use frame::{decode_slot, encode_slot, placeholder, Frame};
pub use status::RoleAnnouncer;
