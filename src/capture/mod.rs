//! Capture device adapters.
//!
//! A `CaptureDevice` wraps one hardware capture handle. The controller owns a
//! single adapter for its whole lifetime and opens/closes it as ownership is
//! gained and lost.
//!
//! Exclusivity comes from the device itself, never from this crate:
//! - `SyntheticDevice` claims a loopback port per device index (test pattern source)
//! - `V4l2Device` relies on the driver refusing a second streaming open (feature: capture-v4l2)
//!
//! `open` must probe one frame. A device that opens but yields nothing is Busy.

#[cfg(feature = "capture-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "capture-v4l2")]
pub mod v4l2;

pub use synthetic::{SyntheticConfig, SyntheticDevice};
#[cfg(feature = "capture-v4l2")]
pub use v4l2::{V4l2Config, V4l2Device};

use crate::error::CaptureError;
use crate::frame::Frame;

/// Exclusive access to a numbered capture device.
pub trait CaptureDevice {
    /// Try to acquire device `index` exclusively and probe one frame.
    ///
    /// Returns `CaptureError::DeviceBusy` when the device is claimed elsewhere or
    /// the probe produced no frame. Opening an already-open device is a no-op.
    fn open(&mut self, index: u32) -> Result<(), CaptureError>;

    /// Next frame. Only valid after a successful `open`.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Release the device. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        (**self).open(index)
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
