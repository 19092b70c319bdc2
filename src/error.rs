//! Error taxonomy.
//!
//! None of these cross `SharedCamera::read()`. They drive role decisions inside
//! the controller and surface from the lower layers for callers that use the
//! device or channel types directly.

use thiserror::Error;

/// Failures of the capture device adapter.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device exists but is claimed elsewhere, or opened without producing a probe frame.
    #[error("capture device {index} busy: {reason}")]
    DeviceBusy { index: u32, reason: String },

    /// An owned device stopped producing frames.
    #[error("capture device {index} read failed: {reason}")]
    DeviceReadFailure { index: u32, reason: String },

    #[error("capture device not open")]
    NotOpen,
}

/// Failures of a frame channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Nothing arrived within the receive timeout (or the slot was never written).
    #[error("no frame received within {timeout_ms} ms")]
    ChannelTimeout { timeout_ms: u128 },

    /// The publish endpoint is already bound by another process.
    #[error("publish endpoint {addr} already claimed")]
    TransportBindConflict { addr: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error(transparent)]
    Decode(#[from] FrameError),
}

/// Wire-format problems while decoding a frame or a stream message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame header truncated: {len} bytes")]
    TruncatedHeader { len: usize },

    #[error("frame payload is {actual} bytes, expected {expected} for {height}x{width}x3")]
    LengthMismatch {
        height: u32,
        width: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame dimensions {height}x{width} overflow")]
    DimensionOverflow { height: u32, width: u32 },

    #[error("stream message malformed: {0}")]
    Message(&'static str),
}
