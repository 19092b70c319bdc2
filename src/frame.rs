//! Frames and their slot wire format.
//!
//! - `Frame`: immutable `height x width x 3` u8 image, cheap to clone.
//! - `encode_slot` / `decode_slot`: the value format stored in a single-slot channel.
//! - `placeholder`: the bundled "no feed" image returned before any real frame exists.
//!
//! Slot value layout:
//!
//! ```text
//! +-----------+-----------+------------------------------+
//! | height BE | width BE  | height * width * 3 raw bytes |
//! |  u32      |  u32      | row-major, RGB interleaved   |
//! +-----------+-----------+------------------------------+
//! ```
//!
//! There is no magic number or version field; producer and consumer must agree.

use std::sync::{Arc, OnceLock};

use crate::error::FrameError;

/// Samples per pixel.
pub const CHANNELS: usize = 3;

/// Size of the `(height, width)` slot header.
pub const SLOT_HEADER_LEN: usize = 8;

const PLACEHOLDER_PNG: &[u8] = include_bytes!("../assets/no_feed.png");
const PLACEHOLDER_FALLBACK_HEIGHT: u32 = 480;
const PLACEHOLDER_FALLBACK_WIDTH: u32 = 640;
const PLACEHOLDER_FALLBACK_GRAY: u8 = 48;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A captured or received image.
///
/// Identity is by value. The pixel buffer is shared between clones and never
/// mutated after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    height: u32,
    width: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Build a frame from an interleaved RGB buffer.
    pub fn new(height: u32, width: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = payload_len(height, width)?;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                height,
                width,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            height,
            width,
            data: data.into(),
        })
    }

    /// A frame with every sample set to `value`.
    pub fn filled(height: u32, width: u32, value: u8) -> Result<Self, FrameError> {
        let len = payload_len(height, width)?;
        Self::new(height, width, vec![value; len])
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, CHANNELS)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// True when both frames share one pixel buffer (a cached frame handed out again).
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Samples of the pixel at `(row, col)`, if in bounds.
    pub fn pixel(&self, row: u32, col: u32) -> Option<[u8; CHANNELS]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let offset = (row as usize * self.width as usize + col as usize) * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn payload_len(height: u32, width: u32) -> Result<usize, FrameError> {
    (height as usize)
        .checked_mul(width as usize)
        .and_then(|px| px.checked_mul(CHANNELS))
        .ok_or(FrameError::DimensionOverflow { height, width })
}

// ----------------------------------------------------------------------------
// Slot wire format
// ----------------------------------------------------------------------------

/// Serialize a frame as a slot value.
pub fn encode_slot(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::with_capacity(SLOT_HEADER_LEN + frame.data.len());
    out.extend_from_slice(&frame.height.to_be_bytes());
    out.extend_from_slice(&frame.width.to_be_bytes());
    out.extend_from_slice(&frame.data);
    out
}

/// Parse a slot value back into a frame.
pub fn decode_slot(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < SLOT_HEADER_LEN {
        return Err(FrameError::TruncatedHeader { len: bytes.len() });
    }
    let height = read_u32(&bytes[0..4]);
    let width = read_u32(&bytes[4..8]);
    Frame::new(height, width, bytes[SLOT_HEADER_LEN..].to_vec())
}

pub(crate) fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

// ----------------------------------------------------------------------------
// Placeholder
// ----------------------------------------------------------------------------

/// The "no feed" image, decoded once per process.
pub fn placeholder() -> Frame {
    static PLACEHOLDER: OnceLock<Frame> = OnceLock::new();
    PLACEHOLDER.get_or_init(load_placeholder).clone()
}

fn load_placeholder() -> Frame {
    let decoded = image::load_from_memory_with_format(PLACEHOLDER_PNG, image::ImageFormat::Png)
        .map_err(|err| err.to_string())
        .and_then(|img| {
            let rgb = img.to_rgb8();
            let (width, height) = rgb.dimensions();
            Frame::new(height, width, rgb.into_raw()).map_err(|err| err.to_string())
        });
    match decoded {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("bundled placeholder unreadable ({}), using flat gray", err);
            Frame {
                height: PLACEHOLDER_FALLBACK_HEIGHT,
                width: PLACEHOLDER_FALLBACK_WIDTH,
                data: vec![
                    PLACEHOLDER_FALLBACK_GRAY;
                    PLACEHOLDER_FALLBACK_HEIGHT as usize
                        * PLACEHOLDER_FALLBACK_WIDTH as usize
                        * CHANNELS
                ]
                .into(),
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
