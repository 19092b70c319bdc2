//! V4L2 capture device.
//!
//! Opens `/dev/video{index}` through libv4l, negotiates RGB3 (falling back to
//! YUYV), and captures from a memory-mapped buffer stream.
//!
//! Exclusivity is the driver's: a second process asking for a streaming buffer
//! queue on a device already streaming gets `EBUSY`. Any failure while opening,
//! negotiating or probing the first frame reports the device as Busy.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

/// Configuration for a V4L2 device.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Requested frame rate; 0 leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Hardware capture device backed by libv4l.
pub struct V4l2Device {
    config: V4l2Config,
    state: Option<OpenDevice>,
}

struct OpenDevice {
    index: u32,
    stream: V4l2State,
    format: PixelFormat,
    width: u32,
    height: u32,
    probe: Option<Frame>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    fn connect(&self, index: u32) -> Result<OpenDevice> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = format!("/dev/video{}", index);
        let device = v4l::Device::with_path(&path).with_context(|| format!("open {}", path))?;

        let mut wanted = device.format().context("read v4l2 format")?;
        wanted.width = self.config.width;
        wanted.height = self.config.height;
        wanted.fourcc = v4l::FourCC::new(b"RGB3");
        let mut active = device.set_format(&wanted).context("set v4l2 format")?;
        if PixelFormat::from_fourcc(&active.fourcc.repr).is_none() {
            wanted.fourcc = v4l::FourCC::new(b"YUYV");
            active = device.set_format(&wanted).context("set v4l2 fallback format")?;
        }
        let format = PixelFormat::from_fourcc(&active.fourcc.repr)
            .ok_or_else(|| anyhow!("unsupported pixel format {}", active.fourcc))?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Device: failed to set fps on {}: {}", path, err);
            }
        }

        let stream = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        let mut open = OpenDevice {
            index,
            stream,
            format,
            width: active.width,
            height: active.height,
            probe: None,
        };
        open.probe = Some(open.capture().context("probe first frame")?);
        log::info!(
            "V4l2Device: acquired {} ({}x{} {:?})",
            path,
            open.width,
            open.height,
            open.format
        );
        Ok(open)
    }
}

impl OpenDevice {
    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let rgb = self.stream.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        })?;
        Ok(Frame::new(height, width, rgb)?)
    }
}

fn is_busy(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.raw_os_error() == Some(libc::EBUSY))
}

impl CaptureDevice for V4l2Device {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        if self.state.is_some() {
            return Ok(());
        }
        match self.connect(index) {
            Ok(open) => {
                self.state = Some(open);
                Ok(())
            }
            Err(err) => {
                let reason = if is_busy(&err) {
                    "device in use by another process".to_string()
                } else {
                    format!("{:#}", err)
                };
                Err(CaptureError::DeviceBusy { index, reason })
            }
        }
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let open = self.state.as_mut().ok_or(CaptureError::NotOpen)?;
        if let Some(frame) = open.probe.take() {
            return Ok(frame);
        }
        open.capture()
            .map_err(|err| CaptureError::DeviceReadFailure {
                index: open.index,
                reason: format!("{:#}", err),
            })
    }

    fn close(&mut self) {
        if let Some(open) = self.state.take() {
            log::info!("V4l2Device: released /dev/video{}", open.index);
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }
}
