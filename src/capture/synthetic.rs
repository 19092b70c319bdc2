//! Synthetic capture device.
//!
//! Generates a moving test pattern instead of talking to hardware. Exclusivity
//! is still real: opening device `index` binds `127.0.0.1:(claim_port_base + index)`,
//! so a second open anywhere on the host (this process or another) sees Busy until
//! the holder closes the device or exits.
//!
//! `fail_after` turns the device into a camera that breaks after producing that
//! many frames: later reads fail and later opens find nothing to probe.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};

use super::CaptureDevice;
use crate::error::CaptureError;
use crate::frame::{Frame, CHANNELS};

pub const DEFAULT_CLAIM_PORT_BASE: u16 = 47_100;

/// Configuration for a synthetic device.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Loopback port claimed for device index 0; index N claims `base + N`.
    pub claim_port_base: u16,
    /// Total frames this device produces over its lifetime before failing.
    pub fail_after: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            claim_port_base: DEFAULT_CLAIM_PORT_BASE,
            fail_after: None,
        }
    }
}

/// Test-pattern capture device with host-wide exclusive open.
pub struct SyntheticDevice {
    config: SyntheticConfig,
    claim: Option<TcpListener>,
    index: u32,
    probe: Option<Frame>,
    frames_produced: u64,
}

impl SyntheticDevice {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            claim: None,
            index: 0,
            probe: None,
            frames_produced: 0,
        }
    }

    /// Frames generated so far, probe frames included.
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced
    }

    fn claim_port(&self, index: u32) -> Option<u16> {
        u16::try_from(index)
            .ok()
            .and_then(|offset| self.config.claim_port_base.checked_add(offset))
    }

    fn exhausted(&self) -> bool {
        self.config
            .fail_after
            .is_some_and(|limit| self.frames_produced >= limit)
    }

    fn generate(&mut self) -> Option<Frame> {
        if self.exhausted() {
            return None;
        }
        self.frames_produced += 1;
        let len = self.config.width as usize * self.config.height as usize * CHANNELS;
        let tick = self.frames_produced;
        let pixels = (0..len)
            .map(|i| ((i as u64 + tick) % 256) as u8)
            .collect();
        Frame::new(self.config.height, self.config.width, pixels).ok()
    }
}

impl CaptureDevice for SyntheticDevice {
    fn open(&mut self, index: u32) -> Result<(), CaptureError> {
        if self.claim.is_some() {
            return Ok(());
        }
        let busy = |reason: String| CaptureError::DeviceBusy { index, reason };

        let port = self
            .claim_port(index)
            .ok_or_else(|| busy("index outside the claim port range".to_string()))?;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).map_err(|err| {
            if err.kind() == ErrorKind::AddrInUse {
                busy("claimed by another holder".to_string())
            } else {
                busy(format!("claim port {}: {}", port, err))
            }
        })?;

        let Some(probe) = self.generate() else {
            return Err(busy("no frame on probe".to_string()));
        };

        log::info!(
            "SyntheticDevice: acquired device {} ({}x{}, claim port {})",
            index,
            self.config.width,
            self.config.height,
            port
        );
        self.index = index;
        self.claim = Some(listener);
        self.probe = Some(probe);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.claim.is_none() {
            return Err(CaptureError::NotOpen);
        }
        if let Some(frame) = self.probe.take() {
            return Ok(frame);
        }
        self.generate().ok_or_else(|| CaptureError::DeviceReadFailure {
            index: self.index,
            reason: format!("synthetic device stopped after {} frames", self.frames_produced),
        })
    }

    fn close(&mut self) {
        if self.claim.take().is_some() {
            log::info!("SyntheticDevice: released device {}", self.index);
        }
        self.probe = None;
    }

    fn is_open(&self) -> bool {
        self.claim.is_some()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u16) -> SyntheticConfig {
        SyntheticConfig {
            width: 8,
            height: 4,
            claim_port_base: base,
            fail_after: None,
        }
    }

    #[test]
    fn open_probes_and_first_read_returns_probe() -> anyhow::Result<()> {
        let mut device = SyntheticDevice::new(config(47_310));
        device.open(0)?;
        assert!(device.is_open());

        let first = device.read()?;
        assert_eq!(first.shape(), (4, 8, 3));
        assert_eq!(first.as_bytes()[0], 1);
        assert_eq!(device.read()?.as_bytes()[0], 2);
        Ok(())
    }

    #[test]
    fn second_open_of_same_index_is_busy_until_close() {
        let mut first = SyntheticDevice::new(config(47_320));
        let mut second = SyntheticDevice::new(config(47_320));
        first.open(1).unwrap();

        assert!(matches!(
            second.open(1),
            Err(CaptureError::DeviceBusy { index: 1, .. })
        ));
        second.open(2).unwrap();

        first.close();
        second.close();
        second.open(1).unwrap();
    }

    #[test]
    fn read_without_open_fails() {
        let mut device = SyntheticDevice::new(config(47_330));
        assert!(matches!(device.read(), Err(CaptureError::NotOpen)));
    }

    #[test]
    fn fail_after_breaks_reads_then_probes() {
        let mut device = SyntheticDevice::new(SyntheticConfig {
            fail_after: Some(2),
            ..config(47_340)
        });
        device.open(0).unwrap();
        device.read().unwrap();
        device.read().unwrap();
        assert!(matches!(
            device.read(),
            Err(CaptureError::DeviceReadFailure { .. })
        ));
        assert_eq!(device.frames_produced(), 2);

        device.close();
        assert!(matches!(
            device.open(0),
            Err(CaptureError::DeviceBusy { .. })
        ));
        assert!(!device.is_open());
    }
}
