//! Ownership controller and camera façade.
//!
//! `SharedCamera` ties one capture device and one frame channel together and
//! decides, per process, whether this process is the Owner (reads the device,
//! publishes every frame) or a Follower (reads frames from the channel).
//!
//! Becoming Owner is a single step: the device must be acquired *and* the
//! channel's publishing side claimed. Holding the device without being able to
//! publish is useless, so a lost claim gives the device back.
//!
//! `read()` never fails. Every failure mode degrades to the best cached frame:
//! the latest one, a previous one, or the bundled placeholder.

use std::fmt;
use std::time::{Duration, Instant};

use crate::capture::CaptureDevice;
use crate::channel::FrameChannel;
use crate::frame::{placeholder, Frame};

pub const DEFAULT_NAME: &str = "shared_camera";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_TAKEOVER_INTERVAL: Duration = Duration::from_secs(1);

/// Which side of the channel this process is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Owner,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Follower => write!(f, "follower"),
        }
    }
}

/// Per-camera settings.
#[derive(Clone, Debug)]
pub struct CameraOptions {
    /// Hardware device to open.
    pub camera_index: u32,
    /// Keep trying to become Owner while following.
    pub autotakeover: bool,
    /// Logical stream name (slot key / message filter).
    pub name: String,
    /// How long a Follower waits for a frame per read.
    pub timeout: Duration,
    /// Minimum spacing of the pre-read takeover attempts. Zero tries on every read.
    pub takeover_interval: Duration,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            camera_index: 0,
            autotakeover: true,
            name: DEFAULT_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            takeover_interval: DEFAULT_TAKEOVER_INTERVAL,
        }
    }
}

/// Counters for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub frames_received: u64,
    /// Messages that arrived for another stream name.
    pub foreign_frames: u64,
    /// Receives that ended without a frame (timeouts and transport errors).
    pub missed_receives: u64,
    pub takeover_attempts: u64,
    pub takeovers: u64,
    /// Times ownership was given up after a device failure.
    pub demotions: u64,
}

/// A camera handle that can be opened by many processes at once.
pub struct SharedCamera<D: CaptureDevice, C: FrameChannel> {
    options: CameraOptions,
    device: D,
    channel: C,
    role: Role,
    last_frame: Frame,
    last_attempt: Option<Instant>,
    takeover_due: bool,
    stopped: bool,
    stats: CameraStats,
}

impl<D: CaptureDevice, C: FrameChannel> SharedCamera<D, C> {
    /// Create the controller and make the initial attempt to become Owner.
    pub fn new(device: D, channel: C, options: CameraOptions) -> Self {
        let mut camera = Self {
            options,
            device,
            channel,
            role: Role::Follower,
            last_frame: placeholder(),
            last_attempt: None,
            takeover_due: false,
            stopped: false,
            stats: CameraStats::default(),
        };
        camera.try_takeover();
        camera
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn options(&self) -> &CameraOptions {
        &self.options
    }

    pub fn stats(&self) -> &CameraStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The frame the next failed read would return.
    pub fn last_frame(&self) -> &Frame {
        &self.last_frame
    }

    /// Get the next frame.
    ///
    /// Owner: capture, publish, return. Follower: wait up to `timeout` for a
    /// published frame; on silence, try to take the device over. Always returns
    /// a frame.
    pub fn read(&mut self) -> Frame {
        if self.stopped {
            return self.last_frame.clone();
        }

        if self.role == Role::Follower
            && (self.takeover_due || (self.options.autotakeover && self.proactive_attempt_due()))
        {
            self.try_takeover();
        }

        match self.role {
            Role::Owner => self.read_owned(),
            Role::Follower => self.read_followed(),
        }
        self.last_frame.clone()
    }

    /// Try to become Owner. No-op when already Owner; a busy device keeps this
    /// camera following. Returns whether this camera is Owner afterwards.
    pub fn try_takeover(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        if self.role == Role::Owner {
            return true;
        }
        self.takeover_due = false;
        self.last_attempt = Some(Instant::now());
        self.stats.takeover_attempts += 1;

        let index = self.options.camera_index;
        if let Err(err) = self.device.open(index) {
            log::debug!("SharedCamera '{}': {}", self.options.name, err);
            self.ensure_following();
            return false;
        }
        if let Err(err) = self.channel.claim() {
            log::info!(
                "SharedCamera '{}': device {} acquired but cannot publish ({}), following instead",
                self.options.name,
                index,
                err
            );
            self.device.close();
            self.ensure_following();
            return false;
        }

        self.role = Role::Owner;
        self.stats.takeovers += 1;
        log::info!(
            "SharedCamera '{}': now owner of device {}",
            self.options.name,
            index
        );
        true
    }

    /// Release the device, stop background receiving, release the channel.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.device.close();
        self.channel.close();
        self.role = Role::Follower;
        log::info!("SharedCamera '{}': stopped", self.options.name);
    }

    fn proactive_attempt_due(&self) -> bool {
        self.last_attempt
            .map_or(true, |at| at.elapsed() >= self.options.takeover_interval)
    }

    fn read_owned(&mut self) {
        match self.device.read() {
            Ok(frame) => {
                self.channel.publish(&self.options.name, &frame);
                self.stats.frames_captured += 1;
                self.last_frame = frame;
            }
            Err(err) => {
                log::warn!(
                    "SharedCamera '{}': {}, giving up ownership",
                    self.options.name,
                    err
                );
                self.demote();
            }
        }
    }

    fn read_followed(&mut self) {
        match self.channel.receive(&self.options.name, self.options.timeout) {
            Ok(Some(frame)) => {
                self.stats.frames_received += 1;
                self.last_frame = frame;
            }
            Ok(None) => self.stats.foreign_frames += 1,
            Err(err) => {
                self.stats.missed_receives += 1;
                log::debug!("SharedCamera '{}': {}", self.options.name, err);
                if self.options.autotakeover {
                    self.try_takeover();
                }
            }
        }
    }

    fn demote(&mut self) {
        self.device.close();
        self.channel.release();
        self.role = Role::Follower;
        self.stats.demotions += 1;
        self.takeover_due = true;
        self.ensure_following();
    }

    fn ensure_following(&mut self) {
        if let Err(err) = self.channel.follow() {
            log::warn!(
                "SharedCamera '{}': cannot start receiving: {}",
                self.options.name,
                err
            );
        }
    }
}

impl<D: CaptureDevice, C: FrameChannel> Drop for SharedCamera<D, C> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
