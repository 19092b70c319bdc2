//! Streaming channel with bind-to-claim leader election.
//!
//! The publishing side is a TCP listener on a well-known address. Whoever binds
//! it is the network-level frame source; everyone else gets `AddrInUse` and
//! becomes a subscriber instead.
//!
//! - Publisher: accepts pending subscribers without blocking on every publish
//!   and hands the frame to one writer thread per subscriber. Each writer keeps
//!   only the freshest frame, so a slow subscriber skips frames and a stalled
//!   one is dropped after its write timeout. `publish` never waits on a socket.
//! - Subscriber: one background thread connects (and reconnects) to the
//!   address, decodes messages, and keeps only the freshest `(name, frame)`
//!   pair in a rendezvous cell. `receive` waits on that cell.
//!
//! Message layout (all integers big-endian u32):
//!
//! ```text
//! +----------+----------+------------+--------------------------+
//! | body_len | name_len | name UTF-8 | slot value (see `frame`) |
//! +----------+----------+------------+--------------------------+
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{timeout_error, FrameChannel};
use crate::error::{ChannelError, FrameError};
use crate::frame::{decode_slot, read_u32, Frame, SLOT_HEADER_LEN};

/// Default cap on one message body, sent or received. Fits an 8K RGB frame.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Configuration for a streaming channel.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Address subscribers connect to.
    pub host: String,
    pub port: u16,
    /// Interface the publisher binds (`0.0.0.0` serves the whole network).
    pub bind_host: String,
    /// Upper bound on one publish write to one subscriber.
    pub write_timeout: Duration,
    /// Pause between subscriber connection attempts.
    pub reconnect_backoff: Duration,
    /// How often the subscriber loop and writer threads check for shutdown while idle.
    pub poll_interval: Duration,
    /// Largest message body published or accepted. Bigger frames are not streamed.
    pub max_message_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            bind_host: "0.0.0.0".to_string(),
            write_timeout: Duration::from_millis(200),
            reconnect_backoff: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl StreamConfig {
    fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Channel over a bind-to-claim TCP stream.
pub struct StreamingChannel {
    config: StreamConfig,
    publisher: Option<Publisher>,
    subscriber: Option<Subscriber>,
}

impl StreamingChannel {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            publisher: None,
            subscriber: None,
        }
    }

    /// True while this process holds the bound publish endpoint.
    pub fn is_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// True while the background receive loop is running.
    pub fn is_subscribed(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Number of subscribers the publisher currently writes to.
    pub fn subscriber_count(&self) -> usize {
        self.publisher
            .as_ref()
            .map(|publisher| publisher.writers.len())
            .unwrap_or(0)
    }

    fn stop_subscriber(&mut self) {
        if let Some(subscriber) = self.subscriber.take() {
            subscriber.stop();
        }
    }
}

impl FrameChannel for StreamingChannel {
    fn claim(&mut self) -> Result<(), ChannelError> {
        if self.publisher.is_some() {
            return Ok(());
        }
        let publisher = Publisher::bind(&self.config)?;
        log::info!(
            "StreamingChannel: publishing on {}",
            publisher.local_addr
        );
        self.publisher = Some(publisher);
        self.stop_subscriber();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            log::info!(
                "StreamingChannel: released {} ({} subscribers dropped)",
                publisher.local_addr,
                publisher.writers.len()
            );
        }
    }

    fn follow(&mut self) -> Result<(), ChannelError> {
        if self.subscriber.is_none() {
            self.subscriber = Some(Subscriber::spawn(self.config.clone())?);
        }
        Ok(())
    }

    fn publish(&mut self, name: &str, frame: &Frame) {
        match self.publisher.as_mut() {
            Some(publisher) => publisher.send(name, frame),
            None => log::debug!("StreamingChannel: publish to '{}' without a bound endpoint", name),
        }
    }

    fn receive(&mut self, name: &str, timeout: Duration) -> Result<Option<Frame>, ChannelError> {
        self.follow()?;
        let Some(subscriber) = self.subscriber.as_ref() else {
            return Err(timeout_error(timeout));
        };
        match subscriber.latest.take(timeout) {
            Some((sender, frame)) if sender == name => Ok(Some(frame)),
            Some(_) => Ok(None),
            None => Err(timeout_error(timeout)),
        }
    }

    fn close(&mut self) {
        self.stop_subscriber();
        self.release();
    }
}

impl Drop for StreamingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Publisher
// ----------------------------------------------------------------------------

struct Publisher {
    listener: TcpListener,
    local_addr: SocketAddr,
    writers: Vec<Writer>,
    write_timeout: Duration,
    poll_interval: Duration,
    max_message_bytes: usize,
    oversize_warned: bool,
}

impl Publisher {
    fn bind(config: &StreamConfig) -> Result<Self, ChannelError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr.as_str()).map_err(|err| {
            if err.kind() == ErrorKind::AddrInUse {
                ChannelError::TransportBindConflict { addr: addr.clone() }
            } else {
                ChannelError::Transport(format!("bind {}: {}", addr, err))
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|err| ChannelError::Transport(format!("configure {}: {}", addr, err)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ChannelError::Transport(format!("local addr {}: {}", addr, err)))?;
        Ok(Self {
            listener,
            local_addr,
            writers: Vec::new(),
            write_timeout: config.write_timeout,
            poll_interval: config.poll_interval,
            max_message_bytes: config.max_message_bytes,
            oversize_warned: false,
        })
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => match Writer::spawn(stream, peer, self) {
                    Ok(writer) => {
                        log::info!("StreamingChannel: subscriber {} connected", peer);
                        self.writers.push(writer);
                    }
                    Err(err) => log::debug!("StreamingChannel: rejecting {}: {}", peer, err),
                },
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::debug!("StreamingChannel: accept failed: {}", err);
                    break;
                }
            }
        }
    }

    /// Queue `frame` for every live subscriber. Socket writes happen on the writer threads.
    fn send(&mut self, name: &str, frame: &Frame) {
        self.accept_pending();
        self.writers.retain(|writer| !writer.is_finished());
        if self.writers.is_empty() {
            return;
        }
        let body_len = message_body_len(name, frame);
        if body_len > self.max_message_bytes {
            if !self.oversize_warned {
                log::warn!(
                    "StreamingChannel: {}x{} frame for '{}' is {} bytes, over the {} byte message limit; not streaming it",
                    frame.width(),
                    frame.height(),
                    name,
                    body_len,
                    self.max_message_bytes
                );
                self.oversize_warned = true;
            }
            return;
        }
        for writer in &self.writers {
            writer.pending.put((name.to_string(), frame.clone()));
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        for writer in &self.writers {
            writer.signal_stop();
        }
        self.writers.clear();
    }
}

/// One subscriber connection and the thread that writes to it.
struct Writer {
    pending: Arc<Latest>,
    shutdown: Arc<AtomicBool>,
    control: TcpStream,
    join: Option<JoinHandle<()>>,
}

impl Writer {
    fn spawn(stream: TcpStream, peer: SocketAddr, publisher: &Publisher) -> std::io::Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(publisher.write_timeout))?;
        stream.set_nodelay(true)?;
        let control = stream.try_clone()?;

        let pending = Arc::new(Latest::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_pending = pending.clone();
        let thread_shutdown = shutdown.clone();
        let poll_interval = publisher.poll_interval;
        let join = std::thread::Builder::new()
            .name("shared-camera-writer".to_string())
            .spawn(move || {
                run_writer(stream, peer, thread_pending, thread_shutdown, poll_interval)
            })?;
        Ok(Self {
            pending,
            shutdown,
            control,
            join: Some(join),
        })
    }

    fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Ask the thread to exit and unblock any write in progress.
    fn signal_stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("StreamingChannel: writer thread panicked");
            }
        }
    }
}

fn run_writer(
    mut stream: TcpStream,
    peer: SocketAddr,
    pending: Arc<Latest>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let Some((name, frame)) = pending.take(poll_interval) else {
            continue;
        };
        if let Err(err) = write_message(&mut stream, &name, &frame) {
            if !shutdown.load(Ordering::SeqCst) {
                log::info!("StreamingChannel: dropping subscriber {}: {}", peer, err);
            }
            return;
        }
    }
}

// ----------------------------------------------------------------------------
// Subscriber
// ----------------------------------------------------------------------------

struct Subscriber {
    latest: Arc<Latest>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Subscriber {
    fn spawn(config: StreamConfig) -> Result<Self, ChannelError> {
        let latest = Arc::new(Latest::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_latest = latest.clone();
        let thread_shutdown = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("shared-camera-subscriber".to_string())
            .spawn(move || run_subscriber(config, thread_latest, thread_shutdown))
            .map_err(|err| ChannelError::Transport(format!("spawn subscriber: {}", err)))?;
        Ok(Self {
            latest,
            shutdown,
            join: Some(join),
        })
    }

    fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("StreamingChannel: subscriber thread panicked");
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run_subscriber(config: StreamConfig, latest: Arc<Latest>, shutdown: Arc<AtomicBool>) {
    let target = config.connect_addr();
    log::info!("StreamingChannel: subscribing to {}", target);
    while !shutdown.load(Ordering::SeqCst) {
        match connect(&target, config.reconnect_backoff.max(config.poll_interval)) {
            Ok(stream) => {
                log::info!("StreamingChannel: connected to {}", target);
                match pump(stream, &config, &latest, &shutdown) {
                    Ok(()) => log::info!("StreamingChannel: publisher {} went away", target),
                    Err(err) => log::warn!("StreamingChannel: stream from {} broken: {}", target, err),
                }
            }
            Err(err) => {
                log::debug!("StreamingChannel: connect {} failed: {}", target, err);
                idle(config.reconnect_backoff, config.poll_interval, &shutdown);
            }
        }
    }
    log::info!("StreamingChannel: subscriber for {} stopped", target);
}

fn connect(target: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    let addr = target
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(ErrorKind::AddrNotAvailable, "no address resolved"))?;
    TcpStream::connect_timeout(&addr, timeout)
}

fn idle(total: Duration, step: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}

/// Read messages until the publisher disconnects, the stream breaks, or shutdown.
fn pump(
    mut stream: TcpStream,
    config: &StreamConfig,
    latest: &Latest,
    shutdown: &AtomicBool,
) -> Result<(), String> {
    stream
        .set_read_timeout(Some(config.poll_interval))
        .map_err(|err| err.to_string())?;
    let mut reader = MessageReader::new(config.max_message_bytes);
    let mut chunk = vec![0u8; READ_CHUNK];
    while !shutdown.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                reader.extend(&chunk[..n]);
                while let Some(message) = reader.next_message().map_err(|err| err.to_string())? {
                    latest.put(message);
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.to_string()),
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Rendezvous cell
// ----------------------------------------------------------------------------

/// Single-slot, freshest-wins handoff between the receive loop and `receive`.
#[derive(Default)]
struct Latest {
    slot: Mutex<Option<(String, Frame)>>,
    ready: Condvar,
}

impl Latest {
    fn put(&self, message: (String, Frame)) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(message);
        self.ready.notify_one();
    }

    fn take(&self, timeout: Duration) -> Option<(String, Frame)> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }
}

// ----------------------------------------------------------------------------
// Message codec
// ----------------------------------------------------------------------------

fn message_body_len(name: &str, frame: &Frame) -> usize {
    4 + name.len() + SLOT_HEADER_LEN + frame.as_bytes().len()
}

/// Everything of a `(name, frame)` message up to the pixel bytes.
fn message_header(name: &str, frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let body_len = u32::try_from(message_body_len(name, frame))
        .map_err(|_| FrameError::Message("message exceeds size limit"))?;
    let name_len =
        u32::try_from(name.len()).map_err(|_| FrameError::Message("name too long"))?;
    let mut out = Vec::with_capacity(8 + name.len() + SLOT_HEADER_LEN);
    out.extend_from_slice(&body_len.to_be_bytes());
    out.extend_from_slice(&name_len.to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&frame.height().to_be_bytes());
    out.extend_from_slice(&frame.width().to_be_bytes());
    Ok(out)
}

/// Write one message without copying the pixel buffer.
fn write_message<W: Write>(out: &mut W, name: &str, frame: &Frame) -> std::io::Result<()> {
    let header = message_header(name, frame)
        .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err.to_string()))?;
    out.write_all(&header)?;
    out.write_all(frame.as_bytes())
}

fn decode_body(body: &[u8]) -> Result<(String, Frame), FrameError> {
    if body.len() < 4 {
        return Err(FrameError::Message("missing name length"));
    }
    let name_len = read_u32(&body[..4]) as usize;
    let rest = &body[4..];
    if rest.len() < name_len {
        return Err(FrameError::Message("name overruns message"));
    }
    let name = std::str::from_utf8(&rest[..name_len])
        .map_err(|_| FrameError::Message("name is not UTF-8"))?
        .to_string();
    let frame = decode_slot(&rest[name_len..])?;
    Ok((name, frame))
}

/// Reassembles messages from arbitrary read boundaries.
struct MessageReader {
    buffer: Vec<u8>,
    max_message_bytes: usize,
}

impl MessageReader {
    fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_bytes,
        }
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete message, if one is buffered.
    fn next_message(&mut self) -> Result<Option<(String, Frame)>, FrameError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let body_len = read_u32(&self.buffer[..4]) as usize;
        if body_len > self.max_message_bytes {
            return Err(FrameError::Message("message exceeds size limit"));
        }
        if self.buffer.len() < 4 + body_len {
            return Ok(None);
        }
        let message = decode_body(&self.buffer[4..4 + body_len]);
        self.buffer.drain(..4 + body_len);
        message.map(Some)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> StreamConfig {
        StreamConfig {
            host: "127.0.0.1".to_string(),
            port,
            bind_host: "127.0.0.1".to_string(),
            write_timeout: Duration::from_millis(200),
            reconnect_backoff: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    fn frame(value: u8) -> Frame {
        Frame::filled(3, 4, value).unwrap()
    }

    fn encode(name: &str, frame: &Frame) -> Vec<u8> {
        let mut out = Vec::new();
        write_message(&mut out, name, frame).unwrap();
        out
    }

    /// Publish until the follower sees a frame or the deadline passes.
    fn pump_until_received(
        owner: &mut StreamingChannel,
        follower: &mut StreamingChannel,
        name: &str,
        sent: &Frame,
    ) -> Option<Option<Frame>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            owner.publish(name, sent);
            if let Ok(received) = follower.receive("cam", Duration::from_millis(50)) {
                return Some(received);
            }
        }
        None
    }

    #[test]
    fn reader_reassembles_split_messages() -> Result<(), FrameError> {
        let first = encode("cam", &frame(1));
        let second = encode("other", &frame(2));
        assert_eq!(first.len(), 4 + message_body_len("cam", &frame(1)));
        let wire = [first, second].concat();

        let mut reader = MessageReader::new(DEFAULT_MAX_MESSAGE_BYTES);
        reader.extend(&wire[..5]);
        assert!(reader.next_message()?.is_none());
        reader.extend(&wire[5..]);

        let (name, got) = reader.next_message()?.expect("first message");
        assert_eq!(name, "cam");
        assert_eq!(got, frame(1));
        let (name, got) = reader.next_message()?.expect("second message");
        assert_eq!(name, "other");
        assert_eq!(got, frame(2));
        assert!(reader.next_message()?.is_none());
        Ok(())
    }

    #[test]
    fn reader_rejects_oversized_length_prefix() {
        let mut reader = MessageReader::new(DEFAULT_MAX_MESSAGE_BYTES);
        reader.extend(&u32::MAX.to_be_bytes());
        assert!(reader.next_message().is_err());

        let mut strict = MessageReader::new(16);
        strict.extend(&encode("cam", &frame(1)));
        assert!(strict.next_message().is_err());
    }

    #[test]
    fn default_limit_fits_an_8k_rgb_frame() {
        let body = 4 + "shared_camera".len() + SLOT_HEADER_LEN + 7680 * 4320 * 3;
        assert!(body <= DEFAULT_MAX_MESSAGE_BYTES);
    }

    #[test]
    fn rendezvous_keeps_only_the_freshest() {
        let latest = Latest::default();
        latest.put(("cam".to_string(), frame(1)));
        latest.put(("cam".to_string(), frame(2)));

        let (_, got) = latest.take(Duration::from_millis(10)).expect("frame");
        assert_eq!(got, frame(2));
        assert!(latest.take(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn rendezvous_wakes_a_waiting_receiver() {
        let latest = Arc::new(Latest::default());
        let producer = latest.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.put(("cam".to_string(), frame(7)));
        });
        let got = latest.take(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(got.map(|(_, f)| f), Some(frame(7)));
    }

    #[test]
    fn only_one_channel_can_claim_an_address() {
        let mut first = StreamingChannel::new(config(47_410));
        let mut second = StreamingChannel::new(config(47_410));

        first.claim().unwrap();
        assert!(matches!(
            second.claim(),
            Err(ChannelError::TransportBindConflict { .. })
        ));

        first.release();
        second.claim().unwrap();
        assert!(second.is_publisher());
    }

    #[test]
    fn follower_receives_published_frames() {
        let mut owner = StreamingChannel::new(config(47_420));
        let mut follower = StreamingChannel::new(config(47_420));
        owner.claim().unwrap();
        follower.follow().unwrap();

        let received = pump_until_received(&mut owner, &mut follower, "cam", &frame(5));
        assert_eq!(received, Some(Some(frame(5))));
        assert_eq!(owner.subscriber_count(), 1);
    }

    #[test]
    fn frames_for_other_names_are_not_returned() {
        let mut owner = StreamingChannel::new(config(47_430));
        let mut follower = StreamingChannel::new(config(47_430));
        owner.claim().unwrap();
        follower.follow().unwrap();

        let received = pump_until_received(&mut owner, &mut follower, "someone_else", &frame(5));
        assert_eq!(received, Some(None));
    }

    #[test]
    fn silent_channel_times_out() {
        let mut follower = StreamingChannel::new(config(47_440));
        let started = Instant::now();
        let result = follower.receive("cam", Duration::from_millis(50));
        assert!(matches!(result, Err(ChannelError::ChannelTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(follower.is_subscribed());
    }

    #[test]
    fn claim_stops_the_subscriber_and_close_is_idempotent() {
        let mut channel = StreamingChannel::new(config(47_450));
        channel.follow().unwrap();
        assert!(channel.is_subscribed());

        channel.claim().unwrap();
        assert!(channel.is_publisher());
        assert!(!channel.is_subscribed());

        channel.close();
        channel.close();
        assert!(!channel.is_publisher());
    }

    #[test]
    fn frames_over_the_message_limit_are_not_streamed() {
        let mut owner = StreamingChannel::new(StreamConfig {
            max_message_bytes: 64,
            ..config(47_460)
        });
        let mut follower = StreamingChannel::new(config(47_460));
        owner.claim().unwrap();
        follower.follow().unwrap();

        let big = Frame::filled(8, 8, 3).unwrap();
        let small = Frame::filled(1, 1, 4).unwrap();
        let received = pump_until_received(&mut owner, &mut follower, "cam", &small);
        assert_eq!(received, Some(Some(small)));
        while follower.receive("cam", Duration::from_millis(100)).is_ok() {}

        for _ in 0..5 {
            owner.publish("cam", &big);
        }
        assert!(matches!(
            follower.receive("cam", Duration::from_millis(200)),
            Err(ChannelError::ChannelTimeout { .. })
        ));
        assert!(owner.publisher.as_ref().is_some_and(|p| p.oversize_warned));
    }

    #[test]
    fn stalled_subscribers_do_not_block_publish() {
        let mut owner = StreamingChannel::new(config(47_470));
        owner.claim().unwrap();
        let idle: Vec<TcpStream> = (0..10)
            .map(|_| TcpStream::connect(("127.0.0.1", 47_470)).unwrap())
            .collect();

        let big = Frame::filled(720, 1280, 9).unwrap();
        let mut worst = Duration::ZERO;
        for _ in 0..30 {
            let started = Instant::now();
            owner.publish("cam", &big);
            worst = worst.max(started.elapsed());
        }
        assert!(worst < Duration::from_millis(250), "publish took {:?}", worst);

        let started = Instant::now();
        owner.close();
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(idle);
    }
}
