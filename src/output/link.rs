//! Outbound frame link to the LED controller
//!
//! Frames are framed as `['N', 'P', len_lo, len_hi, seq_lo, seq_hi, payload..]`
//! and written by a dedicated thread. At most one frame is in flight: a frame
//! offered while the previous write is outstanding is dropped and counted,
//! never queued.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::telemetry::LinkStats;

/// Packet magic, "NP"
pub const PACKET_MAGIC: [u8; 2] = [b'N', b'P'];
/// Bytes before the payload
pub const PACKET_HEADER_LEN: usize = 6;

/// Frame link errors
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn link thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("payload of {0} bytes exceeds the 16-bit length field")]
    PayloadTooLarge(usize),
}

/// Build one wire packet
pub fn encode_packet(payload: &[u8], seq: u16) -> Result<Bytes, LinkError> {
    let len = u16::try_from(payload.len()).map_err(|_| LinkError::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN + payload.len());
    buf.put_slice(&PACKET_MAGIC);
    buf.put_u16_le(len);
    buf.put_u16_le(seq);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Byte sink the link thread writes packets into
pub trait FrameTransport: Send + 'static {
    fn write_packet(&mut self, packet: &[u8]) -> std::io::Result<()>;
}

/// Transport over any `Write` (serial device node, file, socket)
pub struct WriterTransport<W: Write + Send + 'static> {
    inner: W,
}

impl<W: Write + Send + 'static> WriterTransport<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send + 'static> FrameTransport for WriterTransport<W> {
    fn write_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(packet)?;
        self.inner.flush()
    }
}

/// Result of offering a frame to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the link thread with this sequence number
    Queued { seq: u16 },
    /// A previous frame was still in flight
    Dropped { drops: u64 },
    /// The link is closed or has failed
    Closed,
}

/// Handle to the link thread
pub struct FrameLink {
    sender: Option<Sender<Bytes>>,
    in_flight: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    stats: Arc<Mutex<LinkStats>>,
    seq: u16,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl FrameLink {
    /// Start a link thread writing into `transport`
    pub fn open<T: FrameTransport>(transport: T) -> Result<Self, LinkError> {
        let (sender, receiver) = crossbeam_channel::bounded::<Bytes>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));
        let stats = Arc::new(Mutex::new(LinkStats::default()));

        let thread_handle = {
            let in_flight = in_flight.clone();
            let failed = failed.clone();
            let last_error = last_error.clone();
            let stats = stats.clone();
            std::thread::Builder::new()
                .name("frame-link".to_string())
                .spawn(move || {
                    Self::link_thread(transport, receiver, in_flight, failed, last_error, stats);
                })
                .map_err(LinkError::Spawn)?
        };

        Ok(Self {
            sender: Some(sender),
            in_flight,
            failed,
            last_error,
            stats,
            seq: 0,
            thread_handle: Some(thread_handle),
        })
    }

    /// Open a device node or file for writing and start a link over it
    pub fn open_path(path: &Path) -> Result<Self, LinkError> {
        let file = OpenOptions::new()
            .write(true)
            .create(false)
            .open(path)
            .map_err(|source| LinkError::Open { path: path.to_path_buf(), source })?;
        tracing::info!(path = %path.display(), "frame link opened");
        Self::open(WriterTransport::new(file))
    }

    fn link_thread<T: FrameTransport>(
        mut transport: T,
        receiver: Receiver<Bytes>,
        in_flight: Arc<AtomicBool>,
        failed: Arc<AtomicBool>,
        last_error: Arc<Mutex<Option<String>>>,
        stats: Arc<Mutex<LinkStats>>,
    ) {
        tracing::debug!("frame link thread started");
        while let Ok(packet) = receiver.recv() {
            match transport.write_packet(&packet) {
                Ok(()) => {
                    let mut stats = stats.lock();
                    stats.frames_sent += 1;
                    stats.bytes_sent += packet.len() as u64;
                }
                Err(e) => {
                    tracing::error!(error = %e, "frame send failed");
                    stats.lock().send_errors += 1;
                    *last_error.lock() = Some(e.to_string());
                    failed.store(true, Ordering::Release);
                }
            }
            in_flight.store(false, Ordering::Release);
        }
        tracing::debug!("frame link thread stopped");
    }

    /// Offer one RGB frame
    ///
    /// The sequence number advances on every attempted send, including ones
    /// whose write later fails. Dropped frames do not advance it.
    pub fn send_frame(&mut self, rgb: &[u8]) -> SendOutcome {
        let Some(sender) = self.sender.as_ref() else {
            return SendOutcome::Closed;
        };
        if self.failed.load(Ordering::Acquire) {
            return SendOutcome::Closed;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            let mut stats = self.stats.lock();
            stats.frames_dropped += 1;
            return SendOutcome::Dropped { drops: stats.frames_dropped };
        }

        let seq = self.seq;
        let packet = match encode_packet(rgb, seq) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "frame not encodable");
                self.in_flight.store(false, Ordering::Release);
                return SendOutcome::Closed;
            }
        };
        self.seq = self.seq.wrapping_add(1);

        if sender.try_send(packet).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return SendOutcome::Closed;
        }
        self.stats.lock().last_seq = Some(seq);
        SendOutcome::Queued { seq }
    }

    /// Next sequence number to be used
    pub fn seq(&self) -> u16 {
        self.seq
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn drops(&self) -> u64 {
        self.stats.lock().frames_dropped
    }

    pub fn stats(&self) -> LinkStats {
        self.stats.lock().clone()
    }

    /// Error from a failed write, if any; taking it does not reopen the link
    pub fn take_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Stop the link thread after any in-flight write completes
    pub fn close(&mut self) {
        self.sender = None;
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("frame link thread panicked");
            }
        }
    }
}

impl Drop for FrameLink {
    fn drop(&mut self) {
        self.close();
    }
}
