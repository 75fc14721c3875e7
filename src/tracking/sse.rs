//! Server-sent event client for the external track feed
//!
//! A background thread holds the HTTP stream open, parses events and forwards
//! them as [`FeedEvent`]s over a channel. The tick loop drains the channel into
//! its [`FeedState`] without blocking. Dropped connections are retried after
//! [`RECONNECT_DELAY`].

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::feed::{FeedEvent, FeedState, FeedStatus};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Feed connection errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("no feed url configured")]
    NoUrl,

    #[error("connect failed: {0}")]
    Connect(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("stream read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to spawn feed thread: {0}")]
    Spawn(String),
}

/// Incremental `text/event-stream` parser
#[derive(Debug, Clone, Default)]
pub struct SseParser {
    event: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line without its terminator; a blank line dispatches
    pub fn push_line(&mut self, line: &str) -> Option<(String, String)> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<(String, String)> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        let event = if event.is_empty() { "message".to_string() } else { event };
        Some((event, data))
    }
}

/// Handle to the feed thread
pub struct FeedClient {
    url: String,
    receiver: Receiver<FeedEvent>,
    stop: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl FeedClient {
    /// Start connecting to `url`
    pub fn connect(url: &str) -> Result<Self, FeedError> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(FeedError::NoUrl);
        }
        let (sender, receiver) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_handle = {
            let url = url.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("track-feed".to_string())
                .spawn(move || Self::feed_thread(url, sender, stop))
                .map_err(|e| FeedError::Spawn(e.to_string()))?
        };

        Ok(Self { url, receiver, stop, thread_handle: Some(thread_handle) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn feed_thread(url: String, sender: Sender<FeedEvent>, stop: Arc<AtomicBool>) {
        tracing::info!(url = %url, "track feed thread started");
        let client = match reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to build http client");
                let _ = sender.send(FeedEvent::Error(e.to_string()));
                return;
            }
        };

        let mut detail = String::new();
        while !stop.load(Ordering::Acquire) {
            if sender.send(FeedEvent::Connecting(detail.clone())).is_err() {
                break;
            }
            match Self::stream_once(&client, &url, &sender, &stop) {
                Ok(()) => tracing::info!("track feed closed by server"),
                Err(e) => tracing::warn!(error = %e, "track feed error"),
            }
            if stop.load(Ordering::Acquire) {
                break;
            }
            detail = "reconnecting".to_string();
            std::thread::sleep(RECONNECT_DELAY);
        }
        tracing::info!("track feed thread stopped");
    }

    fn stream_once(
        client: &reqwest::blocking::Client,
        url: &str,
        sender: &Sender<FeedEvent>,
        stop: &AtomicBool,
    ) -> Result<(), FeedError> {
        let response = client.get(url).header("Accept", "text/event-stream").send()?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let _ = sender.send(FeedEvent::Open);

        let mut parser = SseParser::new();
        let mut reader = BufReader::new(response);
        let mut line = String::new();
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(());
            }
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let trimmed = line.strip_suffix('\n').unwrap_or(&line);
            if let Some((event, data)) = parser.push_line(trimmed) {
                if sender.send(FeedEvent::Message { event, data }).is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Apply every pending event to `state`
    pub fn drain(&self, state: &mut FeedState, now: f64) -> usize {
        let mut n = 0;
        for event in self.receiver.try_iter() {
            state.handle_event(event, now);
            n += 1;
        }
        n
    }

    /// Ask the thread to stop
    ///
    /// A thread blocked on a quiet stream notices at its next line or
    /// reconnect; it is detached rather than joined.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a client for `url`, recording the outcome in `state`
///
/// Clears cached feed messages first. An empty url leaves the feed idle.
pub fn open_feed(url: &str, state: &mut FeedState) -> Option<FeedClient> {
    state.clear();
    match FeedClient::connect(url) {
        Ok(client) => {
            state.set_status(FeedStatus::Connecting, "");
            Some(client)
        }
        Err(FeedError::NoUrl) => {
            state.set_status(FeedStatus::Idle, "no url");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "track feed not started");
            state.set_status(FeedStatus::Error, "connect failed");
            None
        }
    }
}
