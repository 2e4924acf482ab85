//! Server-sent events from the portal's `/events` channel.
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;

use super::{
    errors::{FetchError, SseError},
    models::settings_model::SettingsPatch,
};

pub const BACKOFF_FACTOR: f64 = 1.7;
/// Longest line the parser buffers before giving up on the stream.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Push notifications the display reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    DoctorUpdate,
    SpecialtyOrderUpdated,
    ClosureUpdate,
    DisplaySettings(SettingsPatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser, chunks may split lines anywhere.
#[derive(Debug)]
pub struct SseParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
    max_line: usize,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseParser {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            event: None,
            data: None,
            max_line,
        }
    }

    /// Parses whatever complete messages the buffered input holds.
    /// A line over the limit drops all buffered state and fails the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseMessage>, SseError> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            if newline > self.max_line {
                return Err(self.overflow());
            }
            let line = self.pending.drain(..=newline).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(message) = self.process_line(line) {
                messages.push(message);
            }
        }
        if self.pending.len() > self.max_line {
            return Err(self.overflow());
        }
        Ok(messages)
    }

    fn overflow(&mut self) -> SseError {
        self.pending.clear();
        self.event = None;
        self.data = None;
        SseError::LineTooLong(self.max_line)
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            let event = self.event.take();
            let data = self.data.take()?;
            return Some(SseMessage {
                event: event.unwrap_or_else(|| "message".to_owned()),
                data,
            });
        }
        if line.starts_with(':') {
            /* comment, the portal sends `: ping` heartbeats */
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            _ => {}
        }
        None
    }
}

/// Maps a raw message to something the display cares about.
/// Unknown events and malformed settings payloads are dropped.
pub fn to_push_event(message: &SseMessage) -> Option<PushEvent> {
    match message.event.as_str() {
        "doctor_update" => Some(PushEvent::DoctorUpdate),
        "specialty_order_updated" => Some(PushEvent::SpecialtyOrderUpdated),
        "closure_update" => Some(PushEvent::ClosureUpdate),
        "patient_display_settings" => {
            let data = if message.data.trim().is_empty() {
                "{}"
            } else {
                message.data.as_str()
            };
            match serde_json::from_str::<SettingsPatch>(data) {
                Ok(patch) => Some(PushEvent::DisplaySettings(patch)),
                Err(e) => {
                    warn!("Ignoring malformed display settings push: {}", e);
                    None
                }
            }
        }
        other => {
            debug!("Ignoring push event {}", other);
            None
        }
    }
}

pub fn next_retry_delay(current: Duration, max: Duration) -> Duration {
    Duration::from_millis((current.as_millis() as f64 * BACKOFF_FACTOR) as u64).min(max)
}

/// Keeps a connection to `/events` open and forwards events into the display loop.
/// Reconnects with exponential backoff, gives up after `max_retries` failures in a row.
pub struct PushListener {
    http_client: Client,
    url: String,
    initial_retry: Duration,
    max_retry: Duration,
    max_retries: u32,
}

impl PushListener {
    pub fn new(
        http_client: Client,
        url: String,
        initial_retry: Duration,
        max_retry: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            http_client,
            url,
            initial_retry,
            max_retry,
            max_retries,
        }
    }

    pub async fn run(self, tx: UnboundedSender<PushEvent>) {
        let mut delay = self.initial_retry;
        let mut failures = 0;
        loop {
            let mut connected = false;
            match self.listen(&tx, &mut connected).await {
                Ok(()) => {
                    info!("Display loop is gone, closing push stream");
                    return;
                }
                Err(e) => warn!("Push stream interrupted: {}", e),
            }
            if connected {
                delay = self.initial_retry;
                failures = 0;
            }
            failures += 1;
            if failures > self.max_retries {
                error!(
                    "Giving up on push stream after {} failed attempts, relying on polling",
                    failures - 1
                );
                return;
            }
            debug!("Reconnecting to push stream in {:?}", delay);
            tokio::time::sleep(delay).await;
            delay = next_retry_delay(delay, self.max_retry);
        }
    }

    /* Ok(()) only when the receiving side hung up */
    async fn listen(
        &self,
        tx: &UnboundedSender<PushEvent>,
        connected: &mut bool,
    ) -> Result<(), FetchError> {
        let response = self
            .http_client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed(self.url.clone(), e))?;
        if !response.status().is_success() {
            return Err(FetchError::InvalidStatusCode(
                self.url.clone(),
                response.status(),
            ));
        }
        *connected = true;
        info!("Listening for push events on {}", self.url);

        let mut parser = SseParser::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::RequestFailed(self.url.clone(), e))?;
            let messages = parser
                .feed(&chunk)
                .map_err(|e| FetchError::Stream(self.url.clone(), e))?;
            for message in messages {
                let Some(event) = to_push_event(&message) else {
                    continue;
                };
                debug!("Push event {:?}", event);
                if tx.send(event).is_err() {
                    return Ok(());
                }
            }
        }
        Err(FetchError::StreamEnded(self.url.clone()))
    }
}
