use thiserror::Error;

/// Everything that can go wrong while talking to the portal server.
/// None of these are fatal for the display, the caller keeps its last good data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    #[error("Request to {0} failed: {1}")]
    RequestFailed(String, #[source] reqwest::Error),

    #[error("Request to {0} failed: HTTP status {1}")]
    InvalidStatusCode(String, reqwest::StatusCode),

    #[error("Malformed response from {0}: {1}")]
    Decode(String, #[source] reqwest::Error),

    #[error("Unreadable image from {0}: {1}")]
    Image(String, #[source] image::ImageError),

    #[error("Push stream from {0} ended")]
    StreamEnded(String),

    #[error("Broken push stream from {0}: {1}")]
    Stream(String, #[source] SseError),
}

/// Framing problems in a `text/event-stream` body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SseError {
    #[error("line longer than {0} bytes")]
    LineTooLong(usize),
}
