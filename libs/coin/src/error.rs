use thiserror::Error;

/// Failure to obtain a quote for one symbol.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected status code: {0}")]
    Status(u16),

    #[error("failed to decode body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("price api error: {0}")]
    Api(String),

    #[error("no USD quote for {0}")]
    MissingQuote(String),

    #[error("unrepresentable price: {0}")]
    InvalidPrice(String),

    #[error("response has no date header")]
    MissingDateHeader,

    #[error("failed to parse date header: {0}")]
    InvalidDateHeader(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(e)
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("no observation found")]
    NotFound,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store operation timed out")]
    Timeout,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollerError {
    #[error("poller is already running")]
    AlreadyRunning,

    #[error("poller has been stopped and cannot be restarted")]
    Stopped,

    #[error("poll interval must be greater than zero")]
    InvalidInterval,
}
