use thiserror::Error;

#[derive(Error, Debug)]
pub enum NagareError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Invalid notification payload: {0}")]
    NotificationParseError(String),

    #[error("Notification channel error: {0}")]
    SubscriptionError(String),

    #[error("Append rejected: {0}")]
    AppendError(#[from] AppendError),

    #[error("Invalid codec descriptor: {0}")]
    InvalidCodec(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid relay frame: {0}")]
    FramingError(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

impl NagareError {
    /// Whether the error ends the playback session.
    ///
    /// Notification and retrieval failures are recovered by the controller,
    /// anything touching the sink or the channel itself is not.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotificationParseError(_) | Self::HttpError(_) | Self::RequestError(_)
        )
    }

    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }
}

#[derive(Error, Debug)]
pub enum AppendError {
    #[error("codec mismatch: expected {expected}, found {found}")]
    CodecMismatch { expected: String, found: String },

    #[error("invalid fragment data: {0}")]
    InvalidData(String),

    #[error("sink closed")]
    Closed,

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub type NagareResult<T> = Result<T, NagareError>;
