use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

/// Phase of a crawl in which an interactive element was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Login,
    Search,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Login => write!(f, "login"),
            Phase::Search => write!(f, "search"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Wrong date string '{value}', expected format {expected}")]
    WrongDateString { value: String, expected: &'static str },

    #[error("Element not loaded during {phase}: {context}")]
    ElementNotLoaded { phase: Phase, context: String },

    #[error("No tweets returned for query '{0}'")]
    NoTweetsReturned(String),

    #[error("Browser driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed output file: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CrawlError {
    pub fn element_not_loaded(phase: Phase, context: impl Into<String>) -> Self {
        CrawlError::ElementNotLoaded {
            phase,
            context: context.into(),
        }
    }
}

/// Failures reported by a [`crate::browser::BrowserDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("WebDriver error (status {status}): {message}")]
    Protocol { status: u16, message: String },
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriverError::Timeout(err.to_string())
        } else {
            DriverError::Network(err.to_string())
        }
    }
}
