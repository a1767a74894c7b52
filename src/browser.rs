//! Contract for the automated browser the crawler drives.

use crate::error::DriverError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// How to find an interactive element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Matches the `name` attribute.
    Name(String),
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Locator {
    /// WebDriver `using` strategy and value.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Name(name) => ("css selector", format!("[name=\"{}\"]", name)),
            Locator::Css(css) => ("css selector", css.clone()),
            Locator::XPath(xpath) => ("xpath", xpath.clone()),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Name(v) => write!(f, "name={}", v),
            Locator::Css(v) => write!(f, "css={}", v),
            Locator::XPath(v) => write!(f, "xpath={}", v),
        }
    }
}

/// Opaque reference to an element located by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

/// Page source captured at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub html: String,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(html: impl Into<String>) -> Self {
        Snapshot {
            html: html.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Blocking browser operations. Every wait is bounded by the timeout passed
/// to [`BrowserDriver::locate`].
pub trait BrowserDriver {
    fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Scrolls the window to an absolute vertical offset in pixels.
    fn scroll_to(&mut self, offset: u32) -> DriverResult<()>;

    /// Waits until a visible element matches `locator`, or fails with
    /// [`DriverError::Timeout`].
    fn locate(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<ElementHandle>;

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Types `text` one character at a time, sleeping `per_char_delay`
    /// after each.
    fn type_text(&mut self, element: &ElementHandle, text: &str, per_char_delay: Duration) -> DriverResult<()>;

    fn press_enter(&mut self, element: &ElementHandle) -> DriverResult<()>;

    fn current_snapshot(&mut self) -> DriverResult<Snapshot>;

    fn quit(&mut self) -> DriverResult<()>;
}
