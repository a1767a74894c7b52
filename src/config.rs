use crate::date_validator::{self, UNSET};
use crate::error::{CrawlError, Result};
use crate::site_profile::SiteProfile;
use log::warn;
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Used when the site asks to confirm the account email.
    pub email_address: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, email_address: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            email_address: email_address.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email_address", &self.email_address)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Collect image and video-preview links only.
    #[default]
    MediaOnly,
    /// Collect structured records.
    FullRecord,
}

/// Inclusive id bounds. Only ever constructed with both ends present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub since_id: u64,
    pub max_id: u64,
}

impl IdRange {
    pub fn contains(&self, id: u64) -> bool {
        self.since_id <= id && id <= self.max_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl Bounds {
    pub fn is_set(&self) -> bool {
        self.since.is_some() || self.until.is_some()
    }
}

/// Delays used while typing into the page.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub keystroke: Duration,
    pub query_keystroke: Duration,
    pub before_typing: Duration,
    pub before_click: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            keystroke: Duration::from_millis(300),
            query_keystroke: Duration::from_millis(500),
            before_typing: Duration::from_millis(700),
            before_click: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    pub fn immediate() -> Self {
        Pacing {
            keystroke: Duration::ZERO,
            query_keystroke: Duration::ZERO,
            before_typing: Duration::ZERO,
            before_click: Duration::ZERO,
        }
    }
}

/// Validated, read-only crawl parameters.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub credentials: Credentials,
    pub query: String,
    pub mode: Mode,
    pub num_scrolls: u32,
    pub wait_base: f64,
    pub wait_epsilon: f64,
    pub id_range: Option<IdRange>,
    pub date_range: Bounds,
    pub time_range: Bounds,
    pub element_timeout: Duration,
    pub pacing: Pacing,
    pub profile: SiteProfile,
}

impl CrawlConfig {
    pub fn builder(credentials: Credentials, query: impl Into<String>) -> CrawlConfigBuilder {
        CrawlConfigBuilder::new(credentials, query)
    }

    pub fn has_time_filter(&self) -> bool {
        self.time_range.is_set()
    }

    pub fn has_date_filter(&self) -> bool {
        self.date_range.is_set()
    }

    /// The id range applies only when no date or time filter is set.
    pub fn active_id_range(&self) -> Option<IdRange> {
        if self.has_date_filter() || self.has_time_filter() {
            None
        } else {
            self.id_range
        }
    }

    /// Same parameters, different search text. Used by batch runs.
    pub fn with_query(&self, query: impl Into<String>) -> CrawlConfig {
        CrawlConfig {
            query: query.into(),
            ..self.clone()
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != UNSET)
}

#[derive(Debug, Clone)]
pub struct CrawlConfigBuilder {
    credentials: Credentials,
    query: String,
    mode: Mode,
    num_scrolls: u32,
    wait_base: f64,
    wait_epsilon: f64,
    since_id: Option<u64>,
    max_id: Option<u64>,
    date_range: Bounds,
    time_range: Bounds,
    element_timeout: Duration,
    pacing: Pacing,
    profile: SiteProfile,
}

impl CrawlConfigBuilder {
    fn new(credentials: Credentials, query: impl Into<String>) -> Self {
        CrawlConfigBuilder {
            credentials,
            query: query.into(),
            mode: Mode::default(),
            num_scrolls: 10,
            wait_base: 15.0,
            wait_epsilon: 5.0,
            since_id: None,
            max_id: None,
            date_range: Bounds::default(),
            time_range: Bounds::default(),
            element_timeout: Duration::from_secs(30),
            pacing: Pacing::default(),
            profile: SiteProfile::default(),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn num_scrolls(mut self, num_scrolls: u32) -> Self {
        self.num_scrolls = num_scrolls;
        self
    }

    pub fn wait(mut self, base: f64, epsilon: f64) -> Self {
        self.wait_base = base;
        self.wait_epsilon = epsilon;
        self
    }

    pub fn id_range(mut self, since_id: Option<u64>, max_id: Option<u64>) -> Self {
        self.since_id = since_id;
        self.max_id = max_id;
        self
    }

    /// `YYYY-MM-DD` bounds; `"none"` means unset.
    pub fn date_range(mut self, since: Option<String>, until: Option<String>) -> Self {
        self.date_range = Bounds {
            since: normalize(since),
            until: normalize(until),
        };
        self
    }

    /// Epoch-second bounds; `"none"` means unset.
    pub fn time_range(mut self, since: Option<String>, until: Option<String>) -> Self {
        self.time_range = Bounds {
            since: normalize(since),
            until: normalize(until),
        };
        self
    }

    pub fn element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn profile(mut self, profile: SiteProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn build(self) -> Result<CrawlConfig> {
        if self.query.trim().is_empty() {
            return Err(CrawlError::Config("query must not be empty".to_string()));
        }
        if !self.wait_base.is_finite() || !self.wait_epsilon.is_finite() {
            return Err(CrawlError::Config("wait times must be finite".to_string()));
        }
        if self.wait_epsilon < 0.0 || self.wait_epsilon > self.wait_base {
            return Err(CrawlError::Config(format!(
                "wait epsilon {} must be between 0 and the base wait {}",
                self.wait_epsilon, self.wait_base
            )));
        }

        if self.profile.scroll_step == 0 {
            return Err(CrawlError::Config("scroll_step must be positive".to_string()));
        }

        let mut date_range = self.date_range;
        for field in [&mut date_range.since, &mut date_range.until] {
            if let Some(value) = field.as_deref() {
                if let Err(e) = date_validator::check(value) {
                    warn!("{}. Ignoring it.", e);
                    *field = None;
                }
            }
        }

        let id_range = match (self.since_id, self.max_id) {
            (Some(since_id), Some(max_id)) => {
                if since_id > max_id {
                    warn!("since_id {} is greater than max_id {}; no item will match.", since_id, max_id);
                }
                Some(IdRange { since_id, max_id })
            }
            (None, None) => None,
            (since_id, max_id) => {
                warn!(
                    "Only one of since_id/max_id is set ({:?}/{:?}); both are needed. Ignoring the id range.",
                    since_id, max_id
                );
                None
            }
        };

        if id_range.is_some() && (date_range.is_set() || self.time_range.is_set()) {
            warn!("since_id/max_id are ignored because a date or time filter is set.");
        }
        if self.time_range.is_set() && date_range.is_set() {
            warn!("since/until dates are ignored because since_time/until_time is set.");
        }

        Ok(CrawlConfig {
            credentials: self.credentials,
            query: self.query,
            mode: self.mode,
            num_scrolls: self.num_scrolls,
            wait_base: self.wait_base,
            wait_epsilon: self.wait_epsilon,
            id_range,
            date_range,
            time_range: self.time_range,
            element_timeout: self.element_timeout,
            pacing: self.pacing,
            profile: self.profile,
        })
    }
}
