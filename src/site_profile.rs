use crate::browser::Locator;
use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Site-specific markup and endpoints. Everything the crawler knows about
/// the target site lives here so it can be swapped without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub login_url: String,
    pub home_url: String,
    /// Prefix joined with a discussion path to form a permalink.
    pub base_url: String,

    pub username_input: Locator,
    pub username_next: Locator,
    pub password_input: Locator,
    pub password_submit: Locator,
    pub verification_input: Locator,
    pub verification_next: Locator,
    pub search_input: Locator,
    /// Page text shown when the site asks to confirm the account email.
    pub verification_marker: String,

    pub container_selector: String,
    pub anchor_selector: String,
    pub text_selector: String,
    pub image_pattern: String,
    pub video_preview_pattern: String,

    /// Vertical pixels added to the scroll offset on every iteration.
    pub scroll_step: u32,
    pub diagnostic_dump: PathBuf,
}

impl Default for SiteProfile {
    fn default() -> Self {
        SiteProfile {
            login_url: "https://www.twitter.com/login".to_string(),
            home_url: "https://twitter.com/home".to_string(),
            base_url: "https://twitter.com".to_string(),
            username_input: Locator::Name("text".to_string()),
            username_next: Locator::XPath(
                "//div[@role='button'][.//span[text()='Next']]".to_string(),
            ),
            password_input: Locator::Name("password".to_string()),
            password_submit: Locator::Css("[data-testid='LoginForm_Login_Button']".to_string()),
            verification_input: Locator::Name("text".to_string()),
            verification_next: Locator::Css("[data-testid='ocfEnterTextNextButton']".to_string()),
            search_input: Locator::XPath("//input[@aria-label='Search query']".to_string()),
            verification_marker: "Verify your identity by entering the email address".to_string(),
            container_selector: "div[data-testid='cellInnerDiv']".to_string(),
            anchor_selector: "a[href*='/status/']".to_string(),
            text_selector: "div[data-testid='tweetText']".to_string(),
            image_pattern: r"^https://pbs\.twimg\.com/media".to_string(),
            video_preview_pattern: r"^https://pbs\.twimg\.com/ext_tw_video_thumb".to_string(),
            scroll_step: 500,
            diagnostic_dump: PathBuf::from("postget_error_soupfile.txt"),
        }
    }
}

impl SiteProfile {
    /// Loads a profile from JSON. Missing keys fall back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CrawlError::Config(format!("cannot read site profile {}: {}", path.display(), e))
        })?;
        let profile: SiteProfile = serde_json::from_str(&content)?;
        if profile.scroll_step == 0 {
            return Err(CrawlError::Config("scroll_step must be positive".to_string()));
        }
        Ok(profile)
    }
}
