use crate::browser::{BrowserDriver, ElementHandle, Locator, Snapshot};
use crate::config::CrawlConfig;
use crate::delay_manager::settle;
use crate::error::{CrawlError, DriverError, Phase, Result};
use log::{info, warn};
use scraper::Html;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the login and search-entry sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Start,
    UsernameEntered,
    PasswordEntered,
    Authenticated,
    /// The site asked to confirm the account email before searching.
    AwaitingIdentityVerification,
    SearchReady,
}

/// Drives the login form one transition at a time, then locates the
/// search box, passing through identity verification when the page asks
/// for it.
#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

fn require<D: BrowserDriver>(
    driver: &mut D,
    locator: &Locator,
    config: &CrawlConfig,
    phase: Phase,
    what: &str,
) -> Result<ElementHandle> {
    match driver.locate(locator, config.element_timeout) {
        Ok(element) => Ok(element),
        Err(DriverError::Timeout(_)) => Err(CrawlError::element_not_loaded(phase, what)),
        Err(e) => Err(e.into()),
    }
}

/// Visible text of a page, tags stripped.
pub fn page_text(html: &str) -> String {
    Html::parse_document(html).root_element().text().collect()
}

/// Writes the page source where it can be inspected after a failed run.
pub fn dump_page(path: &Path, snapshot: &Snapshot) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    fs::write(&path, &snapshot.html)?;
    Ok(path)
}

impl SessionController {
    pub fn new() -> Self {
        SessionController {
            state: SessionState::Start,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::AwaitingIdentityVerification | SessionState::SearchReady
        )
    }

    /// Performs the next login transition. Once authenticated this is a
    /// no-op.
    pub fn step<D: BrowserDriver>(&mut self, driver: &mut D, config: &CrawlConfig) -> Result<SessionState> {
        let profile = &config.profile;
        let pacing = config.pacing;
        let credentials = &config.credentials;

        self.state = match self.state {
            SessionState::Start => {
                let input = require(driver, &profile.username_input, config, Phase::Login, "Username input not loaded")?;
                settle(pacing.before_typing);
                driver.type_text(&input, &credentials.username, pacing.keystroke)?;
                SessionState::UsernameEntered
            }
            SessionState::UsernameEntered => {
                let next = require(
                    driver,
                    &profile.username_next,
                    config,
                    Phase::Login,
                    "Button to be pressed after the username input not loaded",
                )?;
                settle(pacing.before_click);
                driver.click(&next)?;

                let input = require(driver, &profile.password_input, config, Phase::Login, "Password input not loaded")?;
                settle(pacing.before_typing);
                driver.type_text(&input, &credentials.password, pacing.keystroke)?;
                SessionState::PasswordEntered
            }
            SessionState::PasswordEntered => {
                let submit = require(
                    driver,
                    &profile.password_submit,
                    config,
                    Phase::Login,
                    "Button to be pressed after the password input not loaded",
                )?;
                settle(pacing.before_click);
                driver.click(&submit)?;
                info!("Logged in successfully");
                SessionState::Authenticated
            }
            other => other,
        };
        Ok(self.state)
    }

    /// Runs every login transition up to `Authenticated`.
    pub fn login<D: BrowserDriver>(&mut self, driver: &mut D, config: &CrawlConfig) -> Result<()> {
        info!("Logging in as {}", config.credentials.username);
        while !self.is_authenticated() {
            self.step(driver, config)?;
        }
        Ok(())
    }

    /// Locates the search box. When it does not show up and the page asks
    /// for the account email, types it and tries once more. A search box
    /// that never appears leaves a page dump behind.
    pub fn open_search<D: BrowserDriver>(&mut self, driver: &mut D, config: &CrawlConfig) -> Result<ElementHandle> {
        if !self.is_authenticated() {
            return Err(CrawlError::Config(format!(
                "cannot search from session state {:?}",
                self.state
            )));
        }
        let profile = &config.profile;

        if let Some(searchbox) = self.try_search_input(driver, config)? {
            return Ok(searchbox);
        }

        let page = driver.current_snapshot()?;
        if page_text(&page.html).contains(&profile.verification_marker) {
            warn!("The site is asking to verify the identity by entering the email address");
            self.state = SessionState::AwaitingIdentityVerification;
            self.verify_identity(driver, config)?;

            if let Some(searchbox) = self.try_search_input(driver, config)? {
                return Ok(searchbox);
            }
        }

        let dumped = driver
            .current_snapshot()
            .map_err(CrawlError::from)
            .and_then(|page| dump_page(&profile.diagnostic_dump, &page));
        let context = match dumped {
            Ok(dump) => format!("Searchbox not loaded in time. Check {} for more details.", dump.display()),
            Err(e) => {
                warn!("Could not dump the page source: {}", e);
                "Searchbox not loaded in time.".to_string()
            }
        };
        Err(CrawlError::element_not_loaded(Phase::Search, context))
    }

    fn try_search_input<D: BrowserDriver>(&mut self, driver: &mut D, config: &CrawlConfig) -> Result<Option<ElementHandle>> {
        match driver.locate(&config.profile.search_input, config.element_timeout) {
            Ok(searchbox) => {
                self.state = SessionState::SearchReady;
                Ok(Some(searchbox))
            }
            Err(DriverError::Timeout(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn verify_identity<D: BrowserDriver>(&mut self, driver: &mut D, config: &CrawlConfig) -> Result<()> {
        let profile = &config.profile;
        let pacing = config.pacing;

        let input = require(
            driver,
            &profile.verification_input,
            config,
            Phase::Search,
            "Email confirmation input not loaded",
        )?;
        info!("Email confirmation input loaded, entering the email address.");
        driver.type_text(&input, &config.credentials.email_address, pacing.keystroke)?;

        let next = require(
            driver,
            &profile.verification_next,
            config,
            Phase::Search,
            "Button 'next' after the email confirmation did not load",
        )?;
        settle(pacing.before_click);
        driver.click(&next)?;
        Ok(())
    }
}
