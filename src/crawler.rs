use crate::browser::BrowserDriver;
use crate::config::{CrawlConfig, Mode};
use crate::crawl_loop::{CrawlLoop, LoopSummary};
use crate::dedup_store::{CrawlResults, DeduplicationStore};
use crate::delay_manager::{settle, RateLimiter};
use crate::error::Result;
use crate::extractor::RecordExtractor;
use crate::query_builder;
use crate::session::{SessionController, SessionState};
use log::info;

/// Owns one browser session and everything accumulated through it.
pub struct Crawler<D: BrowserDriver> {
    driver: D,
    config: CrawlConfig,
    session: SessionController,
    extractor: RecordExtractor,
    limiter: RateLimiter,
    store: DeduplicationStore,
}

impl<D: BrowserDriver> Crawler<D> {
    pub fn new(driver: D, config: CrawlConfig) -> Result<Self> {
        let extractor = RecordExtractor::new(&config.profile)?;
        Ok(Crawler {
            driver,
            config,
            session: SessionController::new(),
            extractor,
            limiter: RateLimiter::new(),
            store: DeduplicationStore::new(),
        })
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn results(&self) -> &DeduplicationStore {
        &self.store
    }

    pub fn login(&mut self) -> Result<()> {
        self.driver.navigate(&self.config.profile.login_url)?;
        self.session.login(&mut self.driver, &self.config)
    }

    /// Types the composed query into the search box and scrolls through
    /// the results.
    pub fn search(&mut self) -> Result<LoopSummary> {
        let searchbox = self.session.open_search(&mut self.driver, &self.config)?;
        let pacing = self.config.pacing;

        settle(pacing.before_typing);
        self.driver.clear(&searchbox)?;

        let query = query_builder::build(&self.config);
        info!("Starting to input '{}' in the searchbox", query);
        self.driver.type_text(&searchbox, &query, pacing.query_keystroke)?;
        self.driver.press_enter(&searchbox)?;
        settle(pacing.before_click);

        self.limiter
            .pause(self.config.wait_base, self.config.wait_epsilon, "first results");

        let mut crawl = CrawlLoop::new(&self.config, &self.extractor, &query);
        crawl.run(&mut self.driver, &mut self.limiter, &mut self.store)
    }

    /// Logs in, searches and hands back everything collected.
    pub fn run(&mut self) -> Result<CrawlResults> {
        if !self.session.is_authenticated() {
            self.login()?;
        }
        self.search()?;
        Ok(self.take_results())
    }

    pub fn go_home(&mut self) -> Result<()> {
        info!("Going to the homepage.");
        self.driver.navigate(&self.config.profile.home_url)?;
        Ok(())
    }

    pub fn take_results(&mut self) -> CrawlResults {
        match self.config.mode {
            Mode::MediaOnly => CrawlResults::Media(self.store.drain_media()),
            Mode::FullRecord => CrawlResults::Records(self.store.drain_records()),
        }
    }

    pub fn clear_results(&mut self) {
        self.store.clear();
    }

    pub fn log_results(&self) {
        match self.config.mode {
            Mode::MediaOnly => {
                let media = self.store.media();
                info!("Images found: {}", media.images.len());
                for image in &media.images {
                    info!("    {}", image);
                }
                info!("Video previews found: {}", media.video_previews.len());
                for video in &media.video_previews {
                    info!("    {}", video);
                }
            }
            Mode::FullRecord => {
                info!("Tweets found: {}", self.store.record_count());
                for record in self.store.records() {
                    info!("    {} @{}: {}", record.display_timestamp, record.username, record.discussion_link);
                }
            }
        }
    }

    pub fn quit(mut self) -> Result<()> {
        self.driver.quit()?;
        Ok(())
    }
}

/// One full crawl on a fresh driver: login, query, scroll, quit.
pub fn run<D: BrowserDriver>(driver: D, config: CrawlConfig) -> Result<CrawlResults> {
    let mut crawler = Crawler::new(driver, config)?;
    let outcome = crawler.run();
    let closed = crawler.quit();
    let results = outcome?;
    closed?;
    Ok(results)
}
