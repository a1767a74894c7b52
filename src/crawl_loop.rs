use crate::browser::BrowserDriver;
use crate::config::{CrawlConfig, Mode};
use crate::dedup_store::DeduplicationStore;
use crate::delay_manager::RateLimiter;
use crate::error::{CrawlError, Result};
use crate::extractor::{ExtractionStats, RecordExtractor};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    /// Iteration `n` (1-based) has completed.
    Scrolling(u32),
    Done,
}

/// Totals over a whole loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u32,
    pub added: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
}

impl LoopSummary {
    fn absorb(&mut self, stats: ExtractionStats) {
        self.added += stats.added;
        self.duplicates += stats.duplicates;
        self.out_of_range += stats.out_of_range;
    }
}

/// Scrolls the result page a fixed number of times, extracting after each
/// scroll. Always performs `num_scrolls` iterations, even when nothing new
/// shows up.
pub struct CrawlLoop<'a> {
    config: &'a CrawlConfig,
    extractor: &'a RecordExtractor,
    query: &'a str,
    state: LoopState,
    offset: u32,
}

impl<'a> CrawlLoop<'a> {
    /// `query` is the composed search text, used in error reports.
    pub fn new(config: &'a CrawlConfig, extractor: &'a RecordExtractor, query: &'a str) -> Self {
        CrawlLoop {
            config,
            extractor,
            query,
            state: LoopState::Init,
            offset: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn run<D: BrowserDriver>(
        &mut self,
        driver: &mut D,
        limiter: &mut RateLimiter,
        store: &mut DeduplicationStore,
    ) -> Result<LoopSummary> {
        let config = self.config;
        let id_range = match config.mode {
            Mode::FullRecord => {
                match config.active_id_range() {
                    Some(range) => info!(
                        "since_id and max_id are set. since_id = {}, max_id = {}.",
                        range.since_id, range.max_id
                    ),
                    None => info!("since_id and max_id are not in use."),
                }
                config.active_id_range()
            }
            Mode::MediaOnly => {
                if config.id_range.is_some() {
                    info!("Media-only crawl does not see item ids. Ignoring since_id and max_id.");
                }
                None
            }
        };

        self.check_landing(driver)?;

        let mut summary = LoopSummary::default();
        while let Some(iteration) = self.next_iteration() {
            info!("Performing scroll {} of {}", iteration, config.num_scrolls);

            self.offset = self.offset.saturating_add(config.profile.scroll_step);
            driver.scroll_to(self.offset)?;
            limiter.pause(config.wait_base, config.wait_epsilon, "scroll");

            let snapshot = driver.current_snapshot()?;
            debug!("Snapshot at offset {} captured {}", self.offset, snapshot.captured_at.format("%H:%M:%S%.3f"));
            let stats = self.extractor.extract(&snapshot, config.mode, id_range, store);
            summary.absorb(stats);
            summary.iterations = iteration;
            self.state = LoopState::Scrolling(iteration);
        }
        self.state = LoopState::Done;

        info!(
            "Crawl of '{}' done: {} new, {} repeated, {} out of range",
            self.query, summary.added, summary.duplicates, summary.out_of_range
        );
        Ok(summary)
    }

    /// A result page without a single candidate container ends the crawl.
    fn check_landing<D: BrowserDriver>(&mut self, driver: &mut D) -> Result<()> {
        let snapshot = driver.current_snapshot()?;
        if self.extractor.count_candidates(&snapshot) == 0 {
            self.state = LoopState::Done;
            return Err(CrawlError::NoTweetsReturned(self.query.to_string()));
        }
        Ok(())
    }

    fn next_iteration(&self) -> Option<u32> {
        let next = match self.state {
            LoopState::Init => 1,
            LoopState::Scrolling(done) => done + 1,
            LoopState::Done => return None,
        };
        (next <= self.config.num_scrolls).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{Action, FakeDriver};
    use crate::config::{Credentials, Pacing};
    use crate::extractor::fixtures::{page, timeline, tweet};
    use crate::site_profile::SiteProfile;

    fn config(mode: Mode, num_scrolls: u32, ids: Option<(u64, u64)>) -> CrawlConfig {
        CrawlConfig::builder(Credentials::new("u", "p", "e"), "rust")
            .mode(mode)
            .num_scrolls(num_scrolls)
            .wait(0.0, 0.0)
            .id_range(ids.map(|r| r.0), ids.map(|r| r.1))
            .pacing(Pacing::immediate())
            .build()
            .unwrap()
    }

    // Landing page, then one snapshot per scroll.
    fn three_scrolls() -> Vec<String> {
        vec![timeline(&[100]), timeline(&[100]), timeline(&[100, 101]), timeline(&[102])]
    }

    fn ids(store: &DeduplicationStore) -> Vec<String> {
        store.records().iter().map(|r| r.tweet_id.clone()).collect()
    }

    fn run(config: &CrawlConfig, driver: &mut FakeDriver) -> (Result<LoopSummary>, DeduplicationStore, LoopState) {
        let extractor = RecordExtractor::new(&config.profile).unwrap();
        let mut limiter = RateLimiter::with_seed(0);
        let mut store = DeduplicationStore::new();
        let mut crawl = CrawlLoop::new(config, &extractor, "rust");
        let result = crawl.run(driver, &mut limiter, &mut store);
        (result, store, crawl.state())
    }

    #[test]
    fn repeated_items_are_collected_once() {
        let config = config(Mode::FullRecord, 3, None);
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        let (result, store, state) = run(&config, &mut driver);

        let summary = result.unwrap();
        assert_eq!(ids(&store), ["100", "101", "102"]);
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(state, LoopState::Done);
    }

    #[test]
    fn id_range_narrows_the_same_crawl() {
        let config = config(Mode::FullRecord, 3, Some((101, 102)));
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        let (result, store, _) = run(&config, &mut driver);

        assert_eq!(ids(&store), ["101", "102"]);
        assert_eq!(result.unwrap().out_of_range, 2);
    }

    #[test]
    fn scroll_offset_accumulates() {
        let config = config(Mode::FullRecord, 4, None);
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        run(&config, &mut driver).0.unwrap();
        assert_eq!(driver.scroll_offsets(), [500, 1000, 1500, 2000]);
    }

    #[test]
    fn scroll_offset_saturates() {
        let profile = SiteProfile {
            scroll_step: u32::MAX - 100,
            ..SiteProfile::default()
        };
        let config = CrawlConfig::builder(Credentials::new("u", "p", "e"), "rust")
            .num_scrolls(3)
            .wait(0.0, 0.0)
            .pacing(Pacing::immediate())
            .profile(profile)
            .build()
            .unwrap();
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        run(&config, &mut driver).0.unwrap();
        assert_eq!(driver.scroll_offsets(), [u32::MAX - 100, u32::MAX, u32::MAX]);
    }

    #[test]
    fn every_snapshot_follows_its_scroll() {
        let config = config(Mode::MediaOnly, 2, None);
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        run(&config, &mut driver).0.unwrap();
        assert_eq!(
            driver.actions,
            [
                Action::Snapshot,
                Action::Scroll(500),
                Action::Snapshot,
                Action::Scroll(1000),
                Action::Snapshot
            ]
        );
    }

    #[test]
    fn empty_landing_page_means_no_tweets() {
        let config = config(Mode::FullRecord, 3, None);
        let mut driver = FakeDriver::new().with_snapshots([page(&[]), timeline(&[1])]);
        let (result, store, state) = run(&config, &mut driver);

        match result {
            Err(CrawlError::NoTweetsReturned(query)) => assert_eq!(query, "rust"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(store.record_count(), 0);
        assert_eq!(state, LoopState::Done);
        assert!(driver.scroll_offsets().is_empty());
    }

    #[test]
    fn later_empty_scroll_is_not_an_error() {
        let config = config(Mode::FullRecord, 3, None);
        let mut driver = FakeDriver::new().with_snapshots([timeline(&[1]), timeline(&[1]), page(&[])]);
        let (result, store, _) = run(&config, &mut driver);

        assert_eq!(result.unwrap().iterations, 3);
        assert_eq!(ids(&store), ["1"]);
    }

    #[test]
    fn zero_scrolls_only_check_landing_page() {
        let config = config(Mode::FullRecord, 0, None);
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        let (result, store, _) = run(&config, &mut driver);
        assert_eq!(result.unwrap().iterations, 0);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn driver_failure_keeps_what_was_merged() {
        let config = config(Mode::FullRecord, 3, None);
        let mut driver = FakeDriver::new().with_snapshots(three_scrolls());
        driver.fail_snapshot_after = Some(2);
        let (result, store, state) = run(&config, &mut driver);

        assert!(matches!(result, Err(CrawlError::Driver(_))));
        assert_eq!(ids(&store), ["100"]);
        assert_eq!(state, LoopState::Scrolling(1));
    }

    #[test]
    fn media_only_ignores_id_range() {
        let img = "https://pbs.twimg.com/media/a.jpg";
        let config = config(Mode::MediaOnly, 1, Some((5, 6)));
        let snapshot = page(&[tweet("x", 1, None, &[img])]);
        let mut driver = FakeDriver::new().with_snapshots([snapshot.clone(), snapshot]);
        let (_, store, _) = run(&config, &mut driver);
        assert_eq!(store.media().images, [img]);
    }
}
