use crate::browser::Snapshot;
use crate::config::{IdRange, Mode};
use crate::dedup_store::{DeduplicationStore, Record};
use crate::error::{CrawlError, Result};
use crate::site_profile::SiteProfile;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counters for one snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub containers: usize,
    pub added: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
    pub skipped: usize,
}

/// Turns rendered snapshots into records or media links.
pub struct RecordExtractor {
    container: Selector,
    anchor: Selector,
    time: Selector,
    text: Selector,
    image: Selector,
    video: Selector,
    image_regex: Regex,
    video_regex: Regex,
    discussion_regex: Regex,
    base_url: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CrawlError::Config(format!("invalid selector '{}': {}", css, e)))
}

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| CrawlError::Config(format!("invalid pattern '{}': {}", re, e)))
}

/// Splits `/<username>/status/<id>` into its two variable segments.
pub fn parse_discussion_path<'a>(re: &Regex, href: &'a str) -> Option<(&'a str, &'a str)> {
    let caps = re.captures(href)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// `2023-05-01T10:20:30.000Z` becomes `2023-05-01 10:20:30`.
pub fn normalize_timestamp(iso: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(iso, ISO_FORMAT)
        .ok()
        .map(|dt| dt.format(DISPLAY_FORMAT).to_string())
}

impl RecordExtractor {
    pub fn new(profile: &SiteProfile) -> Result<Self> {
        Ok(RecordExtractor {
            container: selector(&profile.container_selector)?,
            anchor: selector(&profile.anchor_selector)?,
            time: selector("time")?,
            text: selector(&profile.text_selector)?,
            image: selector("img")?,
            video: selector("video")?,
            image_regex: pattern(&profile.image_pattern)?,
            video_regex: pattern(&profile.video_preview_pattern)?,
            discussion_regex: pattern(r"^/([^/]+)/status/([0-9]+)$")?,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn count_candidates(&self, snapshot: &Snapshot) -> usize {
        let document = Html::parse_document(&snapshot.html);
        document.select(&self.container).count()
    }

    /// Merges everything new in `snapshot` into `store`.
    pub fn extract(
        &self,
        snapshot: &Snapshot,
        mode: Mode,
        id_range: Option<IdRange>,
        store: &mut DeduplicationStore,
    ) -> ExtractionStats {
        let document = Html::parse_document(&snapshot.html);
        match mode {
            Mode::MediaOnly => self.extract_media(&document, store),
            Mode::FullRecord => self.extract_records(&document, id_range, store),
        }
    }

    fn extract_media(&self, document: &Html, store: &mut DeduplicationStore) -> ExtractionStats {
        let mut stats = ExtractionStats {
            containers: document.select(&self.container).count(),
            ..Default::default()
        };

        for link in self.image_links(document.root_element()) {
            if store.insert_image(link) {
                stats.added += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        for link in self.video_links(document.root_element()) {
            if store.insert_video_preview(link) {
                stats.added += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        stats
    }

    fn extract_records(
        &self,
        document: &Html,
        id_range: Option<IdRange>,
        store: &mut DeduplicationStore,
    ) -> ExtractionStats {
        let mut stats = ExtractionStats::default();

        for container in document.select(&self.container) {
            stats.containers += 1;

            // Trailing placeholder cells carry no discussion anchor.
            let Some((anchor, href)) = self.discussion_anchor(container) else {
                continue;
            };
            let Some((username, tweet_id)) = parse_discussion_path(&self.discussion_regex, href) else {
                continue;
            };

            if let Some(range) = id_range {
                let in_range = tweet_id.parse::<u64>().map(|id| range.contains(id)).unwrap_or(false);
                if !in_range {
                    info!(
                        "Tweet {} not in the range [{}, {}]. Skipping it",
                        tweet_id, range.since_id, range.max_id
                    );
                    stats.out_of_range += 1;
                    continue;
                }
            }

            if store.contains_record(href) {
                stats.duplicates += 1;
                continue;
            }

            match self.build_record(container, anchor, href, username, tweet_id) {
                Some(record) => {
                    debug!("New tweet {} by {}", record.tweet_id, record.username);
                    store.insert_record(href, record);
                    stats.added += 1;
                }
                None => stats.skipped += 1,
            }
        }
        stats
    }

    /// First anchor in the container pointing at a discussion and carrying
    /// a `time` element.
    fn discussion_anchor<'a>(&self, container: ElementRef<'a>) -> Option<(ElementRef<'a>, &'a str)> {
        container.select(&self.anchor).find_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if !self.discussion_regex.is_match(href) {
                return None;
            }
            anchor.select(&self.time).next()?;
            Some((anchor, href))
        })
    }

    fn build_record(
        &self,
        container: ElementRef<'_>,
        anchor: ElementRef<'_>,
        href: &str,
        username: &str,
        tweet_id: &str,
    ) -> Option<Record> {
        let iso_timestamp = anchor
            .select(&self.time)
            .next()
            .and_then(|time| time.value().attr("datetime"))?;
        let Some(display_timestamp) = normalize_timestamp(iso_timestamp) else {
            warn!("Unreadable timestamp '{}' on {}. Skipping it", iso_timestamp, href);
            return None;
        };

        let text = container
            .select(&self.text)
            .next()
            .map(|block| block.text().collect::<String>());

        Some(Record {
            username: username.to_string(),
            tweet_id: tweet_id.to_string(),
            text,
            discussion_link: format!("{}{}", self.base_url, href),
            iso_timestamp: iso_timestamp.to_string(),
            display_timestamp,
            images: self.image_links(container).map(String::from).collect(),
            video_previews: self.video_links(container).map(String::from).collect(),
        })
    }

    fn image_links<'a>(&'a self, scope: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
        scope
            .select(&self.image)
            .filter_map(|img| img.value().attr("src"))
            .filter(move |src| self.image_regex.is_match(src))
    }

    fn video_links<'a>(&'a self, scope: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
        scope
            .select(&self.video)
            .filter_map(|video| video.value().attr("poster"))
            .filter(move |poster| self.video_regex.is_match(poster))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const IMG: &str = "https://pbs.twimg.com/media/abc.jpg";
    const IMG2: &str = "https://pbs.twimg.com/media/def.png";
    const THUMB: &str = "https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/x.jpg";

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(&SiteProfile::default()).unwrap()
    }

    fn snap(html: String) -> Snapshot {
        Snapshot::new(html)
    }

    #[test]
    fn builds_full_record() {
        let html = page(&[tweet("alice", 42, Some("gm"), &[IMG, THUMB])]);
        let mut store = DeduplicationStore::new();
        let stats = extractor().extract(&snap(html), Mode::FullRecord, None, &mut store);

        assert_eq!(stats.added, 1);
        let r = &store.records()[0];
        assert_eq!(r.username, "alice");
        assert_eq!(r.tweet_id, "42");
        assert_eq!(r.text.as_deref(), Some("gm"));
        assert_eq!(r.discussion_link, "https://twitter.com/alice/status/42");
        assert_eq!(r.iso_timestamp, "2023-05-01T10:20:30.000Z");
        assert_eq!(r.display_timestamp, "2023-05-01 10:20:30");
        assert_eq!(r.images, [IMG]);
        assert_eq!(r.video_previews, [THUMB]);
        assert!(store.contains_record("/alice/status/42"));
    }

    #[test]
    fn missing_text_block_is_none() {
        let html = page(&[tweet("bob", 7, None, &[])]);
        let mut store = DeduplicationStore::new();
        extractor().extract(&snap(html), Mode::FullRecord, None, &mut store);
        assert_eq!(store.records()[0].text, None);
    }

    #[test]
    fn cells_without_anchor_are_skipped() {
        let html = page(&[empty_cell(), tweet("carol", 1, Some("x"), &[]), empty_cell()]);
        let mut store = DeduplicationStore::new();
        let stats = extractor().extract(&snap(html), Mode::FullRecord, None, &mut store);
        assert_eq!(stats.containers, 3);
        assert_eq!(stats.added, 1);
    }

    #[test]
    fn duplicates_are_not_rebuilt() {
        let html = page(&[tweet("dan", 5, Some("one"), &[])]);
        let mut store = DeduplicationStore::new();
        let ex = extractor();
        ex.extract(&snap(html.clone()), Mode::FullRecord, None, &mut store);
        let stats = ex.extract(&snap(html), Mode::FullRecord, None, &mut store);
        assert_eq!(stats.added, 0);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn id_range_is_inclusive() {
        let html = timeline(&[99, 100, 101, 102, 103]);
        let mut store = DeduplicationStore::new();
        let range = IdRange { since_id: 100, max_id: 102 };
        let stats = extractor().extract(&snap(html), Mode::FullRecord, Some(range), &mut store);

        let ids: Vec<&str> = store.records().iter().map(|r| r.tweet_id.as_str()).collect();
        assert_eq!(ids, ["100", "101", "102"]);
        assert_eq!(stats.out_of_range, 2);
    }

    #[test]
    fn media_only_collects_matching_links_once() {
        let first = page(&[tweet("e", 1, None, &[IMG, THUMB]), tweet("f", 2, None, &[IMG2])]);
        let second = page(&[tweet("f", 2, None, &[IMG2]), tweet("g", 3, None, &[IMG])]);
        let mut store = DeduplicationStore::new();
        let ex = extractor();

        let a = ex.extract(&snap(first), Mode::MediaOnly, None, &mut store);
        let b = ex.extract(&snap(second), Mode::MediaOnly, None, &mut store);

        assert_eq!(a.added, 3);
        assert_eq!(b.added, 0);
        assert_eq!(store.media().images, [IMG, IMG2]);
        assert_eq!(store.media().video_previews, [THUMB]);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn profile_pictures_are_not_media() {
        let html = page(&[tweet("h", 1, None, &[])]);
        let mut store = DeduplicationStore::new();
        extractor().extract(&snap(html), Mode::MediaOnly, None, &mut store);
        assert!(store.media().is_empty());
    }

    #[test]
    fn photo_links_are_not_discussion_anchors() {
        let html = page(&[r#"<div data-testid="cellInnerDiv">
                <a href="/i/status/5/photo/1"><time datetime="2023-05-01T10:20:30.000Z"></time></a>
            </div>"#
            .to_string()]);
        let mut store = DeduplicationStore::new();
        let stats = extractor().extract(&snap(html), Mode::FullRecord, None, &mut store);
        assert_eq!(stats.added, 0);
    }

    #[test]
    fn bad_timestamp_skips_the_cell() {
        let html = page(&[r#"<div data-testid="cellInnerDiv">
                <a href="/z/status/5"><time datetime="yesterday"></time></a>
            </div>"#
            .to_string()]);
        let mut store = DeduplicationStore::new();
        let stats = extractor().extract(&snap(html), Mode::FullRecord, None, &mut store);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn counts_candidates() {
        let ex = extractor();
        assert_eq!(ex.count_candidates(&snap(timeline(&[1, 2]))), 2);
        assert_eq!(ex.count_candidates(&snap(page(&[]))), 0);
    }

    #[test]
    fn timestamp_normalization() {
        assert_eq!(
            normalize_timestamp("2024-01-02T03:04:05.123456Z").as_deref(),
            Some("2024-01-02 03:04:05")
        );
        assert_eq!(normalize_timestamp("2024-01-02"), None);
    }

    #[test]
    fn invalid_selector_is_a_config_error() {
        let profile = SiteProfile {
            container_selector: "div[".to_string(),
            ..SiteProfile::default()
        };
        assert!(matches!(RecordExtractor::new(&profile), Err(CrawlError::Config(_))));
    }
}
