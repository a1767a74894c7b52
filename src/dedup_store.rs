use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One discovered item in full-record mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub username: String,
    pub tweet_id: String,
    #[serde(rename = "tweet_text")]
    pub text: Option<String>,
    pub discussion_link: String,
    #[serde(rename = "iso_8601_timestamp")]
    pub iso_timestamp: String,
    #[serde(rename = "datetime_timestamp")]
    pub display_timestamp: String,
    pub images: Vec<String>,
    #[serde(rename = "video_preview")]
    pub video_previews: Vec<String>,
}

impl Record {
    /// `/<username>/status/<id>`, the identity of the record.
    pub fn discussion_path(&self) -> String {
        format!("/{}/status/{}", self.username, self.tweet_id)
    }
}

/// Image and video-preview links gathered in media-only mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLinkSet {
    pub images: Vec<String>,
    #[serde(rename = "video_preview")]
    pub video_previews: Vec<String>,
}

impl MediaLinkSet {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.video_previews.is_empty()
    }
}

/// Everything a crawl produced, shaped by the mode it ran in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlResults {
    Media(MediaLinkSet),
    Records(Vec<Record>),
}

impl CrawlResults {
    pub fn len(&self) -> usize {
        match self {
            CrawlResults::Media(media) => media.images.len() + media.video_previews.len(),
            CrawlResults::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Seen-set plus insertion-ordered storage. The first value inserted under
/// a key wins; later duplicates are rejected.
#[derive(Debug, Default)]
pub struct DeduplicationStore {
    records: Vec<Record>,
    record_keys: HashSet<String>,
    media: MediaLinkSet,
    image_keys: HashSet<String>,
    video_keys: HashSet<String>,
}

impl DeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_record(&self, discussion_path: &str) -> bool {
        self.record_keys.contains(discussion_path)
    }

    /// Returns false when the discussion path was already stored.
    pub fn insert_record(&mut self, discussion_path: &str, record: Record) -> bool {
        if !self.record_keys.insert(discussion_path.to_string()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn insert_image(&mut self, link: &str) -> bool {
        if !self.image_keys.insert(link.to_string()) {
            return false;
        }
        self.media.images.push(link.to_string());
        true
    }

    pub fn insert_video_preview(&mut self, link: &str) -> bool {
        if !self.video_keys.insert(link.to_string()) {
            return false;
        }
        self.media.video_previews.push(link.to_string());
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn media(&self) -> &MediaLinkSet {
        &self.media
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn media_count(&self) -> usize {
        self.media.images.len() + self.media.video_previews.len()
    }

    /// Hands stored records over and forgets them, keys included.
    pub fn drain_records(&mut self) -> Vec<Record> {
        self.record_keys.clear();
        std::mem::take(&mut self.records)
    }

    pub fn drain_media(&mut self) -> MediaLinkSet {
        self.image_keys.clear();
        self.video_keys.clear();
        std::mem::take(&mut self.media)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
