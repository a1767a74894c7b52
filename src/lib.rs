pub mod browser;
pub mod config;
pub mod crawl_loop;
pub mod crawler;
pub mod date_validator;
pub mod dedup_store;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod input_loader;
pub mod logger;
pub mod query_builder;
pub mod result_sink;
pub mod resume_manager;
pub mod session;
pub mod site_profile;
pub mod webdriver;

// Exporting types for convenience
pub use browser::{BrowserDriver, Locator, Snapshot};
pub use config::{CrawlConfig, Credentials, Mode};
pub use crawler::{run, Crawler};
pub use dedup_store::{CrawlResults, DeduplicationStore, MediaLinkSet, Record};
pub use delay_manager::RateLimiter;
pub use error::{CrawlError, DriverError, Result};
pub use extractor::RecordExtractor;
pub use result_sink::{export_tabular, ResultSink, SinkFormat};
pub use resume_manager::ProgressState;
pub use session::{SessionController, SessionState};
pub use site_profile::SiteProfile;
