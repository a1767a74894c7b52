use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROGRESS_FILE: &str = "progress.json";

/// Queries already crawled in an earlier, interrupted batch.
#[derive(Serialize, Deserialize, Default)]
pub struct ProgressState {
    pub processed_queries: HashSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl ProgressState {
    /// Reads the progress file. A missing or unreadable file starts fresh.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!("No progress file found. Starting fresh.");
            return ProgressState {
                path,
                ..Default::default()
            };
        }

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read progress file: {}", e);
                return ProgressState {
                    path,
                    ..Default::default()
                };
            }
        };
        match serde_json::from_str::<ProgressState>(&content) {
            Ok(mut state) => {
                info!("Resumed previous batch: {} queries processed.", state.processed_queries.len());
                state.path = path;
                state
            }
            Err(e) => {
                error!("Failed to parse progress file: {}. Starting fresh.", e);
                ProgressState {
                    path,
                    ..Default::default()
                }
            }
        }
    }

    pub fn mark_complete(&mut self, query: &str) {
        self.processed_queries.insert(query.to_string());
        self.save();
    }

    pub fn contains(&self, query: &str) -> bool {
        self.processed_queries.contains(query)
    }

    fn save(&self) {
        let json = match serde_json::to_string_pretty(self) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize progress state: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json) {
            error!("Failed to write progress file {}: {}", self.path.display(), e);
        }
    }
}
