use crate::error::{CrawlError, Result};
use log::{error, info};
use serde::Deserialize;
use std::fs::{self, File};
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct QueryRecord {
    #[serde(rename = "query", alias = "Query", alias = "search", alias = "Search", alias = "keyword")]
    pub query: String,
}

/// Loads search queries. `.csv` files need a `query` column; anything else
/// is read as one query per line, skipping blanks and `#` comments.
pub fn load_queries<P: AsRef<Path>>(filename: P) -> Result<Vec<String>> {
    let path = filename.as_ref();
    if !path.exists() {
        return Err(CrawlError::Config(format!("queries file {:?} does not exist", path)));
    }

    let is_csv = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    let queries = if is_csv { load_csv(path)? } else { load_lines(path)? };

    info!("Loaded {} queries from {:?}", queries.len(), path);
    Ok(queries)
}

fn load_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn load_csv(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut queries = Vec::new();
    for result in rdr.deserialize::<QueryRecord>() {
        match result {
            Ok(record) if !record.query.is_empty() => queries.push(record.query),
            Ok(_) => {}
            Err(e) => error!("Error parsing CSV record: {}", e),
        }
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plain_text_one_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.txt");
        fs::write(&path, "Web3\n\n# skipped\n  Smart Contract  \nNFT\n").unwrap();
        assert_eq!(load_queries(&path).unwrap(), ["Web3", "Smart Contract", "NFT"]);
    }

    #[test]
    fn csv_with_query_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.csv");
        fs::write(&path, "Query,notes\nDeFi, x\n ,empty\nEthereum,y\n").unwrap();
        assert_eq!(load_queries(&path).unwrap(), ["DeFi", "Ethereum"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(load_queries("/nope/queries.txt"), Err(CrawlError::Config(_))));
    }
}
