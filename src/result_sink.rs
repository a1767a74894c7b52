//! Durable JSON output and its tabular projection.
//!
//! The default format keeps the output file a single JSON array at all
//! times, closing bracket included, so every append leaves a readable file.
//! The fragment format reproduces the older layout where each run appends
//! standalone objects back to back; [`repair`] turns such a file into an
//! array before export.

use crate::error::{CrawlError, Result};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkFormat {
    #[default]
    Array,
    Fragments,
}

pub struct ResultSink {
    path: PathBuf,
    format: SinkFormat,
}

/// Wraps concatenated fragments into one array. Content that already is an
/// array comes back unchanged.
pub fn repair(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return "[]".to_string();
    }
    if trimmed.starts_with('[') {
        return content.to_string();
    }

    let body: Vec<&str> = content
        .lines()
        .map(|line| if line.trim() == "}{" { "},\n{" } else { line })
        .collect();
    format!("[\n{}\n]", body.join("\n"))
}

fn parse_array(content: &str, path: &Path) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Array(values) => Ok(values),
        _ => Err(CrawlError::MalformedOutput(format!(
            "{} does not hold a JSON array",
            path.display()
        ))),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Union of object keys, first element's keys first, later keys in the
/// order they are first seen.
fn columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.iter().any(|k| k == key) {
                header.push(key.clone());
            }
        }
    }
    header
}

/// Repairs `source` in place if needed and writes it out as CSV. Returns the
/// number of data rows written.
pub fn export_tabular<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> Result<usize> {
    ResultSink::new(source.as_ref(), SinkFormat::Array).repair_and_convert(destination)
}

impl ResultSink {
    pub fn new<P: AsRef<Path>>(path: P, format: SinkFormat) -> Self {
        ResultSink {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends every unit to the destination file.
    pub fn append<T: Serialize>(&self, units: &[T]) -> Result<usize> {
        if units.is_empty() {
            return Ok(0);
        }
        match self.format {
            SinkFormat::Array => self.append_to_array(units)?,
            SinkFormat::Fragments => self.append_fragments(units)?,
        }
        info!("Saved {} entries to {}", units.len(), self.path.display());
        Ok(units.len())
    }

    fn append_fragments<T: Serialize>(&self, units: &[T]) -> Result<()> {
        // An export rewrites the file as an array; later fragments join it.
        if self.holds_array()? {
            return self.append_to_array(units);
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for unit in units {
            file.write_all(serde_json::to_string_pretty(unit)?.as_bytes())?;
        }
        file.flush()?;
        Ok(())
    }

    fn holds_array(&self) -> Result<bool> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim_start().starts_with('[')),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn append_to_array<T: Serialize>(&self, units: &[T]) -> Result<()> {
        let mut encoded = Vec::with_capacity(units.len());
        for unit in units {
            encoded.push(serde_json::to_string_pretty(unit)?);
        }
        let elements = encoded.join(",\n");

        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if existing.trim().is_empty() {
            let mut file = File::create(&self.path)?;
            write!(file, "[\n{}\n]\n", elements)?;
            return Ok(());
        }

        let existing = if existing.trim_start().starts_with('[') {
            existing
        } else {
            warn!("{} holds concatenated fragments; repairing it before appending.", self.path.display());
            let repaired = repair(&existing);
            parse_array(&repaired, &self.path)?;
            fs::write(&self.path, &repaired)?;
            repaired
        };

        let body = existing.trim_end();
        let Some(open) = body.strip_suffix(']') else {
            return Err(CrawlError::MalformedOutput(format!(
                "{} does not end with a closing bracket",
                self.path.display()
            )));
        };
        let open = open.trim_end();
        let separator = if open == "[" { "\n" } else { ",\n" };

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(open.len() as u64)?;
        file.seek(SeekFrom::End(0))?;
        write!(file, "{}{}\n]\n", separator, elements)?;
        file.flush()?;
        Ok(())
    }

    /// Every stored unit, repairing a fragment file on the fly.
    pub fn read_all(&self) -> Result<Vec<Value>> {
        let content = fs::read_to_string(&self.path)?;
        parse_array(&repair(&content), &self.path)
    }

    /// Rewrites the destination file as one array when it holds fragments,
    /// then projects it to CSV at `destination`. The header is the union
    /// of all object keys, so entries of different shapes leave empty cells
    /// rather than shifted columns.
    pub fn repair_and_convert<P: AsRef<Path>>(&self, destination: P) -> Result<usize> {
        let content = fs::read_to_string(&self.path)?;
        let repaired = repair(&content);
        let values = parse_array(&repaired, &self.path)?;
        if repaired != content {
            fs::write(&self.path, &repaired)?;
        }

        let mut rows = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Value::Object(map) => rows.push(map),
                other => {
                    return Err(CrawlError::MalformedOutput(format!(
                        "entry {} of {} is not an object: {}",
                        i,
                        self.path.display(),
                        other
                    )))
                }
            }
        }

        let destination = destination.as_ref();
        let mut writer = csv::Writer::from_path(destination)?;
        if rows.is_empty() {
            warn!("{} is empty; writing an empty table.", self.path.display());
            writer.flush()?;
            return Ok(0);
        }

        let header = columns(&rows);
        if header.len() != rows[0].len() {
            warn!(
                "Entries in {} do not share one key set; using {} columns.",
                self.path.display(),
                header.len()
            );
        }
        writer.write_record(&header)?;
        for row in &rows {
            writer.write_record(header.iter().map(|key| cell(row.get(key))))?;
        }
        writer.flush()?;

        info!("CSV saved to {} ({} rows)", destination.display(), rows.len());
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup_store::{MediaLinkSet, Record};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, text: Option<&str>) -> Record {
        Record {
            username: "alice".to_string(),
            tweet_id: id.to_string(),
            text: text.map(String::from),
            discussion_link: format!("https://twitter.com/alice/status/{}", id),
            iso_timestamp: "2023-05-01T10:20:30.000Z".to_string(),
            display_timestamp: "2023-05-01 10:20:30".to_string(),
            images: vec!["https://pbs.twimg.com/media/a.jpg".to_string()],
            video_previews: vec![],
        }
    }

    #[test]
    fn repair_joins_fragments() {
        let fragments = "{\n \"a\": 1\n}{\n \"a\": 2\n}";
        let repaired = repair(fragments);
        let parsed: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed, json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn repair_leaves_arrays_alone() {
        let array = "[\n{\"a\": 1},\n{\"a\": 2}\n]\n";
        assert_eq!(repair(array), array);
        assert_eq!(repair(&repair(array)), array);
    }

    #[test]
    fn array_appends_stay_well_formed() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("out.json"), SinkFormat::Array);

        sink.append(&[record("1", Some("a"))]).unwrap();
        sink.append(&[record("2", None), record("3", Some("c"))]).unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&content).unwrap();
        let ids: Vec<&str> = parsed.iter().map(|r| r.tweet_id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(parsed[1].text, None);
    }

    #[test]
    fn array_append_after_empty_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "[]\n").unwrap();

        let sink = ResultSink::new(&path, SinkFormat::Array);
        sink.append(&[json!({"a": 1})]).unwrap();
        assert_eq!(sink.read_all().unwrap(), vec![json!({"a": 1})]);
    }

    #[test]
    fn empty_append_does_not_touch_the_file() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("out.json"), SinkFormat::Array);
        assert_eq!(sink.append::<Record>(&[]).unwrap(), 0);
        assert!(!sink.path().exists());
    }

    #[test]
    fn fragments_produce_boundaries_that_repair_fixes() {
        let dir = TempDir::new().unwrap();
        let sink = ResultSink::new(dir.path().join("out.json"), SinkFormat::Fragments);
        sink.append(&[record("1", Some("a")), record("2", Some("b"))]).unwrap();
        sink.append(&[record("3", Some("c"))]).unwrap();

        let raw = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(raw.lines().filter(|l| l.trim() == "}{").count(), 2);
        assert!(serde_json::from_str::<Value>(&raw).is_err());

        assert_eq!(sink.read_all().unwrap().len(), 3);
    }

    #[test]
    fn array_append_repairs_legacy_file_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        ResultSink::new(&path, SinkFormat::Fragments)
            .append(&[json!({"a": 1}), json!({"a": 2})])
            .unwrap();

        ResultSink::new(&path, SinkFormat::Array).append(&[json!({"a": 3})]).unwrap();

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!([{"a": 1}, {"a": 2}, {"a": 3}]));
    }

    #[test]
    fn fragments_after_export_join_the_array() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("out.json");
        let dest = dir.path().join("out.csv");
        let sink = ResultSink::new(&source, SinkFormat::Fragments);

        sink.append(&[json!({"a": 1}), json!({"a": 2})]).unwrap();
        assert_eq!(export_tabular(&source, &dest).unwrap(), 2);
        sink.append(&[json!({"a": 3})]).unwrap();
        assert_eq!(export_tabular(&source, &dest).unwrap(), 3);

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&source).unwrap()).unwrap();
        assert_eq!(parsed, json!([{"a": 1}, {"a": 2}, {"a": 3}]));
    }

    #[test]
    fn converts_records_to_csv() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("out.json");
        let dest = dir.path().join("out.csv");
        ResultSink::new(&source, SinkFormat::Fragments)
            .append(&[record("1", Some("hello, world")), record("2", None)])
            .unwrap();

        assert_eq!(export_tabular(&source, &dest).unwrap(), 2);

        let mut reader = csv::Reader::from_path(&dest).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header[0], "username");
        assert_eq!(header[2], "tweet_text");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][2], "hello, world");
        assert_eq!(&rows[1][2], "");
        assert_eq!(&rows[0][6], r#"["https://pbs.twimg.com/media/a.jpg"]"#);

        // The source was rewritten as an array and converting again is stable.
        let repaired = fs::read_to_string(&source).unwrap();
        assert!(repaired.trim_start().starts_with('['));
        assert_eq!(export_tabular(&source, &dest).unwrap(), 2);
        assert_eq!(fs::read_to_string(&source).unwrap(), repaired);
    }

    #[test]
    fn mixed_shapes_use_union_of_keys() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("out.json");
        let dest = dir.path().join("out.csv");
        let sink = ResultSink::new(&source, SinkFormat::Array);
        sink.append(&[record("1", Some("a"))]).unwrap();
        sink.append(&[MediaLinkSet {
            images: vec!["https://pbs.twimg.com/media/b.jpg".to_string()],
            video_previews: vec![],
        }])
        .unwrap();

        sink.repair_and_convert(&dest).unwrap();

        let mut reader = csv::Reader::from_path(&dest).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 8);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[1][0], "");
        assert_eq!(&rows[1][6], r#"["https://pbs.twimg.com/media/b.jpg"]"#);
    }

    #[test]
    fn non_object_entries_are_rejected() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("out.json");
        fs::write(&source, "[1, 2]").unwrap();
        let err = export_tabular(&source, dir.path().join("out.csv")).unwrap_err();
        assert!(matches!(err, CrawlError::MalformedOutput(_)));
    }
}
