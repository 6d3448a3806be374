//! JSON output for generated visualization data

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Run metadata written next to generated data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    /// Version of the tool
    pub version: String,
    /// Which command produced the data (prepare-diff, prepare-coref)
    pub command: String,
    /// Command line used
    #[serde(default)]
    pub command_line: String,
    /// Timestamp of execution
    #[serde(default)]
    pub generated_at: String,
    /// Number of documents written
    pub documents: usize,
    /// Documents skipped (missing counterpart, unreadable input)
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl Manifest {
    pub fn new(command: &str, documents: usize, skipped: Vec<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            command: command.to_string(),
            command_line: std::env::args().collect::<Vec<_>>().join(" "),
            generated_at: chrono::Utc::now().to_rfc3339(),
            documents,
            skipped,
        }
    }
}

/// Documents handled by a prepare run
#[derive(Debug, Clone, Default)]
pub struct PrepareSummary {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

/// Write `value` as JSON, creating parent directories as needed
pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P, pretty: bool) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(create_file(path)?);

    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `value` as gzipped JSON
pub fn write_json_gzip<T: Serialize, P: AsRef<Path>>(value: &T, path: P, compact: bool) -> Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let path = path.as_ref();
    let file = create_file(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());

    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };

    encoder.write_all(json.as_bytes())?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    #[test]
    fn test_write_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("json/span/doc_gold.json");

        write_json(&json!({"events": []}), &path, true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value, json!({"events": []}));
    }

    #[test]
    fn test_write_json_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json.gz");

        write_json_gzip(&json!(["a", "b"]), &path, true).unwrap();

        let mut decoder = GzDecoder::new(File::open(&path).unwrap());
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();
        assert_eq!(decompressed, r#"["a","b"]"#);
    }

    #[test]
    fn test_manifest_records_version() {
        let manifest = Manifest::new("prepare-coref", 3, vec!["doc4".to_string()]);
        assert_eq!(manifest.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(manifest.documents, 3);
        assert!(!manifest.generated_at.is_empty());
    }
}
