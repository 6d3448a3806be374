//! Configuration parsing for corefviz
//!
//! Parses an optional YAML file describing where visualization data lives,
//! how preparation inputs are named, and how the viewer is served. Every
//! field has a default, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the visualization directory (holds `json/` and the brat client)
    #[serde(default = "default_visualization_dir")]
    pub visualization_dir: PathBuf,

    /// Port for the viewer server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Open a browser tab when the server starts
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Location of the brat client, relative to the visualization directory
    #[serde(default = "default_brat_location")]
    pub brat_location: String,

    /// Sub-directory layout of generated JSON data
    #[serde(default)]
    pub layout: Layout,

    /// Input naming for the prepare commands
    #[serde(default)]
    pub prepare: PrepareOptions,

    /// Mention colors in the generated display configuration
    #[serde(default)]
    pub colors: Colors,

    /// Named corpora (each one a visualization directory).
    /// When empty, `visualization_dir` is served as the only corpus.
    #[serde(default)]
    pub corpora: BTreeMap<String, CorpusConfig>,
}

/// Directory layout below the visualization root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Layout {
    #[serde(default = "default_json_subdir")]
    pub json_subdir: String,
    #[serde(default = "default_span_subdir")]
    pub span_subdir: String,
    #[serde(default = "default_coref_subdir")]
    pub coref_subdir: String,
    #[serde(default = "default_surface_subdir")]
    pub surface_subdir: String,
    #[serde(default = "default_config_subdir")]
    pub config_subdir: String,
}

/// File naming for the prepare commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareOptions {
    /// Extension appended after the document id of brat annotation files
    #[serde(default = "default_annotation_ext")]
    pub annotation_ext: String,

    /// Extension appended after the document id of token tables
    #[serde(default = "default_token_ext")]
    pub token_ext: String,

    /// Extension appended after the document id of source texts
    #[serde(default = "default_source_ext")]
    pub source_ext: String,

    /// Token table columns holding the begin and (inclusive) end offsets
    #[serde(default = "default_token_offset_fields")]
    pub token_offset_fields: [usize; 2],
}

/// Background colors for mention match statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Colors {
    #[serde(default = "default_basic_color")]
    pub basic: String,
    #[serde(default = "default_missing_color")]
    pub missing: String,
    #[serde(default = "default_partial_color")]
    pub partial: String,
    #[serde(default = "default_wrong_status_color")]
    pub wrong_status: String,
}

/// A named corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Visualization directory of this corpus
    pub path: PathBuf,

    /// Display label (optional)
    #[serde(default)]
    pub label: Option<String>,
}

fn default_visualization_dir() -> PathBuf {
    PathBuf::from("visualization")
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_brat_location() -> String {
    "brat".to_string()
}

fn default_json_subdir() -> String {
    "json".to_string()
}

fn default_span_subdir() -> String {
    "span".to_string()
}

fn default_coref_subdir() -> String {
    "coref".to_string()
}

fn default_surface_subdir() -> String {
    "surface".to_string()
}

fn default_config_subdir() -> String {
    "config".to_string()
}

fn default_annotation_ext() -> String {
    ".tkn.ann".to_string()
}

fn default_token_ext() -> String {
    ".tab".to_string()
}

fn default_source_ext() -> String {
    ".txt".to_string()
}

fn default_token_offset_fields() -> [usize; 2] {
    [2, 3]
}

fn default_basic_color() -> String {
    "lightgreen".to_string()
}

fn default_missing_color() -> String {
    "#ffccaa".to_string()
}

fn default_partial_color() -> String {
    "#aea0d6".to_string()
}

fn default_wrong_status_color() -> String {
    "#1E90FF".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            visualization_dir: default_visualization_dir(),
            port: default_port(),
            open_browser: true,
            brat_location: default_brat_location(),
            layout: Layout::default(),
            prepare: PrepareOptions::default(),
            colors: Colors::default(),
            corpora: BTreeMap::new(),
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            json_subdir: default_json_subdir(),
            span_subdir: default_span_subdir(),
            coref_subdir: default_coref_subdir(),
            surface_subdir: default_surface_subdir(),
            config_subdir: default_config_subdir(),
        }
    }
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            annotation_ext: default_annotation_ext(),
            token_ext: default_token_ext(),
            source_ext: default_source_ext(),
            token_offset_fields: default_token_offset_fields(),
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            basic: default_basic_color(),
            missing: default_missing_color(),
            partial: default_partial_color(),
            wrong_status: default_wrong_status_color(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // serde_yaml reads an empty document as null
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be non-zero");
        }

        let [begin, end] = self.prepare.token_offset_fields;
        if begin == end {
            anyhow::bail!(
                "token_offset_fields must name two different columns, got [{}, {}]",
                begin,
                end
            );
        }

        for (name, corpus) in &self.corpora {
            if name.trim().is_empty() {
                anyhow::bail!("Corpus names must not be empty");
            }
            if corpus.path.as_os_str().is_empty() {
                anyhow::bail!("Corpus '{}' has an empty path", name);
            }
        }

        Ok(())
    }

    /// Corpora to serve: the configured ones, or the visualization dir alone
    pub fn effective_corpora(&self) -> Vec<(String, CorpusConfig)> {
        if self.corpora.is_empty() {
            return vec![(
                "default".to_string(),
                CorpusConfig {
                    path: self.visualization_dir.clone(),
                    label: None,
                },
            )];
        }
        self.corpora
            .iter()
            .map(|(name, corpus)| (name.clone(), corpus.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r##"
visualization_dir: vis
port: 8080
prepare:
  token_offset_fields: [1, 2]
colors:
  missing: "#ff0000"
corpora:
  dev:
    path: data/dev_vis
    label: "Dev set"
"##;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.visualization_dir, PathBuf::from("vis"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.prepare.token_offset_fields, [1, 2]);
        assert_eq!(config.prepare.token_ext, ".tab");
        assert_eq!(config.colors.missing, "#ff0000");
        assert_eq!(config.colors.basic, "lightgreen");
        assert_eq!(config.corpora["dev"].label.as_deref(), Some("Dev set"));
        assert_eq!(config.layout, Layout::default());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.prepare.annotation_ext, ".tkn.ann");
        assert_eq!(config.layout.span_subdir, "span");

        let corpora = config.effective_corpora();
        assert_eq!(corpora.len(), 1);
        assert_eq!(corpora[0].0, "default");
        assert_eq!(corpora[0].1.path, PathBuf::from("visualization"));
    }

    #[test]
    fn test_rejects_identical_offset_fields() {
        let yaml = "prepare:\n  token_offset_fields: [2, 2]\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        assert!(Config::from_yaml_str("port: 0\n").is_err());
    }
}
