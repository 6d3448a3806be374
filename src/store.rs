//! On-disk layout of visualization data
//!
//! ```text
//! <root>/json/span/<doc>_gold.json            span payload, gold side
//! <root>/json/span/<doc>_sys.json             span payload, system side
//! <root>/json/coref/<doc>_coref_gold.json     cluster list
//! <root>/json/surface/<doc>_surface_gold.json event id -> surface text
//! <root>/json/config/doc_ids.json             ordered document ids
//! <root>/json/config/annotation_config.json   widget display configuration
//! ```
//!
//! Readers validate into the typed model; writers in the prepare modules
//! use the same path helpers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::Layout;
use crate::error::{Result, VizError};
use crate::payload::{ClusterList, DocumentPayload, Side, SurfaceForms};

/// Everything the viewer shows for one side of a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideData {
    pub payload: DocumentPayload,
    pub clusters: ClusterList,
    pub surface: SurfaceForms,
}

/// Both sides of a loaded document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentBundle {
    pub doc_id: String,
    pub gold: SideData,
    pub system: SideData,
}

impl DocumentBundle {
    pub fn side(&self, side: Side) -> &SideData {
        match side {
            Side::Gold => &self.gold,
            Side::System => &self.system,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    root: PathBuf,
    layout: Layout,
}

impl AnnotationStore {
    pub fn new<P: Into<PathBuf>>(root: P, layout: Layout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join(&self.layout.json_subdir)
    }

    pub fn span_dir(&self) -> PathBuf {
        self.json_dir().join(&self.layout.span_subdir)
    }

    pub fn coref_dir(&self) -> PathBuf {
        self.json_dir().join(&self.layout.coref_subdir)
    }

    pub fn surface_dir(&self) -> PathBuf {
        self.json_dir().join(&self.layout.surface_subdir)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.json_dir().join(&self.layout.config_subdir)
    }

    pub fn span_path(&self, doc_id: &str, side: Side) -> PathBuf {
        self.span_dir()
            .join(format!("{}_{}.json", doc_id, side.file_suffix()))
    }

    pub fn coref_path(&self, doc_id: &str, side: Side) -> PathBuf {
        self.coref_dir()
            .join(format!("{}_coref_{}.json", doc_id, side.file_suffix()))
    }

    pub fn surface_path(&self, doc_id: &str, side: Side) -> PathBuf {
        self.surface_dir()
            .join(format!("{}_surface_{}.json", doc_id, side.file_suffix()))
    }

    pub fn doc_ids_path(&self) -> PathBuf {
        self.config_dir().join("doc_ids.json")
    }

    pub fn annotation_config_path(&self) -> PathBuf {
        self.config_dir().join("annotation_config.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config_dir().join("manifest.json")
    }

    /// Ordered document ids written by the diff preparation
    pub fn document_ids(&self) -> Result<Vec<String>> {
        read_json(&self.doc_ids_path())
    }

    /// Display configuration handed to the rendering widget as-is
    pub fn annotation_config(&self) -> Result<Value> {
        read_json(&self.annotation_config_path())
    }

    pub fn load_payload(&self, doc_id: &str, side: Side) -> Result<DocumentPayload> {
        let path = self.span_path(doc_id, side);
        let raw: Value = read_json(&path)?;
        DocumentPayload::from_value(raw).map_err(|e| match e {
            VizError::MalformedPayload(msg) => {
                VizError::MalformedPayload(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Cluster list for one side; a document without coreference data has none
    pub fn load_clusters(&self, doc_id: &str, side: Side) -> Result<ClusterList> {
        read_optional_json(&self.coref_path(doc_id, side))
    }

    pub fn load_surface(&self, doc_id: &str, side: Side) -> Result<SurfaceForms> {
        read_optional_json(&self.surface_path(doc_id, side))
    }

    /// Load one side. Clusters and surface forms always come from the same side.
    pub fn load_side(&self, doc_id: &str, side: Side) -> Result<SideData> {
        Ok(SideData {
            payload: self.load_payload(doc_id, side)?,
            clusters: self.load_clusters(doc_id, side)?,
            surface: self.load_surface(doc_id, side)?,
        })
    }

    pub fn load_document(&self, doc_id: &str) -> Result<DocumentBundle> {
        log::debug!("Loading document {} from {}", doc_id, self.root.display());
        Ok(DocumentBundle {
            doc_id: doc_id.to_string(),
            gold: self.load_side(doc_id, Side::Gold)?,
            system: self.load_side(doc_id, Side::System)?,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| VizError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| VizError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_optional_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        log::debug!("No file at {}, using empty data", path.display());
        return Ok(T::default());
    }
    read_json(path)
}
