//! Viewer application state
//!
//! Holds what the viewer shows: the active corpus and document, whether
//! cluster filtering is on, and the per-side cluster selections. Changing the
//! corpus or document only marks the state dirty; the data itself is fetched
//! through an explicit load (`begin_load` / `load` / `complete_load`) so that
//! a slow or failed load never leaves half-updated panes behind.

use serde::Serialize;

use crate::error::{Result, VizError};
use crate::filter::{self, Selection};
use crate::payload::{DocumentPayload, Side};
use crate::store::{AnnotationStore, DocumentBundle};

/// A named visualization directory
#[derive(Debug, Clone)]
pub struct Corpus {
    pub name: String,
    pub label: Option<String>,
    pub store: AnnotationStore,
}

impl Corpus {
    /// Label shown in the corpus picker, the name when none is configured
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Permission to apply one load result.
///
/// Every `begin_load` supersedes earlier tickets, so at most one load can
/// complete into the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    corpus: usize,
    pub doc_id: String,
}

/// Payloads handed to the rendering widget
#[derive(Debug, Clone, Serialize)]
pub struct RenderView {
    pub doc_id: String,
    pub show_clusters: bool,
    pub gold: DocumentPayload,
    pub system: DocumentPayload,
}

#[derive(Debug, Clone)]
pub struct AppState {
    corpora: Vec<Corpus>,
    current_corpus: usize,
    documents: Vec<String>,
    current_doc: Option<String>,
    corpus_changed: bool,
    file_changed: bool,
    show_clusters: bool,
    gold_selection: Selection,
    system_selection: Selection,
    loaded: Option<DocumentBundle>,
    generation: u64,
    in_flight: Option<u64>,
}

impl AppState {
    /// Start on the first corpus and its first document, pending a load
    pub fn new(corpora: Vec<Corpus>) -> Result<Self> {
        let first = corpora.first().ok_or(VizError::NoCorpus)?;
        let documents = first.store.document_ids()?;

        Ok(Self {
            current_doc: documents.first().cloned(),
            documents,
            corpora,
            current_corpus: 0,
            corpus_changed: true,
            file_changed: false,
            show_clusters: false,
            gold_selection: Selection::new(),
            system_selection: Selection::new(),
            loaded: None,
            generation: 0,
            in_flight: None,
        })
    }

    pub fn corpora(&self) -> &[Corpus] {
        &self.corpora
    }

    pub fn current_corpus(&self) -> &Corpus {
        &self.corpora[self.current_corpus]
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn current_document(&self) -> Option<&str> {
        self.current_doc.as_deref()
    }

    pub fn loaded(&self) -> Option<&DocumentBundle> {
        self.loaded.as_ref()
    }

    pub fn show_clusters(&self) -> bool {
        self.show_clusters
    }

    pub fn selection(&self, side: Side) -> &Selection {
        match side {
            Side::Gold => &self.gold_selection,
            Side::System => &self.system_selection,
        }
    }

    /// A corpus or document change is waiting for a load
    pub fn is_dirty(&self) -> bool {
        self.corpus_changed || self.file_changed
    }

    /// Switch corpus; the document resets to the corpus's first one
    pub fn select_corpus(&mut self, name: &str) -> Result<()> {
        let index = self
            .corpora
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| VizError::UnknownCorpus(name.to_string()))?;
        if index == self.current_corpus && !self.documents.is_empty() {
            return Ok(());
        }

        let documents = self.corpora[index].store.document_ids()?;
        log::info!("Corpus changed to {} ({} documents)", name, documents.len());

        self.current_corpus = index;
        self.current_doc = documents.first().cloned();
        self.documents = documents;
        self.corpus_changed = true;
        Ok(())
    }

    pub fn select_document(&mut self, doc_id: &str) -> Result<()> {
        if !self.documents.iter().any(|d| d == doc_id) {
            return Err(VizError::UnknownDocument(doc_id.to_string()));
        }
        if self.current_doc.as_deref() != Some(doc_id) {
            log::debug!("Document changed to {}", doc_id);
            self.current_doc = Some(doc_id.to_string());
            self.file_changed = true;
        }
        Ok(())
    }

    /// Claim the next load if a change is pending
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if !self.is_dirty() {
            return None;
        }
        let doc_id = self.current_doc.clone()?;

        self.generation += 1;
        if self.in_flight.is_some() {
            log::debug!("Superseding in-flight load with generation {}", self.generation);
        }
        self.in_flight = Some(self.generation);
        Some(LoadTicket {
            generation: self.generation,
            corpus: self.current_corpus,
            doc_id,
        })
    }

    /// Fetch the data a ticket refers to. Does not touch the state.
    pub fn load(&self, ticket: &LoadTicket) -> Result<DocumentBundle> {
        self.corpora[ticket.corpus].store.load_document(&ticket.doc_id)
    }

    /// Apply a load result.
    ///
    /// Returns `Ok(false)` for a superseded ticket. On error the previous
    /// document stays displayed and the change remains pending.
    pub fn complete_load(&mut self, ticket: LoadTicket, result: Result<DocumentBundle>) -> Result<bool> {
        if self.in_flight != Some(ticket.generation) {
            log::debug!("Dropping stale load of {}", ticket.doc_id);
            return Ok(false);
        }
        self.in_flight = None;

        let bundle = result?;
        log::info!(
            "Loaded {}: {} gold / {} system events, {} / {} clusters",
            bundle.doc_id,
            bundle.gold.payload.events.len(),
            bundle.system.payload.events.len(),
            bundle.gold.clusters.len(),
            bundle.system.clusters.len()
        );

        self.loaded = Some(bundle);
        self.corpus_changed = false;
        self.file_changed = false;
        self.show_clusters = false;
        self.gold_selection.clear();
        self.system_selection.clear();
        Ok(true)
    }

    /// Run a pending load to completion. Returns whether new data was applied.
    pub fn refresh(&mut self) -> Result<bool> {
        if self.is_dirty() && self.current_doc.is_none() {
            self.unload();
            return Ok(true);
        }
        let Some(ticket) = self.begin_load() else {
            return Ok(false);
        };
        let result = self.load(&ticket);
        self.complete_load(ticket, result)
    }

    /// Drop the displayed document when the current corpus has none
    fn unload(&mut self) {
        log::info!("Corpus {} has no documents", self.current_corpus().name);
        self.loaded = None;
        self.in_flight = None;
        self.corpus_changed = false;
        self.file_changed = false;
        self.show_clusters = false;
        self.gold_selection.clear();
        self.system_selection.clear();
    }

    pub fn set_show_clusters(&mut self, enabled: bool) {
        self.show_clusters = enabled;
    }

    /// Replace one side's selection; rejected selections leave it unchanged
    pub fn set_selection(&mut self, side: Side, selection: Selection) -> Result<()> {
        let empty = Default::default();
        let clusters = self
            .loaded
            .as_ref()
            .map(|bundle| &bundle.side(side).clusters)
            .unwrap_or(&empty);
        filter::validate_selection(clusters, &selection)?;

        match side {
            Side::Gold => self.gold_selection = selection,
            Side::System => self.system_selection = selection,
        }
        Ok(())
    }

    /// What the two panes should render, if a document is loaded.
    ///
    /// With clusters hidden every event is shown; otherwise each side shows
    /// the events of its selected clusters only.
    pub fn view(&self) -> Result<Option<RenderView>> {
        let Some(bundle) = &self.loaded else {
            return Ok(None);
        };

        let render = |side: Side| -> Result<DocumentPayload> {
            let data = bundle.side(side);
            if self.show_clusters {
                filter::filter_payload(&data.payload, &data.clusters, self.selection(side))
            } else {
                Ok(data.payload.clone())
            }
        };

        Ok(Some(RenderView {
            doc_id: bundle.doc_id.clone(),
            show_clusters: self.show_clusters,
            gold: render(Side::Gold)?,
            system: render(Side::System)?,
        }))
    }

    /// Cluster labels of one side, named with that side's surface forms
    pub fn cluster_labels(&self, side: Side) -> Result<Vec<String>> {
        match &self.loaded {
            Some(bundle) => {
                let data = bundle.side(side);
                filter::name_clusters(&data.clusters, &data.surface)
            }
            None => Ok(Vec::new()),
        }
    }
}
