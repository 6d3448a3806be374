//! Coreference data from brat standoff annotation
//!
//! Reads `.ann` files and extracts what the viewer needs to offer cluster
//! selection: the coreference clusters (from `Coreference` relations) and the
//! surface text of each event mention (via its trigger span).
//!
//! Relevant line shapes (tab separated):
//! ```text
//! T3	Attack 10 17	stabbed
//! E2	Attack:T3 Attacker:T1
//! R1	Coreference Arg1:E2 Arg2:E5
//! ```

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::output::{self, Manifest, PrepareSummary};
use crate::payload::{Cluster, ClusterList, EventId, Side, SurfaceForms};
use crate::store::AnnotationStore;

const SPAN_MARKER: char = 'T';
const EVENT_MARKER: char = 'E';
const RELATION_MARKER: char = 'R';
const COREFERENCE_RELATION: &str = "Coreference";

/// Clusters and surface forms extracted from one annotation file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorefAnnotations {
    pub clusters: ClusterList,
    pub surface: SurfaceForms,
}

/// Grows clusters from pairwise links, merging transitively.
///
/// A cluster keeps the position of the oldest cluster it absorbed; members
/// keep their order of first appearance.
#[derive(Debug, Default)]
struct ClusterBuilder {
    clusters: Vec<Cluster>,
}

impl ClusterBuilder {
    fn link(&mut self, a: EventId, b: EventId) {
        let touching: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains(&a) || c.contains(&b))
            .map(|(i, _)| i)
            .collect();

        let Some((&target, absorbed)) = touching.split_first() else {
            let mut cluster = vec![a.clone()];
            if b != a {
                cluster.push(b);
            }
            self.clusters.push(cluster);
            return;
        };

        // Remove from the back so earlier indices stay valid
        let mut moved = Vec::new();
        for &i in absorbed.iter().rev() {
            moved.push(self.clusters.remove(i));
        }
        let cluster = &mut self.clusters[target];
        for member in moved.into_iter().rev().flatten().chain([a, b]) {
            if !cluster.contains(&member) {
                cluster.push(member);
            }
        }
    }

    fn finish(self) -> ClusterList {
        ClusterList::new(self.clusters)
    }
}

/// Parse `Coreference Arg1:E1 Arg2:E2`. Other relation types give `None`.
fn parse_coref_link(relation: &str) -> Option<(EventId, EventId)> {
    let mut parts = relation.split_whitespace();
    let (kind, arg1, arg2) = (parts.next()?, parts.next()?, parts.next()?);
    if kind != COREFERENCE_RELATION {
        return None;
    }
    let strip = |arg: &str| {
        arg.split_once(':')
            .map(|(_, id)| id.to_string())
            .unwrap_or_else(|| arg.to_string())
    };
    Some((EventId::Text(strip(arg1)), EventId::Text(strip(arg2))))
}

/// Extract clusters and surface forms from brat annotation lines
pub fn parse_annotations<R: BufRead>(reader: R) -> Result<CorefAnnotations> {
    let mut builder = ClusterBuilder::default();
    let mut span_text: HashMap<String, String> = HashMap::new();
    let mut event_trigger: Vec<(String, String)> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.trim_end().split('\t').collect();

        if line.starts_with(RELATION_MARKER) {
            let Some(relation) = parts.get(1) else {
                log::warn!("Skipping relation without arguments at line {}", line_no + 1);
                continue;
            };
            if let Some((a, b)) = parse_coref_link(relation) {
                builder.link(a, b);
            }
        } else if line.starts_with(EVENT_MARKER) {
            // "Attack:T3 Attacker:T1" -> trigger span T3
            let trigger = parts
                .get(1)
                .and_then(|body| body.split_whitespace().next())
                .and_then(|head| head.split_once(':'))
                .map(|(_, span)| span.to_string());
            match trigger {
                Some(span) => event_trigger.push((parts[0].to_string(), span)),
                None => log::warn!("Skipping event without trigger at line {}", line_no + 1),
            }
        } else if line.starts_with(SPAN_MARKER) {
            if let Some(text) = parts.get(2) {
                span_text.insert(parts[0].to_string(), text.to_string());
            }
        }
    }

    let surface = event_trigger
        .into_iter()
        .filter_map(|(event, span)| span_text.get(&span).map(|text| (event, text.clone())))
        .collect();

    Ok(CorefAnnotations {
        clusters: builder.finish(),
        surface,
    })
}

pub fn read_annotation_file<P: AsRef<Path>>(path: P) -> Result<CorefAnnotations> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open annotation file: {}", path.display()))?;
    parse_annotations(BufReader::new(file))
        .with_context(|| format!("Failed to read annotation file: {}", path.display()))
}

enum DocOutcome {
    Written(String),
    Skipped(String),
}

/// Write cluster and surface JSON for every gold annotation file that has a
/// system counterpart
pub fn prepare_coref(
    gold_dir: &Path,
    sys_dir: &Path,
    store: &AnnotationStore,
    annotation_ext: &str,
) -> Result<PrepareSummary> {
    let mut gold_files: Vec<PathBuf> = std::fs::read_dir(gold_dir)
        .with_context(|| format!("Failed to read gold directory: {}", gold_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| name.to_string_lossy().ends_with(annotation_ext))
                    .unwrap_or(false)
        })
        .collect();
    gold_files.sort();

    log::info!(
        "Found {} gold annotation files in {}",
        gold_files.len(),
        gold_dir.display()
    );

    let pb = ProgressBar::new(gold_files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents")?
            .progress_chars("=>-"),
    );
    let counter = AtomicUsize::new(0);

    let outcomes = gold_files
        .par_iter()
        .map(|gold_path| {
            let result = prepare_document(gold_path, sys_dir, store, annotation_ext);
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_position(done as u64);
            result
        })
        .collect::<Result<Vec<_>>>()?;

    pb.finish_and_clear();

    let mut summary = PrepareSummary::default();
    for outcome in outcomes {
        match outcome {
            DocOutcome::Written(doc) => summary.written.push(doc),
            DocOutcome::Skipped(doc) => summary.skipped.push(doc),
        }
    }

    let manifest = Manifest::new(
        "prepare-coref",
        summary.written.len(),
        summary.skipped.clone(),
    );
    output::write_json(&manifest, store.config_dir().join("coref_manifest.json"), true)?;

    log::info!(
        "Coreference data written for {} documents ({} skipped)",
        summary.written.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

fn prepare_document(
    gold_path: &Path,
    sys_dir: &Path,
    store: &AnnotationStore,
    annotation_ext: &str,
) -> Result<DocOutcome> {
    let file_name = gold_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let doc_id = file_name
        .strip_suffix(annotation_ext)
        .unwrap_or(&file_name)
        .to_string();

    let sys_path = sys_dir.join(&file_name);
    if !sys_path.is_file() {
        log::info!("System output does not contain {}", file_name);
        return Ok(DocOutcome::Skipped(doc_id));
    }

    log::debug!("Processing {}", doc_id);
    let gold = read_annotation_file(gold_path)?;
    let system = read_annotation_file(&sys_path)?;

    for (side, data) in [(Side::Gold, &gold), (Side::System, &system)] {
        output::write_json(&data.clusters, store.coref_path(&doc_id, side), true)?;
        output::write_json(&data.surface, store.surface_path(&doc_id, side), true)?;
    }

    Ok(DocOutcome::Written(doc_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use std::io::Cursor;

    const ANN: &str = "T1\tAttack 0 7\tstabbed\n\
T2\tAttack 20 26\tattack\n\
T3\tDie 30 34\tdied\n\
T4\tAttack 40 46\tassault\n\
E1\tAttack:T1 Attacker:T9\n\
E2\tAttack:T2\n\
E3\tDie:T3\n\
E4\tAttack:T4\n\
R1\tCoreference Arg1:E1 Arg2:E2\n\
R2\tAfter Arg1:E1 Arg2:E3\n\
R3\tCoreference Arg1:E4 Arg2:E2\n";

    fn ids(cluster: &Cluster) -> Vec<String> {
        cluster.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_parse_annotations() {
        let parsed = parse_annotations(Cursor::new(ANN)).unwrap();

        assert_eq!(parsed.clusters.len(), 1);
        assert_eq!(ids(parsed.clusters.get(0).unwrap()), vec!["E1", "E2", "E4"]);
        assert_eq!(parsed.surface.len(), 4);
        assert_eq!(parsed.surface.get(&EventId::from("E3")), Some("died"));
    }

    #[test]
    fn test_links_merge_transitively() {
        let mut builder = ClusterBuilder::default();
        builder.link("E1".into(), "E2".into());
        builder.link("E3".into(), "E4".into());
        builder.link("E5".into(), "E6".into());
        builder.link("E4".into(), "E1".into());

        let clusters = builder.finish();
        assert_eq!(clusters.len(), 2);
        assert_eq!(ids(clusters.get(0).unwrap()), vec!["E1", "E2", "E3", "E4"]);
        assert_eq!(ids(clusters.get(1).unwrap()), vec!["E5", "E6"]);
    }

    #[test]
    fn test_self_link_is_single_member() {
        let mut builder = ClusterBuilder::default();
        builder.link("E1".into(), "E1".into());
        assert_eq!(ids(builder.finish().get(0).unwrap()), vec!["E1"]);
    }

    #[test]
    fn test_non_coreference_relations_ignored() {
        assert_eq!(parse_coref_link("After Arg1:E1 Arg2:E3"), None);
        assert_eq!(parse_coref_link("Coreference Arg1:E1"), None);
        assert_eq!(
            parse_coref_link("Coreference Arg1:E1 Arg2:E3"),
            Some(("E1".into(), "E3".into()))
        );
    }

    #[test]
    fn test_prepare_coref_writes_both_sides() {
        let gold = tempfile::tempdir().unwrap();
        let sys = tempfile::tempdir().unwrap();
        let vis = tempfile::tempdir().unwrap();

        std::fs::write(gold.path().join("doc1.tkn.ann"), ANN).unwrap();
        std::fs::write(gold.path().join("doc2.tkn.ann"), ANN).unwrap();
        std::fs::write(gold.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(
            sys.path().join("doc1.tkn.ann"),
            "T1\tAttack 0 7\tstabbed\nE1\tAttack:T1\n",
        )
        .unwrap();

        let store = AnnotationStore::new(vis.path(), Layout::default());
        let summary = prepare_coref(gold.path(), sys.path(), &store, ".tkn.ann").unwrap();

        assert_eq!(summary.written, vec!["doc1"]);
        assert_eq!(summary.skipped, vec!["doc2"]);

        let gold_clusters = store.load_clusters("doc1", Side::Gold).unwrap();
        assert_eq!(gold_clusters.len(), 1);
        let sys_clusters = store.load_clusters("doc1", Side::System).unwrap();
        assert!(sys_clusters.is_empty());
        let sys_surface = store.load_surface("doc1", Side::System).unwrap();
        assert_eq!(sys_surface.get(&EventId::from("E1")), Some("stabbed"));
    }
}
