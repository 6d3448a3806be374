//! Cluster filter
//!
//! Restricts a document payload to the events of user-selected coreference
//! clusters and builds display labels for clusters. All operations are pure:
//! inputs are never modified, results are fresh values.

use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::error::{Result, VizError};
use crate::payload::{ClusterList, DocumentPayload, EventId, SurfaceForms};

/// Separator between member surface forms in a cluster label
pub const CLUSTER_NAME_SEPARATOR: &str = "=>";

/// Indices of selected clusters (0-based positions in a cluster list)
pub type Selection = BTreeSet<usize>;

/// Check that every selected index points at an existing cluster
pub fn validate_selection(clusters: &ClusterList, selected: &Selection) -> Result<()> {
    match selected.iter().find(|&&index| index >= clusters.len()) {
        Some(&index) => Err(VizError::InvalidClusterIndex {
            index,
            len: clusters.len(),
        }),
        None => Ok(()),
    }
}

/// Union of the event identifiers of all selected clusters
pub fn build_event_index(clusters: &ClusterList, selected: &Selection) -> Result<HashSet<EventId>> {
    validate_selection(clusters, selected)?;

    let index = selected
        .iter()
        .filter_map(|&i| clusters.get(i))
        .flat_map(|cluster| cluster.iter().cloned())
        .collect();
    Ok(index)
}

/// Copy of `payload` keeping only events that belong to a selected cluster.
///
/// Relative order of the kept events is preserved. An empty selection yields
/// an empty event sequence; callers that want every event skip filtering.
pub fn filter_payload(
    payload: &DocumentPayload,
    clusters: &ClusterList,
    selected: &Selection,
) -> Result<DocumentPayload> {
    let index = build_event_index(clusters, selected)?;

    let mut filtered = payload.clone();
    filtered.events.retain(|event| index.contains(event.id()));

    log::debug!(
        "Cluster filter kept {}/{} events ({} clusters selected)",
        filtered.events.len(),
        payload.events.len(),
        selected.len()
    );
    Ok(filtered)
}

/// [`filter_payload`] on an unvalidated JSON payload
pub fn filter_json(payload: &Value, clusters: &ClusterList, selected: &Selection) -> Result<Value> {
    let payload = DocumentPayload::from_value(payload.clone())?;
    Ok(filter_payload(&payload, clusters, selected)?.to_value())
}

/// One display label per cluster: member surface forms joined with `=>`
pub fn name_clusters(clusters: &ClusterList, surface: &SurfaceForms) -> Result<Vec<String>> {
    clusters
        .iter()
        .map(|cluster| {
            let parts = cluster
                .iter()
                .map(|id| {
                    surface
                        .get(id)
                        .ok_or_else(|| VizError::MissingSurfaceForm(id.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(CLUSTER_NAME_SEPARATOR))
        })
        .collect()
}

/// Parse a comma-separated list of cluster indices ("0,2,5").
///
/// Blank input means no selection.
pub fn parse_selection(input: &str) -> std::result::Result<Selection, std::num::ParseIntError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clusters() -> ClusterList {
        ClusterList::new(vec![
            vec!["e1".into(), "e2".into()],
            vec!["e3".into()],
        ])
    }

    fn payload() -> DocumentPayload {
        DocumentPayload::from_value(json!({
            "text": "John arrived. He left. Mary waved.",
            "triggers": [["T1", "Movement", [[5, 12]]]],
            "events": [
                ["e1", "T1", []],
                ["e2", "T2", []],
                ["e3", "T3", []],
                ["e4", "T4", []]
            ]
        }))
        .unwrap()
    }

    fn select(indices: &[usize]) -> Selection {
        indices.iter().copied().collect()
    }

    #[test]
    fn test_event_index_for_single_cluster() {
        let index = build_event_index(&clusters(), &select(&[0])).unwrap();
        let expected: HashSet<EventId> = ["e1", "e2"].iter().map(|&s| s.into()).collect();
        assert_eq!(index, expected);
    }

    #[test]
    fn test_event_index_empty_selection() {
        let index = build_event_index(&clusters(), &Selection::new()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_event_index_unions_overlapping_clusters() {
        let overlapping = ClusterList::new(vec![
            vec!["e1".into(), "e2".into()],
            vec!["e2".into(), "e5".into()],
        ]);
        let index = build_event_index(&overlapping, &select(&[0, 1])).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_invalid_index_fails_fast() {
        let err = build_event_index(&clusters(), &select(&[0, 5])).unwrap_err();
        assert!(matches!(err, VizError::InvalidClusterIndex { index: 5, len: 2 }));

        let err = filter_payload(&payload(), &clusters(), &select(&[2])).unwrap_err();
        assert!(matches!(err, VizError::InvalidClusterIndex { index: 2, .. }));
    }

    #[test]
    fn test_filter_keeps_selected_events_in_order() {
        let original = payload();
        let filtered = filter_payload(&original, &clusters(), &select(&[0])).unwrap();

        let ids: Vec<String> = filtered.event_ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(filtered.rest, original.rest);
    }

    #[test]
    fn test_filter_result_is_subsequence() {
        let original = payload();
        let reversed_selection = select(&[1, 0]);
        let filtered = filter_payload(&original, &clusters(), &reversed_selection).unwrap();

        let mut remaining = original.events.iter();
        for kept in &filtered.events {
            assert!(remaining.any(|e| e == kept), "order not preserved");
        }
        assert_eq!(filtered.events.len(), 3);
    }

    #[test]
    fn test_filter_does_not_mutate_input() {
        let original = payload();
        let snapshot = original.clone();
        let cluster_snapshot = clusters();
        let list = clusters();

        let _ = filter_payload(&original, &list, &select(&[1])).unwrap();
        assert_eq!(original, snapshot);
        assert_eq!(list, cluster_snapshot);
    }

    #[test]
    fn test_filter_with_empty_selection_is_empty() {
        let filtered = filter_payload(&payload(), &clusters(), &Selection::new()).unwrap();
        assert!(filtered.events.is_empty());
        assert!(filtered.rest.contains_key("text"));
    }

    #[test]
    fn test_filter_json_requires_events() {
        let err = filter_json(&json!({"text": "no events"}), &clusters(), &select(&[0])).unwrap_err();
        assert!(matches!(err, VizError::MalformedPayload(_)));

        let raw = payload().to_value();
        let filtered = filter_json(&raw, &clusters(), &select(&[1])).unwrap();
        assert_eq!(filtered["events"], json!([["e3", "T3", []]]));
        assert_eq!(filtered["text"], raw["text"]);
    }

    #[test]
    fn test_name_clusters() {
        let surface: SurfaceForms = [("e1", "John"), ("e2", "he"), ("e3", "waved")]
            .into_iter()
            .collect();
        let names = name_clusters(&clusters(), &surface).unwrap();
        assert_eq!(names, vec!["John=>he", "waved"]);
    }

    #[test]
    fn test_name_clusters_keeps_member_order() {
        let reordered = ClusterList::new(vec![vec!["e2".into(), "e1".into()]]);
        let surface: SurfaceForms = [("e1", "John"), ("e2", "he")].into_iter().collect();
        assert_eq!(name_clusters(&reordered, &surface).unwrap(), vec!["he=>John"]);
    }

    #[test]
    fn test_name_clusters_missing_surface() {
        let surface: SurfaceForms = [("e1", "John")].into_iter().collect();
        let err = name_clusters(&clusters(), &surface).unwrap_err();
        match err {
            VizError::MissingSurfaceForm(id) => assert_eq!(id, EventId::from("e2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("0, 2,5").unwrap(), select(&[0, 2, 5]));
        assert!(parse_selection("").unwrap().is_empty());
        assert!(parse_selection("1,x").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn event_id(n: u8) -> EventId {
            EventId::from(format!("E{}", n).as_str())
        }

        fn payload_of(ids: &[u8]) -> DocumentPayload {
            let events: Vec<Value> = ids
                .iter()
                .map(|n| json!([format!("E{}", n), format!("T{}", n), []]))
                .collect();
            DocumentPayload::from_value(json!({"text": "t", "relations": [], "events": events})).unwrap()
        }

        proptest! {
            #[test]
            fn filtered_events_follow_payload_order(
                ids in prop::collection::vec(0u8..20, 0..30),
                members in prop::collection::vec(prop::collection::vec(0u8..20, 1..5), 1..6),
                picks in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
            ) {
                let payload = payload_of(&ids);
                let original = payload.clone();
                let clusters = ClusterList::new(
                    members.iter().map(|c| c.iter().copied().map(event_id).collect()).collect(),
                );
                let selection: Selection = picks.iter().map(|p| p.index(clusters.len())).collect();

                let filtered = filter_payload(&payload, &clusters, &selection).unwrap();

                prop_assert_eq!(&payload, &original);
                prop_assert_eq!(&filtered.rest, &payload.rest);

                let mut remaining = payload.events.iter();
                for event in &filtered.events {
                    prop_assert!(remaining.any(|e| e == event));
                }

                let index = build_event_index(&clusters, &selection).unwrap();
                let expected: Vec<_> = payload
                    .events
                    .iter()
                    .filter(|e| index.contains(e.id()))
                    .cloned()
                    .collect();
                prop_assert_eq!(filtered.events, expected);
            }

            #[test]
            fn out_of_range_selection_always_fails(
                count in 0usize..5,
                extra in 0usize..10,
            ) {
                let clusters = ClusterList::new((0..count).map(|n| vec![event_id(n as u8)]).collect());
                let selection: Selection = [count + extra].into_iter().collect();
                let result = filter_payload(&payload_of(&[0, 1]), &clusters, &selection);
                let is_invalid_index = matches!(result, Err(VizError::InvalidClusterIndex { .. }));
                prop_assert!(is_invalid_index);
            }
        }
    }
}
