// coordnet/src/engine/snapshot.rs
//
// Snapshot cadence, naming and delegation to the GraphML writer.
//
// One snapshot per completed window plus a terminal FINAL snapshot;
// final-only mode suppresses the intermediates, dry-run suppresses
// everything. Non-scalar edge structures (lead counts, history) are
// flattened to JSON strings since the graph format carries scalars only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use tracing::info;

use crate::engine::detector::SnapshotRequest;
use crate::graphml::{self, AttrType, GraphDoc, KeyDomain};
use crate::state::graph::CoactivityGraph;

pub struct SnapshotController {
    out_filebase: String,
    tag: Option<String>,
    dry_run: bool,
    final_only: bool,
    final_min_edge_weight: f64,
    keep_history: bool,
}

impl SnapshotController {
    pub fn new(
        out_filebase: impl Into<String>,
        tag: Option<String>,
        dry_run: bool,
        final_only: bool,
        final_min_edge_weight: f64,
        keep_history: bool,
    ) -> Self {
        Self {
            out_filebase: out_filebase.into(),
            tag,
            dry_run,
            final_only,
            final_min_edge_weight,
            keep_history,
        }
    }

    /// Adopt an output tag discovered mid-stream (e.g. from a CSV
    /// `interaction` column). First value wins; explicit tags are never
    /// overridden.
    pub fn adopt_tag(&mut self, tag: &str) {
        if self.tag.is_none() && !tag.is_empty() {
            self.tag = Some(tag.to_string());
        }
    }

    /// Write the requested snapshot. Returns the written path, or None when
    /// the snapshot was suppressed.
    pub fn emit(
        &self,
        request: &SnapshotRequest,
        graph: &CoactivityGraph,
    ) -> Result<Option<PathBuf>> {
        let suppressed = if request.terminal {
            self.dry_run
        } else {
            self.dry_run || self.final_only
        };
        if suppressed {
            return Ok(None);
        }

        let doc = if request.terminal && self.final_min_edge_weight >= 0.0 {
            // filter a deep copy; the live graph is never rolled back
            let mut filtered = graph.snapshot();
            filtered.filter_min_weight(self.final_min_edge_weight);
            self.to_doc(&filtered)
        } else {
            self.to_doc(graph)
        };

        let path = self.snapshot_path(request);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        graphml::write_file(&doc, &path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "wrote graph to {}",
            path.display()
        );
        Ok(Some(path))
    }

    fn snapshot_path(&self, request: &SnapshotRequest) -> PathBuf {
        let key = if request.terminal {
            "FINAL".to_string()
        } else {
            window_key(request.window_start)
        };
        let tag = self.tag.as_deref().map(|t| format!("-{t}")).unwrap_or_default();
        PathBuf::from(format!("{}{}-{}.graphml", self.out_filebase, tag, key))
    }

    fn to_doc(&self, graph: &CoactivityGraph) -> GraphDoc {
        let mut doc = GraphDoc::default();
        doc.declare_key("label", KeyDomain::Node, AttrType::Str);
        doc.declare_key("first_proportion", KeyDomain::Node, AttrType::Double);
        doc.declare_key("weight", KeyDomain::Edge, AttrType::Double);
        doc.declare_key("first_counts", KeyDomain::Edge, AttrType::Str);
        if self.keep_history {
            doc.declare_key("first", KeyDomain::Edge, AttrType::Str);
            doc.declare_key("reasons", KeyDomain::Edge, AttrType::Str);
        }

        for (ix, actor) in graph.nodes() {
            let mut attrs = HashMap::new();
            attrs.insert("label".to_string(), actor.to_string());
            attrs.insert(
                "first_proportion".to_string(),
                graph.first_proportion(ix).to_string(),
            );
            doc.add_node(actor, attrs);
        }

        for (u, v, edge) in graph.edges() {
            let mut attrs = HashMap::new();
            attrs.insert("weight".to_string(), edge.weight.to_string());
            attrs.insert(
                "first_counts".to_string(),
                serde_json::to_string(&edge.lead_counts).unwrap_or_default(),
            );
            if self.keep_history {
                attrs.insert(
                    "first".to_string(),
                    serde_json::to_string(&edge.leads).unwrap_or_default(),
                );
                attrs.insert(
                    "reasons".to_string(),
                    serde_json::to_string(&edge.matches).unwrap_or_default(),
                );
            }
            doc.add_edge(u, v, attrs);
        }
        doc
    }
}

/// Compact sortable UTC key for window-start timestamps.
pub fn window_key(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Derive a default output path for a filtered graph:
/// `g.graphml` -> `g-min2.5.graphml`.
pub fn filtered_path(input: &Path, min_weight: f64) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("graph");
    let name = format!("{stem}-min{min_weight}.graphml");
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Interaction;

    fn ev(actor: &str, ts: i64, target: &str) -> Interaction {
        Interaction {
            post_id: format!("{actor}-{ts}"),
            ts,
            actor: actor.into(),
            target: target.into(),
        }
    }

    fn small_graph() -> CoactivityGraph {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 1.0, false);
        g.reinforce(&ev("b", 3, "y"), &ev("c", 4, "y"), 3.0, false);
        g
    }

    fn controller(dir: &Path, final_only: bool, min_w: f64) -> SnapshotController {
        SnapshotController::new(
            dir.join("lcn").to_string_lossy().into_owned(),
            Some("HASHTAGS".to_string()),
            false,
            final_only,
            min_w,
            false,
        )
    }

    #[test]
    fn window_keys_are_sortable_timestamps() {
        assert_eq!(window_key(0), "19700101_000000");
        assert_eq!(window_key(1_000_000_000), "20010909_014640");
    }

    #[test]
    fn intermediate_snapshot_lands_under_the_window_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path(), false, -1.0);
        let req = SnapshotRequest { window_start: 1_000_000_000, terminal: false };

        let path = ctl.emit(&req, &small_graph()).unwrap().expect("written");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "lcn-HASHTAGS-20010909_014640.graphml"
        );
        assert!(path.exists());
    }

    #[test]
    fn final_only_suppresses_intermediates_but_not_the_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path(), true, -1.0);
        let g = small_graph();

        let mid = SnapshotRequest { window_start: 100, terminal: false };
        assert!(ctl.emit(&mid, &g).unwrap().is_none());

        let fin = SnapshotRequest { window_start: 100, terminal: true };
        let path = ctl.emit(&fin, &g).unwrap().expect("terminal written");
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-FINAL.graphml"));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = SnapshotController::new(
            dir.path().join("lcn").to_string_lossy().into_owned(),
            None,
            true,
            false,
            -1.0,
            false,
        );
        let fin = SnapshotRequest { window_start: 100, terminal: true };
        assert!(ctl.emit(&fin, &small_graph()).unwrap().is_none());
    }

    #[test]
    fn terminal_filtering_leaves_the_live_graph_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path(), false, 2.0);
        let g = small_graph();

        let fin = SnapshotRequest { window_start: 100, terminal: true };
        let path = ctl.emit(&fin, &g).unwrap().expect("written");

        // written graph is filtered; the in-memory graph is untouched
        let doc = graphml::read_file(&path).unwrap();
        assert_eq!(doc.edges.len(), 1);
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn edge_structures_flatten_to_json_strings() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = SnapshotController::new(
            dir.path().join("g").to_string_lossy().into_owned(),
            None,
            false,
            false,
            -1.0,
            true,
        );
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 10, "x"), &ev("b", 12, "x"), 1.0, true);

        let fin = SnapshotRequest { window_start: 10, terminal: true };
        let path = ctl.emit(&fin, &g).unwrap().unwrap();
        let doc = graphml::read_file(&path).unwrap();

        let edge = &doc.edges[0];
        let counts: std::collections::BTreeMap<String, f64> =
            serde_json::from_str(&edge.attrs["first_counts"]).unwrap();
        assert_eq!(counts["a"], 1.0);
        assert_eq!(counts["b"], 0.0);

        let leads: serde_json::Value = serde_json::from_str(&edge.attrs["first"]).unwrap();
        assert_eq!(leads[0]["actor"], "a");
        let reasons: serde_json::Value = serde_json::from_str(&edge.attrs["reasons"]).unwrap();
        assert_eq!(reasons[0]["target"], "x");
    }
}
