// coordnet/src/state/graph.rs
//
// Incremental weighted co-activity graph.
//
// Nodes are actor ids; an undirected edge records the accumulated similarity
// strength between two actors plus which side more often led the matched
// pair. Mutated monotonically by the detection engine — weight only ever
// grows, except through the explicit min-weight filter.

use std::collections::BTreeMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::events::Interaction;

/// One "who led" record, kept when history is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadEntry {
    pub actor: String,
    pub ts: i64,
    pub post_id: String,
}

/// One matched-pair record, kept when history is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub target: String,
    pub ts: i64,
    pub lead_post_id: String,
    pub follow_post_id: String,
}

/// Edge payload: accumulated strength plus leadership bookkeeping.
///
/// `lead_counts` maps each endpoint to the number of times it was the earlier
/// member of a matched pair. BTreeMap keeps serialized output deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoEdge {
    pub weight: f64,
    pub lead_counts: BTreeMap<String, f64>,
    pub leads: Vec<LeadEntry>,
    pub matches: Vec<MatchEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct CoactivityGraph {
    graph: UnGraph<String, CoEdge>,
    index: BTreeMap<String, NodeIndex>,
}

impl CoactivityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent node insert.
    pub fn ensure_node(&mut self, actor: &str) -> NodeIndex {
        if let Some(&ix) = self.index.get(actor) {
            return ix;
        }
        let ix = self.graph.add_node(actor.to_string());
        self.index.insert(actor.to_string(), ix);
        ix
    }

    /// Create or reinforce the edge between the two events' actors.
    ///
    /// `lead` is the earlier event of the pair; its actor's lead count is the
    /// one incremented. Edge identity is commutative: (u, v) and (v, u) hit
    /// the same edge.
    pub fn reinforce(
        &mut self,
        lead: &Interaction,
        follow: &Interaction,
        strength: f64,
        keep_history: bool,
    ) {
        debug_assert_ne!(lead.actor, follow.actor, "self-comparison must be filtered upstream");

        let u = self.ensure_node(&lead.actor);
        let v = self.ensure_node(&follow.actor);

        match self.graph.find_edge(u, v) {
            Some(e) => {
                let edge = &mut self.graph[e];
                edge.weight += strength;
                *edge.lead_counts.entry(lead.actor.clone()).or_insert(0.0) += 1.0;
                if keep_history {
                    push_history(edge, lead, follow);
                }
            }
            None => {
                let mut edge = CoEdge { weight: strength, ..Default::default() };
                edge.lead_counts.insert(lead.actor.clone(), 1.0);
                edge.lead_counts.insert(follow.actor.clone(), 0.0);
                if keep_history {
                    push_history(&mut edge, lead, follow);
                }
                self.graph.add_edge(u, v, edge);
            }
        }
    }

    /// Drop every edge with `weight < min_weight`, then every node left with
    /// degree 0. Two-phase so no orphaned nodes survive. A negative threshold
    /// disables filtering entirely.
    pub fn filter_min_weight(&mut self, min_weight: f64) {
        if min_weight < 0.0 {
            return;
        }
        self.graph.retain_edges(|g, e| g[e].weight >= min_weight);
        self.graph.retain_nodes(|g, n| g.neighbors(n).next().is_some());
        // node removal invalidates indices
        self.index = self
            .graph
            .node_indices()
            .map(|ix| (self.graph[ix].clone(), ix))
            .collect();
    }

    /// Full deep copy, for snapshots that must not perturb the live graph.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_actor(&self, actor: &str) -> bool {
        self.index.contains_key(actor)
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&CoEdge> {
        let u = *self.index.get(a)?;
        let v = *self.index.get(b)?;
        self.graph.find_edge(u, v).map(|e| &self.graph[e])
    }

    /// Actor ids, in index order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &str)> {
        self.graph.node_indices().map(|ix| (ix, self.graph[ix].as_str()))
    }

    /// Edges as (actor, actor, payload).
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &CoEdge)> {
        self.graph.edge_references().map(|e| {
            (
                self.graph[e.source()].as_str(),
                self.graph[e.target()].as_str(),
                e.weight(),
            )
        })
    }

    /// Mean, over the node's incident edges, of its share of each edge's lead
    /// count. 1.0 means the actor led every matched pair it took part in.
    pub fn first_proportion(&self, ix: NodeIndex) -> f64 {
        let actor = &self.graph[ix];
        let mut total = 0.0;
        let mut n = 0usize;
        for e in self.graph.edges(ix) {
            let edge = e.weight();
            let reinforcements: f64 = edge.lead_counts.values().sum();
            if reinforcements > 0.0 {
                total += edge.lead_counts.get(actor).copied().unwrap_or(0.0) / reinforcements;
            }
            n += 1;
        }
        if n == 0 { 0.0 } else { total / n as f64 }
    }
}

fn push_history(edge: &mut CoEdge, lead: &Interaction, follow: &Interaction) {
    edge.leads.push(LeadEntry {
        actor: lead.actor.clone(),
        ts: lead.ts,
        post_id: lead.post_id.clone(),
    });
    edge.matches.push(MatchEntry {
        target: lead.target.clone(),
        ts: lead.ts,
        lead_post_id: lead.post_id.clone(),
        follow_post_id: follow.post_id.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(actor: &str, ts: i64, target: &str) -> Interaction {
        Interaction {
            post_id: format!("{actor}-{ts}"),
            ts,
            actor: actor.into(),
            target: target.into(),
        }
    }

    #[test]
    fn ensure_node_is_idempotent() {
        let mut g = CoactivityGraph::new();
        let a = g.ensure_node("alice");
        let b = g.ensure_node("alice");
        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn first_reinforcement_creates_the_edge() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("alice", 100, "h1"), &ev("bob", 105, "h1"), 1.0, false);

        let edge = g.edge("alice", "bob").expect("edge");
        assert_eq!(edge.weight, 1.0);
        assert_eq!(edge.lead_counts["alice"], 1.0);
        assert_eq!(edge.lead_counts["bob"], 0.0);
        assert!(edge.leads.is_empty());
    }

    #[test]
    fn edge_identity_is_commutative() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("alice", 100, "h1"), &ev("bob", 105, "h1"), 1.0, false);
        // bob leads this time; same edge, swapped lead credit
        g.reinforce(&ev("bob", 200, "h2"), &ev("alice", 201, "h2"), 0.5, false);

        assert_eq!(g.edge_count(), 1);
        let edge = g.edge("bob", "alice").expect("edge reachable from either end");
        assert_eq!(edge.weight, 1.5);
        assert_eq!(edge.lead_counts["alice"], 1.0);
        assert_eq!(edge.lead_counts["bob"], 1.0);
    }

    #[test]
    fn history_records_lead_and_match() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("alice", 100, "h1"), &ev("bob", 105, "h1"), 1.0, true);

        let edge = g.edge("alice", "bob").unwrap();
        assert_eq!(edge.leads.len(), 1);
        assert_eq!(edge.leads[0].actor, "alice");
        assert_eq!(edge.matches[0].target, "h1");
        assert_eq!(edge.matches[0].lead_post_id, "alice-100");
        assert_eq!(edge.matches[0].follow_post_id, "bob-105");
    }

    #[test]
    fn filter_drops_light_edges_then_orphans() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 1.0, false);
        g.reinforce(&ev("b", 3, "y"), &ev("c", 4, "y"), 1.0, false);
        g.reinforce(&ev("b", 5, "z"), &ev("c", 6, "z"), 1.0, false);

        g.filter_min_weight(2.0);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.node_count(), 2);
        assert!(!g.contains_actor("a"));
        assert!(g.edge("b", "c").is_some());
    }

    #[test]
    fn filter_is_idempotent() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 1.0, false);
        g.reinforce(&ev("b", 3, "y"), &ev("c", 4, "y"), 3.0, false);

        g.filter_min_weight(2.0);
        let (v1, e1) = (g.node_count(), g.edge_count());
        g.filter_min_weight(2.0);
        assert_eq!((g.node_count(), g.edge_count()), (v1, e1));
    }

    #[test]
    fn negative_threshold_disables_filtering() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 0.1, false);
        g.filter_min_weight(-1.0);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn snapshot_is_independent_of_the_live_graph() {
        let mut g = CoactivityGraph::new();
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 1.0, false);

        let snap = g.snapshot();
        g.reinforce(&ev("a", 3, "y"), &ev("b", 4, "y"), 1.0, false);

        assert_eq!(snap.edge("a", "b").unwrap().weight, 1.0);
        assert_eq!(g.edge("a", "b").unwrap().weight, 2.0);
    }

    #[test]
    fn first_proportion_is_the_mean_lead_share() {
        let mut g = CoactivityGraph::new();
        // a leads b twice, b never leads
        g.reinforce(&ev("a", 1, "x"), &ev("b", 2, "x"), 1.0, false);
        g.reinforce(&ev("a", 3, "y"), &ev("b", 4, "y"), 1.0, false);
        // c leads a once
        g.reinforce(&ev("c", 5, "z"), &ev("a", 6, "z"), 1.0, false);

        let (a_ix, _) = g.nodes().find(|(_, id)| *id == "a").unwrap();
        let (b_ix, _) = g.nodes().find(|(_, id)| *id == "b").unwrap();
        // a: led 2/2 on (a,b), 0/1 on (a,c) -> mean 0.5
        assert!((g.first_proportion(a_ix) - 0.5).abs() < 1e-9);
        assert!((g.first_proportion(b_ix) - 0.0).abs() < 1e-9);
    }
}
