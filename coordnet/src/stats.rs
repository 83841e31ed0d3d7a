// coordnet/src/stats.rs
//
// Whole-graph summary statistics and cross-graph node-set similarity over
// loaded GraphML documents. One CSV line out per graph (or pair), so results
// from many runs concatenate into a single table.

use std::collections::{HashMap, HashSet};

use petgraph::unionfind::UnionFind;
use thiserror::Error;

use crate::graphml::GraphDoc;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("empty graph")]
    EmptyGraph,

    #[error("edge {src}--{target} has no '{attr}' attribute")]
    MissingWeight { src: String, target: String, attr: String },

    #[error("edge references unknown node '{0}'")]
    UnknownEndpoint(String),
}

pub const STATS_COLUMNS: &str = "filename,nodes,edges,edge_weight_mean,edge_weight_stdev,\
density,components,largest_component_nodes,largest_component_edges,\
largest_component_edge_weight_mean,largest_component_edge_weight_stdev,\
largest_component_density";

pub const SIMILARITY_COLUMNS: &str =
    "g1,g2,g1_nodes,g2_nodes,jaccard,overlap,g1_lc_nodes,g2_lc_nodes,jaccard_lc,overlap_lc";

#[derive(Debug, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub edge_weight_mean: f64,
    pub edge_weight_stdev: f64,
    pub density: f64,
    pub components: usize,
    pub largest_component_nodes: usize,
    pub largest_component_edges: usize,
    pub largest_component_edge_weight_mean: f64,
    pub largest_component_edge_weight_stdev: f64,
    pub largest_component_density: f64,
}

impl GraphStats {
    pub fn csv_line(&self, filename: &str) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            filename,
            self.nodes,
            self.edges,
            self.edge_weight_mean,
            self.edge_weight_stdev,
            self.density,
            self.components,
            self.largest_component_nodes,
            self.largest_component_edges,
            self.largest_component_edge_weight_mean,
            self.largest_component_edge_weight_stdev,
            self.largest_component_density,
        )
    }
}

pub fn compute(doc: &GraphDoc, weight_attr: &str) -> Result<GraphStats, StatsError> {
    if doc.nodes.is_empty() {
        return Err(StatsError::EmptyGraph);
    }

    let index: HashMap<&str, usize> = doc
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut weights = Vec::with_capacity(doc.edges.len());
    let mut uf = UnionFind::<usize>::new(doc.nodes.len());
    for edge in &doc.edges {
        let w = doc
            .edge_weight(edge, weight_attr)
            .ok_or_else(|| StatsError::MissingWeight {
                src: edge.source.clone(),
                target: edge.target.clone(),
                attr: weight_attr.to_string(),
            })?;
        weights.push(w);

        let s = *index
            .get(edge.source.as_str())
            .ok_or_else(|| StatsError::UnknownEndpoint(edge.source.clone()))?;
        let t = *index
            .get(edge.target.as_str())
            .ok_or_else(|| StatsError::UnknownEndpoint(edge.target.clone()))?;
        uf.union(s, t);
    }

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..doc.nodes.len() {
        members.entry(uf.find(i)).or_default().push(i);
    }
    let components = members.len();
    let largest: HashSet<usize> = members
        .values()
        .max_by_key(|m| m.len())
        .map(|m| m.iter().copied().collect())
        .unwrap_or_default();

    let lc_weights: Vec<f64> = doc
        .edges
        .iter()
        .zip(&weights)
        .filter(|(e, _)| {
            largest.contains(&index[e.source.as_str()]) && largest.contains(&index[e.target.as_str()])
        })
        .map(|(_, &w)| w)
        .collect();

    let (mean, stdev) = mean_pstdev(&weights);
    let (lc_mean, lc_stdev) = mean_pstdev(&lc_weights);

    Ok(GraphStats {
        nodes: doc.nodes.len(),
        edges: doc.edges.len(),
        edge_weight_mean: mean,
        edge_weight_stdev: stdev,
        density: density(doc.nodes.len(), doc.edges.len()),
        components,
        largest_component_nodes: largest.len(),
        largest_component_edges: lc_weights.len(),
        largest_component_edge_weight_mean: lc_mean,
        largest_component_edge_weight_stdev: lc_stdev,
        largest_component_density: density(largest.len(), lc_weights.len()),
    })
}

#[derive(Debug, PartialEq)]
pub struct SimilarityStats {
    pub g1_nodes: usize,
    pub g2_nodes: usize,
    pub jaccard: f64,
    pub overlap: f64,
    pub g1_lc_nodes: usize,
    pub g2_lc_nodes: usize,
    pub jaccard_lc: f64,
    pub overlap_lc: f64,
}

impl SimilarityStats {
    pub fn csv_line(&self, g1: &str, g2: &str) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            g1,
            g2,
            self.g1_nodes,
            self.g2_nodes,
            self.jaccard,
            self.overlap,
            self.g1_lc_nodes,
            self.g2_lc_nodes,
            self.jaccard_lc,
            self.overlap_lc,
        )
    }
}

/// Node-set Jaccard and overlap coefficients between two graphs, whole-graph
/// and largest-component variants.
pub fn similarity(g1: &GraphDoc, g2: &GraphDoc) -> SimilarityStats {
    let n1: HashSet<&str> = g1.nodes.iter().map(|n| n.id.as_str()).collect();
    let n2: HashSet<&str> = g2.nodes.iter().map(|n| n.id.as_str()).collect();
    let lc1 = largest_component_ids(g1);
    let lc2 = largest_component_ids(g2);
    let lc1: HashSet<&str> = lc1.iter().map(String::as_str).collect();
    let lc2: HashSet<&str> = lc2.iter().map(String::as_str).collect();

    SimilarityStats {
        g1_nodes: n1.len(),
        g2_nodes: n2.len(),
        jaccard: jaccard(&n1, &n2),
        overlap: overlap(&n1, &n2),
        g1_lc_nodes: lc1.len(),
        g2_lc_nodes: lc2.len(),
        jaccard_lc: jaccard(&lc1, &lc2),
        overlap_lc: overlap(&lc1, &lc2),
    }
}

fn largest_component_ids(doc: &GraphDoc) -> Vec<String> {
    if doc.nodes.is_empty() {
        return Vec::new();
    }
    let index: HashMap<&str, usize> = doc
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut uf = UnionFind::<usize>::new(doc.nodes.len());
    for edge in &doc.edges {
        if let (Some(&s), Some(&t)) =
            (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
        {
            uf.union(s, t);
        }
    }
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..doc.nodes.len() {
        members.entry(uf.find(i)).or_default().push(i);
    }
    members
        .into_values()
        .max_by_key(|m| m.len())
        .unwrap_or_default()
        .into_iter()
        .map(|i| doc.nodes[i].id.clone())
        .collect()
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn overlap(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let min = a.len().min(b.len());
    if min == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / min as f64
}

fn mean_pstdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    // population stdev: these are all the edge weights there are
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var.sqrt())
}

fn density(nodes: usize, edges: usize) -> f64 {
    if nodes < 2 {
        return 0.0;
    }
    (2 * edges) as f64 / (nodes * (nodes - 1)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn doc(nodes: &[&str], edges: &[(&str, &str, f64)]) -> GraphDoc {
        let mut d = GraphDoc::default();
        for n in nodes {
            d.add_node(n, Map::new());
        }
        for (s, t, w) in edges {
            d.add_edge(s, t, [("weight".to_string(), w.to_string())].into());
        }
        d
    }

    #[test]
    fn triangle_plus_isolated_pair() {
        let d = doc(
            &["a", "b", "c", "d", "e"],
            &[("a", "b", 1.0), ("b", "c", 2.0), ("a", "c", 3.0), ("d", "e", 6.0)],
        );
        let s = compute(&d, "weight").unwrap();

        assert_eq!(s.nodes, 5);
        assert_eq!(s.edges, 4);
        assert_eq!(s.components, 2);
        assert_eq!(s.largest_component_nodes, 3);
        assert_eq!(s.largest_component_edges, 3);
        assert!((s.edge_weight_mean - 3.0).abs() < 1e-9);
        assert!((s.largest_component_edge_weight_mean - 2.0).abs() < 1e-9);
        // 4 edges over C(5,2)=10 possible
        assert!((s.density - 0.4).abs() < 1e-9);
        assert!((s.largest_component_density - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_graph_is_an_error() {
        assert!(matches!(compute(&GraphDoc::default(), "weight"), Err(StatsError::EmptyGraph)));
    }

    #[test]
    fn missing_weight_attribute_is_an_error() {
        let mut d = doc(&["a", "b"], &[]);
        d.add_edge("a", "b", Map::new());
        assert!(matches!(
            compute(&d, "weight"),
            Err(StatsError::MissingWeight { .. })
        ));
    }

    #[test]
    fn node_set_similarity() {
        let g1 = doc(&["a", "b", "c"], &[("a", "b", 1.0), ("b", "c", 1.0)]);
        let g2 = doc(&["b", "c", "d"], &[("b", "c", 1.0)]);
        let s = similarity(&g1, &g2);

        assert_eq!(s.g1_nodes, 3);
        assert_eq!(s.g2_nodes, 3);
        // {b,c} of {a,b,c,d}
        assert!((s.jaccard - 0.5).abs() < 1e-9);
        assert!((s.overlap - 2.0 / 3.0).abs() < 1e-9);
        // g1 LC = {a,b,c}; g2 LC = {b,c}
        assert_eq!(s.g1_lc_nodes, 3);
        assert_eq!(s.g2_lc_nodes, 2);
        assert!((s.jaccard_lc - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.overlap_lc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn population_stdev_matches_hand_calc() {
        let (mean, stdev) = mean_pstdev(&[1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-9);
        assert!((stdev - (1.25f64).sqrt()).abs() < 1e-9);
    }
}
