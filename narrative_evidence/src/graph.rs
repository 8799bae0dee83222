//! Directed-graph view of a decision chain.
//!
//! Each record becomes a node. Each distinct lineage artifact (keyed by
//! source type, id and hash) becomes a node too. Edges run from a record to
//! every lineage node it consumed and from a record to its immediate
//! predecessor in chain order.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::{DecisionTraceRecord, SourceType, TraceType};

/// Node in a [`ChainGraph`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum GraphNode {
    /// A decision trace record.
    Decision {
        /// Graph-local key (`dtr:<position>`).
        key: String,
        /// Record trace id.
        trace_id: String,
        /// Chain position.
        position: u64,
        /// Decision kind.
        trace_type: TraceType,
    },
    /// An upstream artifact.
    Lineage {
        /// Graph-local key (`src:<n>`).
        key: String,
        /// Artifact id.
        source_id: String,
        /// Artifact kind.
        source_type: SourceType,
        /// Artifact content hash.
        source_hash: String,
    },
}

impl GraphNode {
    /// Graph-local key.
    pub fn key(&self) -> &str {
        match self {
            Self::Decision { key, .. } | Self::Lineage { key, .. } => key,
        }
    }
}

/// Edge relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Decision consumed the lineage artifact.
    Consumed,
    /// Decision immediately follows the target decision.
    Follows,
}

/// Directed edge `from -> to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node key.
    pub from: String,
    /// Target node key.
    pub to: String,
    /// Relation.
    pub kind: EdgeKind,
}

/// Graph representation of one chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainGraph {
    /// Decision nodes in chain order, then lineage nodes in first-seen order.
    pub nodes: Vec<GraphNode>,
    /// Edges in record order.
    pub edges: Vec<GraphEdge>,
}

impl ChainGraph {
    /// Build the graph for `records` (assumed to be one chain in order).
    pub fn from_records(records: &[DecisionTraceRecord]) -> Self {
        let mut decisions = Vec::with_capacity(records.len());
        let mut lineage_nodes = Vec::new();
        let mut lineage_keys: BTreeMap<(SourceType, &str, &str), String> = BTreeMap::new();
        let mut edges = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let key = format!("dtr:{}", record.chain_position);
            decisions.push(GraphNode::Decision {
                key: key.clone(),
                trace_id: record.trace_id.to_string(),
                position: record.chain_position,
                trace_type: record.trace_type,
            });

            for source in &record.input_lineage {
                let id = (
                    source.source_type,
                    source.source_id.as_str(),
                    source.source_hash.as_str(),
                );
                let target = lineage_keys
                    .entry(id)
                    .or_insert_with(|| {
                        let k = format!("src:{}", lineage_nodes.len());
                        lineage_nodes.push(GraphNode::Lineage {
                            key: k.clone(),
                            source_id: source.source_id.clone(),
                            source_type: source.source_type,
                            source_hash: source.source_hash.clone(),
                        });
                        k
                    })
                    .clone();
                edges.push(GraphEdge {
                    from: key.clone(),
                    to: target,
                    kind: EdgeKind::Consumed,
                });
            }

            if let Some(prev) = i.checked_sub(1).map(|p| &records[p]) {
                edges.push(GraphEdge {
                    from: key,
                    to: format!("dtr:{}", prev.chain_position),
                    kind: EdgeKind::Follows,
                });
            }
        }

        decisions.append(&mut lineage_nodes);
        Self {
            nodes: decisions,
            edges,
        }
    }

    /// Render as Graphviz DOT.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph decision_chain {\n");
        for node in &self.nodes {
            let _ = match node {
                GraphNode::Decision {
                    key,
                    position,
                    trace_type,
                    ..
                } => writeln!(
                    out,
                    "  \"{key}\" [shape=box, label=\"#{position} {trace_type}\"];"
                ),
                GraphNode::Lineage {
                    key,
                    source_id,
                    source_type,
                    ..
                } => writeln!(
                    out,
                    "  \"{key}\" [shape=ellipse, label=\"{} {}\"];",
                    source_type.as_str(),
                    source_id.replace('"', "'")
                ),
            };
        }
        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Consumed => "dashed",
                EdgeKind::Follows => "solid",
            };
            let _ = writeln!(out, "  \"{}\" -> \"{}\" [style={style}];", edge.from, edge.to);
        }
        out.push_str("}\n");
        out
    }
}
