//! # Subgraph Export
//!
//! Renders a `Subgraph` for visualization tools.
//!
//! - DOT (Graphviz)
//! - Mermaid flowchart
//! - plain JSON `{nodes, edges}` document
//!
//! Output is deterministic for a given subgraph: nodes in discovery order,
//! edges in traversal order.

use crate::graph::Subgraph;
use crate::types::NesError;
use serde::Serialize;
use std::fmt::Write as _;
use std::str::FromStr;

/// Supported output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Dot,
    Mermaid,
    Json,
}

impl FromStr for ExportFormat {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" | "graphviz" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            "json" => Ok(Self::Json),
            other => Err(NesError::ValidationError(format!(
                "unsupported export format '{}' (expected dot, mermaid or json)",
                other
            ))),
        }
    }
}

/// Render `subgraph` in `format`.
pub fn render(subgraph: &Subgraph, format: ExportFormat) -> Result<String, NesError> {
    match format {
        ExportFormat::Dot => Ok(to_dot(subgraph)),
        ExportFormat::Mermaid => Ok(to_mermaid(subgraph)),
        ExportFormat::Json => to_json(subgraph),
    }
}

// =============================================================================
// DOT
// =============================================================================

fn escape_dot(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[must_use]
pub fn to_dot(subgraph: &Subgraph) -> String {
    let mut out = String::from("digraph G {\n  rankdir=LR;\n  node [shape=box];\n\n");
    for (id, _) in &subgraph.nodes {
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\"];",
            id,
            escape_dot(&subgraph.label(id))
        );
    }
    out.push('\n');
    for edge in &subgraph.edges {
        let rel = &edge.relationship;
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [label=\"{}\"];",
            rel.source, rel.target, rel.kind
        );
    }
    out.push('}');
    out
}

// =============================================================================
// MERMAID
// =============================================================================

/// Mermaid node ids cannot contain `:` or `/`, so nodes become `N0`, `N1`, ...
#[must_use]
pub fn to_mermaid(subgraph: &Subgraph) -> String {
    let mut out = String::from("graph LR\n");
    for (idx, (id, _)) in subgraph.nodes.iter().enumerate() {
        let label = subgraph.label(id).replace('"', "#quot;");
        let _ = writeln!(out, "  N{}[\"{}\"]", idx, label);
    }
    let index_of = |id| subgraph.nodes.iter().position(|(node, _)| node == id);
    for edge in &subgraph.edges {
        let rel = &edge.relationship;
        if let (Some(from), Some(to)) = (index_of(&rel.source), index_of(&rel.target)) {
            let _ = writeln!(out, "  N{} -->|{}| N{}", from, rel.kind, to);
        }
    }
    out.truncate(out.trim_end().len());
    out
}

// =============================================================================
// JSON
// =============================================================================

#[derive(Serialize)]
struct JsonNode {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    sub_type: Option<String>,
}

#[derive(Serialize)]
struct JsonEdge {
    source: String,
    target: String,
    #[serde(rename = "type")]
    kind: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Serialize)]
struct JsonGraph {
    nodes: Vec<JsonNode>,
    edges: Vec<JsonEdge>,
}

pub fn to_json(subgraph: &Subgraph) -> Result<String, NesError> {
    let nodes = subgraph
        .nodes
        .iter()
        .map(|(id, entity)| JsonNode {
            id: id.to_string(),
            name: subgraph.label(id),
            kind: entity.as_ref().map(|e| e.kind.to_string()),
            sub_type: entity
                .as_ref()
                .and_then(|e| e.sub_kind)
                .map(|s| s.as_str().to_string()),
        })
        .collect();
    let edges = subgraph
        .edges
        .iter()
        .map(|edge| {
            let rel = &edge.relationship;
            JsonEdge {
                source: rel.source.to_string(),
                target: rel.target.to_string(),
                kind: rel.kind.to_string(),
                start_date: rel.start_date.map(|d| d.to_string()),
                end_date: rel.end_date.map(|d| d.to_string()),
            }
        })
        .collect();
    serde_json::to_string_pretty(&JsonGraph { nodes, edges })
        .map_err(|e| NesError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TraversalEdge;
    use crate::types::{
        AuthorRef, Entity, EntityDraft, EntityId, EntityKind, Name, Relationship,
        RelationshipDraft, RelationshipKind, VersionSubject, VersionSummary,
    };
    use chrono::{NaiveDate, Utc};

    fn summary(id: &str, subject: VersionSubject) -> VersionSummary {
        VersionSummary {
            entity_or_relationship_id: id.to_string(),
            subject,
            version_number: 1,
            author: AuthorRef {
                slug: "tester".to_string(),
                name: None,
            },
            change_description: "initial".to_string(),
            created_at: Utc::now(),
        }
    }

    fn sample() -> Subgraph {
        let draft = EntityDraft::new(
            EntityKind::Person,
            None,
            "ram-poudel",
            vec![Name::primary("Ram \"RP\" Poudel")],
        );
        let ram = Entity::from_draft(
            draft.clone(),
            summary(draft.id().as_str(), VersionSubject::Entity),
            Utc::now(),
        );
        let ghost = EntityId::new(EntityKind::Person, None, "ghost-person");
        let rel_draft = RelationshipDraft::new(ram.id(), ghost.clone(), RelationshipKind::Supervises)
            .between(NaiveDate::from_ymd_opt(2020, 1, 1), None);
        let rel = Relationship::from_draft(
            rel_draft.clone(),
            summary(rel_draft.id().as_str(), VersionSubject::Relationship),
            Utc::now(),
        );
        Subgraph {
            center: ram.id(),
            nodes: vec![(ram.id(), Some(ram)), (ghost, None)],
            edges: vec![TraversalEdge {
                relationship: rel,
                depth: 1,
            }],
        }
    }

    #[test]
    fn dot_output_shape() {
        let dot = to_dot(&sample());
        assert!(dot.starts_with("digraph G {\n  rankdir=LR;\n  node [shape=box];"));
        assert!(dot.contains(r#""entity:person/ram-poudel" [label="Ram \"RP\" Poudel"];"#));
        assert!(dot.contains(r#""entity:person/ghost-person" [label="entity:person/ghost-person"];"#));
        assert!(dot.contains(
            r#""entity:person/ram-poudel" -> "entity:person/ghost-person" [label="SUPERVISES"];"#
        ));
        assert!(dot.ends_with('}'));
    }

    #[test]
    fn mermaid_uses_synthetic_ids() {
        let mermaid = to_mermaid(&sample());
        let lines: Vec<&str> = mermaid.lines().collect();
        assert_eq!(lines[0], "graph LR");
        assert!(lines[1].starts_with("  N0[\""));
        assert_eq!(lines[3], "  N0 -->|SUPERVISES| N1");
    }

    #[test]
    fn json_document() {
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&sample()).expect("render")).expect("parse");
        assert_eq!(json["nodes"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["nodes"][0]["type"], "person");
        assert!(json["nodes"][1]["type"].is_null());
        assert_eq!(json["edges"][0]["type"], "SUPERVISES");
        assert_eq!(json["edges"][0]["start_date"], "2020-01-01");
        assert!(json["edges"][0]["end_date"].is_null());
    }

    #[test]
    fn format_parsing() {
        assert_eq!("DOT".parse::<ExportFormat>().ok(), Some(ExportFormat::Dot));
        assert_eq!("mermaid".parse::<ExportFormat>().ok(), Some(ExportFormat::Mermaid));
        assert!("svg".parse::<ExportFormat>().is_err());
    }
}
