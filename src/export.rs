//! Export of a session's node chain as JSON or Markdown.

use crate::errors::{AppError, AppResult};
use crate::models::{NodeKind, NodeRecord};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(AppError::InvalidInput(format!("Unsupported export format: {}", other))),
        }
    }
}

/// One node as written to a JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedNode {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl From<&NodeRecord> for ExportedNode {
    fn from(node: &NodeRecord) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            content: node.content.clone(),
            kind: node.kind,
            created_at: node.created_at.timestamp_millis(),
        }
    }
}

pub fn render(nodes: &[NodeRecord], format: ExportFormat) -> AppResult<String> {
    match format {
        ExportFormat::Json => render_json(nodes),
        ExportFormat::Markdown => Ok(render_markdown(nodes)),
    }
}

pub fn render_json(nodes: &[NodeRecord]) -> AppResult<String> {
    let exported = nodes.iter().map(ExportedNode::from).collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&exported)?)
}

pub fn render_markdown(nodes: &[NodeRecord]) -> String {
    nodes
        .iter()
        .map(|node| format!("## {}\n\n{}\n", node.title, node.content))
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::{render_json, render_markdown, ExportFormat, ExportedNode};
    use crate::models::{NodeKind, NodeRecord};
    use chrono::{TimeZone, Utc};

    fn node(id: &str, title: &str, content: &str, kind: NodeKind) -> NodeRecord {
        NodeRecord {
            id: id.to_string(),
            session_id: "session-1".to_string(),
            title: title.to_string(),
            content: content.to_string(),
            kind,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_123).single().expect("timestamp"),
        }
    }

    #[test]
    fn json_export_parses_back_with_same_nodes() {
        let nodes = vec![
            node("a", "Problem", "Soil dries out", NodeKind::Initial),
            node("b", "Solution", "Line \"quoted\"\nand multi-line", NodeKind::Expansion),
            node("c", "Blueprint", "Ünïcødé 🌱", NodeKind::Blueprint),
        ];
        let rendered = render_json(&nodes).expect("render");
        let parsed: Vec<ExportedNode> = serde_json::from_str(&rendered).expect("parse");

        assert_eq!(parsed.len(), nodes.len());
        for (exported, original) in parsed.iter().zip(&nodes) {
            assert_eq!(exported.title, original.title);
            assert_eq!(exported.content, original.content);
        }
        assert_eq!(parsed[1].kind, NodeKind::Expansion);
        assert_eq!(parsed[0].created_at, 1_700_000_000_123);
    }

    #[test]
    fn json_export_uses_type_and_created_at_keys() {
        let rendered = render_json(&[node("a", "T", "C", NodeKind::User)]).expect("render");
        let value: serde_json::Value = serde_json::from_str(&rendered).expect("parse");
        assert_eq!(value[0]["type"], "user");
        assert!(value[0]["createdAt"].is_i64());
        assert!(rendered.contains("\n  "));
    }

    #[test]
    fn markdown_joins_sections_with_rules() {
        let rendered = render_markdown(&[
            node("a", "One", "first", NodeKind::Initial),
            node("b", "Two", "second", NodeKind::User),
        ]);
        assert_eq!(rendered, "## One\n\nfirst\n\n---\n\n## Two\n\nsecond\n");
        assert_eq!(render_markdown(&[]), "");
    }

    #[test]
    fn format_parsing_accepts_aliases() {
        assert_eq!("md".parse::<ExportFormat>().expect("md"), ExportFormat::Markdown);
        assert_eq!("Markdown".parse::<ExportFormat>().expect("markdown"), ExportFormat::Markdown);
        assert_eq!("JSON".parse::<ExportFormat>().expect("json"), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
