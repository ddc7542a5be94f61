//! Prompt builders for the AI operations.

use crate::models::NodeDraft;

/// Keeps at most `limit` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

pub fn generate_next_prompt(nodes: &[NodeDraft]) -> String {
    let history = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| format!("Node {} ({}):\n{}\n---", index + 1, node.title, node.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a sequential thinking engine called \"Ideanodes\".
Analyze the following progression of ideas (Nodes).
Your task is to generate the LOGICAL NEXT NODE in this sequence.

If the previous nodes are defining a problem, propose a solution.
If they are a solution, propose a technical implementation.
If they are an implementation, propose a blueprint or summary.

Current Idea Sequence:
{history}

Generate the Title and Content for the next node.
Return JSON format."
    )
}

pub fn remix_prompt(nodes: &[NodeDraft], topic: &str, anchor_limit: usize) -> String {
    let anchor = nodes
        .first()
        .map(|node| truncate_chars(&node.content, anchor_limit))
        .unwrap_or_default();
    let structure = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            format!(
                "Original Node {} Title: \"{}\"\nContent:\n{}\n---",
                index + 1,
                node.title,
                node.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an Expert Solutions Architect and Lateral Thinker.
Your goal is to \"Remix\" a thought sequence to a new domain.

CORE TECHNOLOGY / METHODOLOGY (Source of Truth):
\"{anchor}...\"

EXISTING BLUEPRINT SEQUENCE:
{structure}

TARGET NEW USE CASE: \"{topic}\"

TASK:
Rewrite the ENTIRE sequence (including the first node) to apply the Core Technology/Methodology to the TARGET NEW USE CASE.

CRITICAL RULES:
1. PRESERVE TECH, ADAPT CONTEXT.
2. ADAPT EVERYTHING.
3. MAINTAIN STRUCTURE & DEPTH.
4. CLEAN & MIRRORED TITLES.
5. OUTPUT FORMAT: Return JSON array of nodes (Title + Content)."
    )
}

pub fn structure_import_prompt(text: &str, limit: usize) -> String {
    let text = truncate_chars(text, limit);
    format!(
        "You are a dumb Text Splitter/Formatter.
INPUT TEXT:
\"\"\"
{text}
\"\"\"
TASK:
Break this text into separate JSON objects (Nodes).
Return JSON format containing an array of nodes (Title + Content)."
    )
}

pub fn session_title_prompt(content: &str) -> String {
    format!(
        "Generate a short, catchy, 3-5 word title for a thought session that starts with this idea:
\"{content}\"

Return JSON with \"title\" field."
    )
}

pub fn node_title_prompt(content: &str) -> String {
    format!(
        "Generate a concise, 2-4 word title for this concept node:
\"{content}\"

Return JSON with \"title\" field."
    )
}
