//! Markdown summary of a scene.

use crate::element::{Element, ElementKind, NodeContent};
use crate::group::GroupMember;
use crate::scene::Scene;
use std::fmt::Write as _;

fn display_name(element: &Element) -> String {
    if !element.label.trim().is_empty() {
        return element.label.trim().to_string();
    }
    match element.as_node() {
        Some(NodeContent::Text { body }) => body.lines().next().unwrap_or_default().to_string(),
        Some(NodeContent::OrgUnit { title, .. }) => title.clone(),
        Some(NodeContent::Image { alt, .. }) if !alt.is_empty() => alt.clone(),
        Some(content) => format!("Untitled {}", content.type_name()),
        None => "Untitled edge".to_string(),
    }
}

fn node_details(content: &NodeContent) -> String {
    match content {
        NodeContent::Flow {
            step,
            status,
            assignee,
        } => {
            let mut parts = vec![format!("{step:?}").to_lowercase()];
            if let Some(status) = status {
                parts.push(format!("{status:?}").to_lowercase());
            }
            if let Some(assignee) = assignee {
                parts.push(format!("@{assignee}"));
            }
            parts.join(", ")
        }
        NodeContent::MindMap { level, tags, .. } => {
            let mut s = format!("level {level}");
            if !tags.is_empty() {
                let _ = write!(s, ", tags: {}", tags.join(" "));
            }
            s
        }
        NodeContent::OrgUnit { department, .. } if !department.is_empty() => department.clone(),
        NodeContent::Chart { chart, series } => {
            format!("{} chart, {} series", format!("{chart:?}").to_lowercase(), series.len())
        }
        NodeContent::Table { rows, .. } => format!("table, {} rows", rows.len()),
        other => other.type_name().to_string(),
    }
}

/// Render a heading, node list, connection list and group list.
pub(crate) fn render_markdown(scene: &Scene, include_metadata: bool) -> String {
    let mut out = String::new();
    let title = if scene.meta.title.trim().is_empty() {
        "Untitled diagram"
    } else {
        scene.meta.title.trim()
    };
    let _ = writeln!(out, "# {title}\n");

    let ordered = scene.elements_ordered();
    let nodes: Vec<&Element> = ordered.iter().copied().filter(|e| e.is_node()).collect();
    let edges: Vec<&Element> = ordered.iter().copied().filter(|e| e.is_edge()).collect();

    if include_metadata {
        let _ = writeln!(out, "| Property | Value |");
        let _ = writeln!(out, "| --- | --- |");
        let _ = writeln!(out, "| Type | {:?} |", scene.kind);
        let _ = writeln!(out, "| Nodes | {} |", nodes.len());
        let _ = writeln!(out, "| Connections | {} |", edges.len());
        let _ = writeln!(out, "| Groups | {} |", scene.groups().count());
        if !scene.meta.tags.is_empty() {
            let _ = writeln!(out, "| Tags | {} |", scene.meta.tags.join(", "));
        }
        out.push('\n');
    }

    if !nodes.is_empty() {
        out.push_str("## Nodes\n\n");
        for node in &nodes {
            if let ElementKind::Node(content) = &node.kind {
                let _ = writeln!(out, "- **{}** ({})", display_name(node), node_details(content));
            }
        }
        out.push('\n');
    }

    if !edges.is_empty() {
        out.push_str("## Connections\n\n");
        for edge in &edges {
            let Some(data) = edge.as_edge() else { continue };
            let name = |id| {
                scene
                    .element(id)
                    .map(display_name)
                    .unwrap_or_else(|| "?".to_string())
            };
            let _ = write!(out, "- {} → {}", name(data.source), name(data.target));
            if !edge.label.is_empty() {
                let _ = write!(out, " ({})", edge.label);
            }
            out.push('\n');
        }
        out.push('\n');
    }

    let groups = scene.groups_ordered();
    if !groups.is_empty() {
        out.push_str("## Groups\n\n");
        for group in groups {
            let members: Vec<String> = group
                .members
                .iter()
                .map(|m| match m {
                    GroupMember::Element(id) => scene
                        .element(*id)
                        .map(display_name)
                        .unwrap_or_else(|| "?".to_string()),
                    GroupMember::Group(id) => scene
                        .group(*id)
                        .map(|g| format!("group {}", g.name))
                        .unwrap_or_else(|| "?".to_string()),
                })
                .collect();
            let name = if group.name.is_empty() { "Unnamed" } else { group.name.as_str() };
            let _ = writeln!(out, "- {}: {}", name, members.join(", "));
        }
    }
    out
}
