//! Output formatting for CLI

use crate::lineage::{ExportFormat, ImpactSet, TraceNode, TraceTree, ValidationReport};
use console::style;
use std::fmt::Display;
use tabled::{settings::Style as TableStyle, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Document format for structured output; `None` for tables.
    pub fn document_format(self) -> Option<ExportFormat> {
        match self {
            OutputFormat::Table => None,
            OutputFormat::Json => Some(ExportFormat::Json),
            OutputFormat::Yaml => Some(ExportFormat::Yaml),
        }
    }
}

#[derive(Tabled)]
struct ImpactRow {
    #[tabled(rename = "Distance")]
    distance: usize,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Node")]
    key: String,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Check")]
    check: &'static str,
    #[tabled(rename = "Result")]
    value: String,
}

/// Renders an upstream trace as an indented tree.
pub fn render_trace(tree: &TraceTree) -> String {
    let mut out = format!(
        "{} {}\n",
        style(&tree.root.key).bold(),
        style(format!("[{}]", tree.root.kind)).dim()
    );
    let count = tree.root.upstream.len();
    for (idx, child) in tree.root.upstream.iter().enumerate() {
        render_trace_node(child, "", idx + 1 == count, &mut out);
    }
    if tree.root.upstream.is_empty() {
        out.push_str(&format!("{}\n", style("(no upstream lineage)").dim()));
    }
    if tree.truncated {
        out.push_str(&format!(
            "{}\n",
            style("Some branches were cut off by the depth limit").yellow()
        ));
    }
    out
}

fn render_trace_node(node: &TraceNode, prefix: &str, last: bool, out: &mut String) {
    let connector = if last { "└── " } else { "├── " };
    let mut line = format!("{}{}{} [{}]", prefix, connector, node.key, node.kind);
    if let Some(relation) = node.relation {
        line.push_str(&format!(" {}", style(relation).dim()));
    }
    if let Some(transformation) = &node.transformation {
        line.push_str(&format!(" {}", style(format!("= {}", transformation)).cyan()));
    }
    if node.seen_before {
        line.push_str(&format!(" {}", style("(seen above)").dim()));
    }
    if node.truncated {
        line.push_str(&format!(" {}", style("(depth limit)").yellow()));
    }
    out.push_str(&line);
    out.push('\n');

    let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
    let count = node.upstream.len();
    for (idx, child) in node.upstream.iter().enumerate() {
        render_trace_node(child, &child_prefix, idx + 1 == count, out);
    }
}

/// Renders an impact set as a table ordered by distance.
pub fn render_impact(impact: &ImpactSet) -> String {
    let mut rows: Vec<ImpactRow> = impact
        .by_kind
        .iter()
        .flat_map(|(kind, entries)| {
            entries.iter().map(move |e| ImpactRow {
                distance: e.distance,
                kind: kind.to_string(),
                key: e.key.clone(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.key.cmp(&b.key)));

    let mut out = format!(
        "Downstream of {}: {} node(s), risk {}\n",
        style(&impact.source).bold(),
        impact.len(),
        style(format!("{:?}", impact.risk_level).to_lowercase()).bold()
    );
    if rows.is_empty() {
        out.push_str(&format!("{}\n", style("No downstream dependents").dim()));
    } else {
        out.push_str(&Table::new(rows).with(TableStyle::rounded()).to_string());
        out.push('\n');
    }
    if impact.truncated {
        out.push_str(&format!(
            "{}\n",
            style("More dependents exist beyond the depth limit").yellow()
        ));
    }
    out
}

/// Renders a validation report as a summary table followed by findings.
pub fn render_validation(report: &ValidationReport) -> String {
    let rows = vec![
        SummaryRow { check: "Nodes", value: report.node_count.to_string() },
        SummaryRow { check: "Edges", value: report.edge_count.to_string() },
        SummaryRow { check: "Datasets", value: report.kind_counts.datasets.to_string() },
        SummaryRow { check: "Fields", value: report.kind_counts.fields.to_string() },
        SummaryRow { check: "Jobs", value: report.kind_counts.jobs.to_string() },
        SummaryRow { check: "Cycles", value: report.cycles.len().to_string() },
        SummaryRow { check: "Orphans", value: report.orphan_nodes.len().to_string() },
        SummaryRow { check: "Dangling edges", value: report.dangling_edges.len().to_string() },
        SummaryRow { check: "Placeholders", value: report.inferred_nodes.len().to_string() },
        SummaryRow { check: "Max depth", value: report.max_depth.to_string() },
    ];
    let mut out = Table::new(rows).with(TableStyle::rounded()).to_string();
    out.push('\n');

    for cycle in &report.cycles {
        let mut path = cycle.clone();
        if let Some(first) = cycle.first() {
            path.push(first.clone());
        }
        out.push_str(&format!("{} {}\n", style("cycle:").red().bold(), path.join(" -> ")));
    }
    for orphan in &report.orphan_nodes {
        out.push_str(&format!("{} {}\n", style("orphan:").yellow(), orphan));
    }
    for edge in &report.dangling_edges {
        out.push_str(&format!(
            "{} {} -[{}]-> {}\n",
            style("dangling:").red(),
            edge.source,
            edge.relation,
            edge.target
        ));
    }
    out
}

/// Renders a path as `a -> b -> c`.
pub fn render_path(path: Option<&[String]>) -> String {
    match path {
        Some(keys) => format!("{} ({} hop(s))", keys.join(" -> "), keys.len().saturating_sub(1)),
        None => style("No lineage path").dim().to_string(),
    }
}

/// One numbered line per upstream path.
pub fn render_paths(paths: &[Vec<String>]) -> String {
    let mut out = String::new();
    for (i, path) in paths.iter().enumerate() {
        out.push_str(&format!("{:>3}. {}\n", i + 1, path.join(" <- ")));
    }
    out.push_str(&format!("{} path(s)\n", paths.len()));
    out
}

/// Success message
pub fn success(msg: impl Display) {
    eprintln!("{} {}", style("✓").green().bold(), msg);
}

/// Warning message
pub fn warning(msg: impl Display) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Error message
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}
