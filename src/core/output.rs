//! Console rendering helpers for CLI surfaces.
//!
//! User-facing status lines go to stdout, errors and warnings to stderr.
//! Diagnostic logging goes through `tracing` instead.

use colored::Colorize;
use serde_json::{Map, Value};

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

pub fn info(message: &str) {
    println!("{} {}", "▸".bright_cyan(), message);
}

pub fn success(message: &str) {
    println!("{} {}", "✓".bright_green(), message);
}

pub fn warn(message: &str) {
    eprintln!("{} {}", "⚠".bright_yellow(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", "error:".bright_red().bold(), message);
}

pub fn divider() {
    println!("{}", "─".repeat(48).bright_black());
}

/// One row of the `list` table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InstanceRow {
    pub name: String,
    pub distro: String,
    pub date: String,
    pub path: String,
}

fn field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Pick instance records (mappings carrying a `name` sub-key) out of a
/// registry dump, sorted by name.
pub fn instance_rows(records: &Map<String, Value>) -> Vec<InstanceRow> {
    let mut rows: Vec<InstanceRow> = records
        .iter()
        .filter_map(|(path, value)| {
            let map = value.as_object()?;
            map.get("name")?;
            Some(InstanceRow {
                name: field(map, "name"),
                distro: field(map, "distro"),
                date: field(map, "date"),
                path: path.clone(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    rows
}

pub fn render_instance_table(rows: &[InstanceRow]) -> String {
    if rows.is_empty() {
        return "No instances. Run `androsh setup` to create one.\n".to_string();
    }
    let name_w = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(4);
    let distro_w = rows.iter().map(|r| r.distro.len()).max().unwrap_or(0).max(6);
    let date_w = rows.iter().map(|r| r.date.len()).max().unwrap_or(0).max(4);

    let mut out = format!(
        "{:<name_w$}  {:<distro_w$}  {:<date_w$}  PATH\n",
        "NAME", "DISTRO", "DATE"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<name_w$}  {:<distro_w$}  {:<date_w$}  {}\n",
            row.name, row.distro, row.date, row.path
        ));
    }
    out
}
