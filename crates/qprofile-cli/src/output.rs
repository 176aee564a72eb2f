use qprofile_core::{ActiveRule, ActiveRuleChange};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

pub fn format_params(params: &std::collections::BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// One line per change, or `no changes`.
pub fn print_changes(changes: &[ActiveRuleChange]) {
    if changes.is_empty() {
        println!("no changes");
        return;
    }
    for change in changes {
        let detail = change
            .after()
            .map(|s| format!(" {} {}", s.severity, s.inheritance))
            .unwrap_or_default();
        println!("{:<11} {}{detail}", change.kind().to_string(), change.key());
    }
}

pub fn print_rules(rules: &[ActiveRule]) {
    if rules.is_empty() {
        println!("No active rules.");
        return;
    }
    let rows = rules
        .iter()
        .map(|r| {
            vec![
                r.key.profile.to_string(),
                r.key.rule.to_string(),
                r.severity.to_string(),
                r.inheritance.to_string(),
                format_params(&r.params),
            ]
        })
        .collect();
    print_table(&["PROFILE", "RULE", "SEVERITY", "INHERITANCE", "PARAMS"], rows);
}
