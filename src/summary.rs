use crate::engine::{is_missing, Reconciliation};
use crate::fmt::money;
use crate::models::{GroupTotals, UnresolvedProcessor};

pub const PROCESSOR_HEADER: &str = "Total EOM fees by Processor:";
pub const MERCHANT_GROUP_HEADER: &str = "Total EOM fees by Corp:";
pub const SEPARATOR: &str = "----------------------------------";

/// The plain-text summary delivered to chat, one entry per line.
pub fn summary_lines(rec: &Reconciliation) -> Vec<String> {
    let mut lines = vec![PROCESSOR_HEADER.to_string()];
    push_groups(&mut lines, &rec.by_processor);
    lines.push(SEPARATOR.to_string());
    lines.push(MERCHANT_GROUP_HEADER.to_string());
    push_groups(&mut lines, &rec.by_merchant_group);

    if !rec.unresolved.is_empty() {
        lines.push(SEPARATOR.to_string());
        lines.push("Excluded (no rate card entry):".to_string());
        push_counts(&mut lines, &rec.unresolved);
    }
    if !rec.fallback_priced.is_empty() {
        lines.push(SEPARATOR.to_string());
        lines.push("Priced with fallback rate:".to_string());
        push_counts(&mut lines, &rec.fallback_priced);
    }
    lines
}

pub fn render_summary(rec: &Reconciliation) -> String {
    summary_lines(rec).join("\n")
}

fn push_groups(lines: &mut Vec<String>, totals: &GroupTotals) {
    for group in totals.rows() {
        if is_missing(&group.key) {
            continue;
        }
        lines.push(format!("{}: {}", group.key, money(group.total)));
    }
}

fn push_counts(lines: &mut Vec<String>, items: &[UnresolvedProcessor]) {
    for item in items {
        let noun = if item.rows == 1 { "row" } else { "rows" };
        lines.push(format!("{}: {} {noun}", item.key, item.rows));
    }
}
