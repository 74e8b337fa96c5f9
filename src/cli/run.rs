use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};
use serde::Serialize;

use crate::cli::{search_dir, RunArgs};
use crate::engine::{reconcile, Reconciliation};
use crate::error::Result;
use crate::fmt::{money, opt_amount};
use crate::inputs::{resolve_inputs, Inputs};
use crate::rates::RateCard;
use crate::report::{default_report_dir, write_report, Manifest};
use crate::settings::{load_settings, shellexpand_path};
use crate::summary::{render_summary, summary_lines};
use crate::table::Table as SourceTable;

#[derive(Serialize)]
struct RunOutput<'a> {
    rate_card: String,
    export: String,
    report_dir: Option<String>,
    grand_total: f64,
    volume_to_fee_ratio: Option<f64>,
    summary: Vec<String>,
    reconciliation: &'a Reconciliation,
}

pub fn run(config: &Path, args: RunArgs) -> Result<()> {
    let settings = load_settings(config)?;
    if let Some(channel) = &args.channel {
        settings.check_channel(channel)?;
    }

    let dir = search_dir(args.dir, &settings.data_dir);
    let inputs = resolve_inputs(
        &dir,
        args.rates,
        args.export,
        &settings.rate_card_patterns,
        &settings.export_patterns,
    )?;

    let rates = RateCard::load(&inputs.rate_card, &settings.rate_card_options())?;
    let export = SourceTable::load(&inputs.export)?;
    let rec = reconcile(&export, &rates, &settings.engine_options())?;
    let summary = render_summary(&rec);

    let report_dir = if args.no_write {
        None
    } else {
        let out = args
            .output
            .unwrap_or_else(|| default_report_dir(&PathBuf::from(shellexpand_path(&settings.data_dir))));
        let manifest = Manifest::new(&inputs, &rec)?;
        Some(write_report(&out, &rec, &summary, &manifest)?)
    };

    if args.json {
        let output = RunOutput {
            rate_card: inputs.rate_card.display().to_string(),
            export: inputs.export.display().to_string(),
            report_dir: report_dir.as_ref().map(|d| d.display().to_string()),
            grand_total: rec.grand_total(),
            volume_to_fee_ratio: rec.volume_to_fee_ratio(),
            summary: summary_lines(&rec),
            reconciliation: &rec,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.detail {
        print_detail(&rec);
        println!();
    }
    println!("{summary}");
    print_diagnostics(&inputs, &rec);
    if let Some(dir) = report_dir {
        println!();
        println!("Report written to {}", dir.display());
    }
    Ok(())
}

fn print_detail(rec: &Reconciliation) {
    let mut table = Table::new();
    table.set_header(vec![
        "Processor",
        "Card Type",
        "Merchant Group",
        "Charges",
        "Processed",
        "CBs",
        "Alerts",
        "Disc Due",
        "Auth Due",
        "CB Due",
        "Alert Due",
        "Total Due",
    ]);
    for r in &rec.detail {
        table.add_row(vec![
            Cell::new(&r.row.processor),
            Cell::new(&r.row.card_type),
            Cell::new(&r.row.merchant_group),
            Cell::new(r.row.attempted_captured_charges),
            Cell::new(opt_amount(r.row.processed)),
            Cell::new(r.row.chargebacks),
            Cell::new(r.row.alerts),
            Cell::new(opt_amount(r.fees.disc_due)),
            Cell::new(format!("{:.2}", r.fees.auth_due)),
            Cell::new(format!("{:.2}", r.fees.cb_due)),
            Cell::new(format!("{:.2}", r.fees.visa_alert_due)),
            Cell::new(opt_amount(r.fees.total_due)),
        ]);
    }
    println!("{table}");
}

/// Counts and warnings go to stderr so stdout stays the deliverable summary.
fn print_diagnostics(inputs: &Inputs, rec: &Reconciliation) {
    let stats = &rec.stats;
    eprintln!(
        "{} {} | {} {}",
        "Rate card:".dimmed(),
        inputs.rate_card.display(),
        "Export:".dimmed(),
        inputs.export.display()
    );
    eprintln!(
        "{} {} in, {} retained, {} priced",
        "Rows:".dimmed(),
        stats.input_rows,
        stats.retained_rows,
        rec.detail.len()
    );
    if let Some(ratio) = rec.volume_to_fee_ratio() {
        eprintln!(
            "{} {} processed / {} fees = {ratio:.2}",
            "Ratio:".dimmed(),
            money(rec.processed_volume()),
            money(rec.grand_total())
        );
    }
    let unpriced = rec.unpriced_rows();
    if unpriced > 0 {
        eprintln!(
            "{}",
            format!("{unpriced} row(s) had no processed volume and carry no total").yellow()
        );
    }
    for (label, totals) in [("processor", &rec.by_processor), ("merchant group", &rec.by_merchant_group)] {
        if totals.shadows_total() {
            eprintln!(
                "{}",
                format!("a {label} named 'Total' sits next to the grand total row").yellow()
            );
        }
    }
    for w in &rec.warnings {
        eprintln!(
            "{}",
            format!("row {}: {} value {:?} treated as empty", w.source_row, w.field, w.raw).yellow()
        );
    }
    for u in &rec.unresolved {
        eprintln!(
            "{}",
            format!("no rate card entry for '{}' ({} rows excluded)", u.key, u.rows).red()
        );
    }
}
