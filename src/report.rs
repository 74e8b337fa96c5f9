use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::engine::Reconciliation;
use crate::error::Result;
use crate::inputs::Inputs;
use crate::models::{CoercionWarning, FilterStats, GroupTotals, UnresolvedProcessor};

pub const DETAIL_FILE: &str = "detail.csv";
pub const PROCESSOR_FILE: &str = "processor_totals.csv";
pub const MERCHANT_GROUP_FILE: &str = "merchant_group_totals.csv";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const MANIFEST_FILE: &str = "manifest.json";

const DETAIL_HEADER: &[&str] = &[
    "processor",
    "card_type",
    "merchant_group",
    "attempted_captured_charges",
    "processed",
    "chargebacks",
    "alerts",
    "disc_due",
    "auth_due",
    "cb_due",
    "visa_alert_due",
    "total_due",
];

pub fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// `<data_dir>/reports/EOM_Report-YYYY-MM-DD`
pub fn default_report_dir(data_dir: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    data_dir.join("reports").join(format!("EOM_Report-{date}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct InputRecord {
    pub path: String,
    pub sha256: String,
}

impl InputRecord {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.display().to_string(),
            sha256: compute_checksum(path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub generated_at: String,
    pub rate_card: InputRecord,
    pub export: InputRecord,
    pub stats: FilterStats,
    pub priced_rows: usize,
    pub unpriced_rows: usize,
    pub grand_total: f64,
    pub processed_volume: f64,
    pub volume_to_fee_ratio: Option<f64>,
    pub unresolved: Vec<UnresolvedProcessor>,
    pub fallback_priced: Vec<UnresolvedProcessor>,
    pub warnings: Vec<CoercionWarning>,
}

impl Manifest {
    pub fn new(inputs: &Inputs, rec: &Reconciliation) -> Result<Self> {
        Ok(Self {
            generated_at: chrono::Local::now().to_rfc3339(),
            rate_card: InputRecord::from_path(&inputs.rate_card)?,
            export: InputRecord::from_path(&inputs.export)?,
            stats: rec.stats,
            priced_rows: rec.detail.len(),
            unpriced_rows: rec.unpriced_rows(),
            grand_total: rec.grand_total(),
            processed_volume: rec.processed_volume(),
            volume_to_fee_ratio: rec.volume_to_fee_ratio(),
            unresolved: rec.unresolved.clone(),
            fallback_priced: rec.fallback_priced.clone(),
            warnings: rec.warnings.clone(),
        })
    }
}

fn number(v: f64) -> String {
    v.to_string()
}

fn opt_number(v: Option<f64>) -> String {
    v.map(number).unwrap_or_default()
}

pub fn detail_csv(rec: &Reconciliation) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(DETAIL_HEADER)?;
    for r in &rec.detail {
        wtr.write_record([
            r.row.processor.clone(),
            r.row.card_type.clone(),
            r.row.merchant_group.clone(),
            number(r.row.attempted_captured_charges),
            opt_number(r.row.processed),
            number(r.row.chargebacks),
            number(r.row.alerts),
            opt_number(r.fees.disc_due),
            number(r.fees.auth_due),
            number(r.fees.cb_due),
            number(r.fees.visa_alert_due),
            opt_number(r.fees.total_due),
        ])?;
    }
    into_bytes(wtr)
}

pub fn totals_csv(key_header: &str, totals: &GroupTotals) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([key_header, "total_due"])?;
    for group in totals.rows() {
        wtr.write_record([group.key, number(group.total)])?;
    }
    into_bytes(wtr)
}

fn into_bytes(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Sibling of `dir` with a fixed suffix, e.g. `.EOM_Report-2025-01-31.staging`.
fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("report directory has no name: {}", dir.display()),
        )
    })?;
    Ok(dir.with_file_name(format!(".{}.{suffix}", name.to_string_lossy())))
}

fn write_all(dir: &Path, artifacts: &[(&str, Vec<u8>)]) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (name, bytes) in artifacts {
        std::fs::write(dir.join(name), bytes)?;
    }
    Ok(())
}

/// Put `staging` where `dir` is. A previous report is moved aside first and
/// restored if the swap fails.
fn swap_into_place(staging: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::rename(staging, dir)?;
        return Ok(());
    }
    let previous = sibling(dir, "previous")?;
    if previous.exists() {
        std::fs::remove_dir_all(&previous)?;
    }
    std::fs::rename(dir, &previous)?;
    if let Err(e) = std::fs::rename(staging, dir) {
        std::fs::rename(&previous, dir)?;
        return Err(e.into());
    }
    std::fs::remove_dir_all(&previous)?;
    Ok(())
}

/// Write `artifacts` into a staging directory beside `dir`, then swap it in.
/// On error the previous report at `dir` is left as it was and the staging
/// directory is removed.
fn publish(dir: &Path, artifacts: &[(&str, Vec<u8>)]) -> Result<()> {
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let staging = sibling(dir, "staging")?;
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }

    let result = write_all(&staging, artifacts).and_then(|()| swap_into_place(&staging, dir));
    if result.is_err() && staging.exists() {
        if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
            tracing::warn!(path = %staging.display(), error = %cleanup, "staging directory left behind");
        }
    }
    result
}

/// Render every artifact first, so an error while rendering touches nothing
/// on disk, then publish them together.
pub fn write_report(dir: &Path, rec: &Reconciliation, summary: &str, manifest: &Manifest) -> Result<PathBuf> {
    let artifacts: Vec<(&str, Vec<u8>)> = vec![
        (DETAIL_FILE, detail_csv(rec)?),
        (PROCESSOR_FILE, totals_csv("processor", &rec.by_processor)?),
        (MERCHANT_GROUP_FILE, totals_csv("merchant_group", &rec.by_merchant_group)?),
        (SUMMARY_FILE, format!("{summary}\n").into_bytes()),
        (MANIFEST_FILE, format!("{}\n", serde_json::to_string_pretty(manifest)?).into_bytes()),
    ];
    publish(dir, &artifacts)?;
    tracing::info!(dir = %dir.display(), "report written");
    Ok(dir.to_path_buf())
}
