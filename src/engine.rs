//! Fee reconciliation pipeline.
//!
//! Raw export table → excluded-row filter → column projection → numeric
//! cleaning → row retention → row fees → processor and merchant-group totals.
//! Everything here is a pure transform over in-memory data; file access
//! happens in the callers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FeeError, Result};
use crate::models::{
    CoercionWarning, FeeBreakdown, FeeRow, FilterStats, GroupTotal, GroupTotals, RateEntry,
    TransactionRow, UnresolvedProcessor,
};
use crate::rates::RateCard;
use crate::table::{normalize_header, Table};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What an empty `Processed` cell becomes. Charges, chargebacks and alerts
/// always read empty as zero; processed volume historically did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyProcessed {
    #[default]
    Missing,
    Zero,
}

/// How rows whose processor has no rate card entry are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownProcessorPolicy {
    /// Leave the rows out of every table and report the keys.
    #[default]
    Exclude,
    /// Fail the run on the first unknown key.
    Abort,
    /// Price the rows with the fallback entry and report the keys.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Merchant groups dropped by exact match.
    pub excluded_merchant_groups: BTreeSet<String>,
    /// Processors dropped by exact match.
    pub excluded_processors: BTreeSet<String>,
    /// Processors dropped when their name contains any of these (case-sensitive).
    pub excluded_processor_substrings: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            excluded_merchant_groups: BTreeSet::from(["Sale Shield".to_string(), "SaleShield".to_string()]),
            excluded_processors: BTreeSet::from(["EMS".to_string()]),
            excluded_processor_substrings: vec!["FlexFactor".to_string(), "Stripe".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineOptions {
    pub filters: FilterSettings,
    pub empty_processed: EmptyProcessed,
    pub unknown_processor: UnknownProcessorPolicy,
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Processor,
    CardType,
    MerchantGroup,
    AttemptedCapturedCharges,
    Processed,
    Chargebacks,
    Alerts,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Processor,
        Column::CardType,
        Column::MerchantGroup,
        Column::AttemptedCapturedCharges,
        Column::Processed,
        Column::Chargebacks,
        Column::Alerts,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Processor => "Processor",
            Self::CardType => "Card Type",
            Self::MerchantGroup => "Merchant Group",
            Self::AttemptedCapturedCharges => "Attempted Captured Charges",
            Self::Processed => "Processed",
            Self::Chargebacks => "Chargebacks",
            Self::Alerts => "Alerts",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Processor => "processor",
            Self::CardType => "card_type",
            Self::MerchantGroup => "merchant_group",
            Self::AttemptedCapturedCharges => "attempted_captured_charges",
            Self::Processed => "processed",
            Self::Chargebacks => "chargebacks",
            Self::Alerts => "alerts",
        }
    }
}

/// Position of each required column in the export header.
struct ColumnMap([usize; 7]);

impl ColumnMap {
    fn locate(header: &[String]) -> Result<Self> {
        let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
        let mut idx = [0usize; 7];
        for (slot, column) in idx.iter_mut().zip(Column::ALL) {
            *slot = normalized
                .iter()
                .position(|h| h == column.key())
                .ok_or_else(|| FeeError::MissingField(column.label().to_string()))?;
        }
        Ok(Self(idx))
    }

    fn get<'a>(&self, record: &'a [String], column: Column) -> &'a str {
        let pos = Column::ALL.iter().position(|c| *c == column).unwrap_or(0);
        record.get(self.0[pos]).map(|s| s.as_str()).unwrap_or("")
    }
}

/// The seven retained source fields of one row, still as text.
#[derive(Debug, Clone)]
struct ProjectedRow<'a> {
    source_row: usize,
    processor: &'a str,
    card_type: &'a str,
    merchant_group: &'a str,
    attempted_captured_charges: &'a str,
    processed: &'a str,
    chargebacks: &'a str,
    alerts: &'a str,
}

/// Empty, or the literal `nan` that spreadsheet tools write for blank cells.
pub fn is_missing(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("nan")
}

// ---------------------------------------------------------------------------
// Numeric cleaning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cleaned {
    Value(f64),
    /// Nothing left after stripping.
    Empty,
    /// Digits and dots remained but did not form a number, e.g. `1.2.3`.
    Unparseable,
}

/// Strip everything that is not a digit or `.` and parse what is left.
/// `"$1,234.56"` → `1234.56`. Signs are stripped along with everything else.
pub fn clean_numeric(raw: &str) -> Cleaned {
    static NON_NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NON_NUMERIC.get_or_init(|| Regex::new(r"[^0-9.]").expect("static pattern"));
    let stripped = re.replace_all(raw, "");
    if stripped.is_empty() {
        return Cleaned::Empty;
    }
    match stripped.parse::<f64>() {
        Ok(v) => Cleaned::Value(v),
        Err(_) => Cleaned::Unparseable,
    }
}

struct Cleaner<'w> {
    empty_processed: EmptyProcessed,
    warnings: &'w mut Vec<CoercionWarning>,
}

impl Cleaner<'_> {
    fn clean(&mut self, source_row: usize, column: Column, raw: &str) -> Option<f64> {
        match clean_numeric(raw) {
            Cleaned::Value(v) => Some(v),
            Cleaned::Empty if raw.trim().is_empty() => None,
            _ => {
                tracing::warn!(row = source_row, field = column.label(), raw, "numeric value coerced");
                self.warnings.push(CoercionWarning {
                    source_row,
                    field: column.label().to_string(),
                    raw: raw.to_string(),
                });
                None
            }
        }
    }

    fn count(&mut self, source_row: usize, column: Column, raw: &str) -> f64 {
        self.clean(source_row, column, raw).unwrap_or(0.0)
    }

    fn processed(&mut self, source_row: usize, raw: &str) -> Option<f64> {
        match (self.clean(source_row, Column::Processed, raw), self.empty_processed) {
            (Some(v), _) => Some(v),
            (None, EmptyProcessed::Zero) => Some(0.0),
            (None, EmptyProcessed::Missing) => None,
        }
    }

    fn row(&mut self, raw: &ProjectedRow<'_>) -> TransactionRow {
        let r = raw.source_row;
        TransactionRow {
            source_row: r,
            processor: raw.processor.trim().to_string(),
            card_type: raw.card_type.trim().to_string(),
            merchant_group: raw.merchant_group.trim().to_string(),
            attempted_captured_charges: self.count(r, Column::AttemptedCapturedCharges, raw.attempted_captured_charges),
            processed: self.processed(r, raw.processed),
            chargebacks: self.count(r, Column::Chargebacks, raw.chargebacks),
            alerts: self.count(r, Column::Alerts, raw.alerts),
        }
    }
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Row-level fee columns. The total is the plain sum of the four parts.
pub fn compute_fees(row: &TransactionRow, rate: &RateEntry) -> FeeBreakdown {
    let disc_due = row.processed.map(|p| rate.discount_fee_rate * p);
    let auth_due = rate.attempt_fee_rate * row.attempted_captured_charges;
    let cb_due = rate.chargeback_fee * row.chargebacks;
    let visa_alert_due = if row.is_visa() {
        rate.visa_alert_fee * row.alerts
    } else {
        0.0
    };
    FeeBreakdown {
        disc_due,
        auth_due,
        cb_due,
        visa_alert_due,
        total_due: disc_due.map(|d| d + auth_due + cb_due + visa_alert_due),
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub detail: Vec<FeeRow>,
    pub by_processor: GroupTotals,
    pub by_merchant_group: GroupTotals,
    /// Processors left out of every table for lack of a rate card entry.
    pub unresolved: Vec<UnresolvedProcessor>,
    /// Processors priced with the fallback entry.
    pub fallback_priced: Vec<UnresolvedProcessor>,
    pub warnings: Vec<CoercionWarning>,
    pub stats: FilterStats,
}

impl Reconciliation {
    pub fn grand_total(&self) -> f64 {
        self.by_processor.total
    }

    /// Rows whose total is missing because processed volume was missing.
    pub fn unpriced_rows(&self) -> usize {
        self.detail.iter().filter(|r| r.fees.total_due.is_none()).count()
    }

    pub fn processed_volume(&self) -> f64 {
        self.detail.iter().filter_map(|r| r.row.processed).sum()
    }

    /// Processed volume per dollar of fees, a quick sanity figure.
    pub fn volume_to_fee_ratio(&self) -> Option<f64> {
        let total = self.grand_total();
        (total != 0.0).then(|| self.processed_volume() / total)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub fn reconcile(export: &Table, rates: &RateCard, options: &EngineOptions) -> Result<Reconciliation> {
    let Some((header, body)) = export.rows.split_first() else {
        return Err(FeeError::MissingField(Column::Processor.label().to_string()));
    };
    let columns = ColumnMap::locate(header)?;
    let mut stats = FilterStats {
        input_rows: body.len(),
        ..FilterStats::default()
    };

    let projected = exclude_and_project(body, &columns, &options.filters, &mut stats);

    let mut warnings = Vec::new();
    let mut cleaner = Cleaner {
        empty_processed: options.empty_processed,
        warnings: &mut warnings,
    };
    let cleaned: Vec<TransactionRow> = projected.iter().map(|r| cleaner.row(r)).collect();

    let before = cleaned.len();
    let rows: Vec<TransactionRow> = cleaned.into_iter().filter(|r| !is_missing(&r.processor)).collect();
    stats.missing_processor = before - rows.len();
    stats.retained_rows = rows.len();

    let (detail, unresolved, fallback_priced) = price_rows(rows, rates, options.unknown_processor)?;

    let grand_total: f64 = detail.iter().filter_map(|r| r.fees.total_due).sum();
    let by_processor = aggregate(&detail, grand_total, |r| &r.row.processor);
    let by_merchant_group = aggregate(&detail, grand_total, |r| &r.row.merchant_group);

    tracing::info!(
        input = stats.input_rows,
        retained = stats.retained_rows,
        priced = detail.len(),
        unresolved = unresolved.len(),
        warnings = warnings.len(),
        total = grand_total,
        "reconciliation complete"
    );

    Ok(Reconciliation {
        detail,
        by_processor,
        by_merchant_group,
        unresolved,
        fallback_priced,
        warnings,
        stats,
    })
}

fn exclude_and_project<'a>(
    body: &'a [Vec<String>],
    columns: &ColumnMap,
    filters: &FilterSettings,
    stats: &mut FilterStats,
) -> Vec<ProjectedRow<'a>> {
    let mut projected = Vec::new();
    for (i, record) in body.iter().enumerate() {
        // Filters and grouping both see the trimmed labels
        let processor = columns.get(record, Column::Processor).trim();
        let merchant_group = columns.get(record, Column::MerchantGroup).trim();
        if filters.excluded_merchant_groups.contains(merchant_group) {
            stats.excluded_merchant_group += 1;
            continue;
        }
        if filters.excluded_processors.contains(processor) {
            stats.excluded_processor += 1;
            continue;
        }
        if is_missing(merchant_group) {
            stats.empty_merchant_group += 1;
            continue;
        }
        projected.push(ProjectedRow {
            // +1 for the header, +1 for 1-based numbering
            source_row: i + 2,
            processor,
            card_type: columns.get(record, Column::CardType),
            merchant_group,
            attempted_captured_charges: columns.get(record, Column::AttemptedCapturedCharges),
            processed: columns.get(record, Column::Processed),
            chargebacks: columns.get(record, Column::Chargebacks),
            alerts: columns.get(record, Column::Alerts),
        });
    }

    // Second pass by name rather than identity
    let before = projected.len();
    projected.retain(|r| {
        !filters
            .excluded_processor_substrings
            .iter()
            .any(|s| !s.is_empty() && r.processor.contains(s.as_str()))
    });
    stats.excluded_processor_substring = before - projected.len();
    projected
}

type Priced = (Vec<FeeRow>, Vec<UnresolvedProcessor>, Vec<UnresolvedProcessor>);

fn price_rows(rows: Vec<TransactionRow>, rates: &RateCard, policy: UnknownProcessorPolicy) -> Result<Priced> {
    let mut detail = Vec::with_capacity(rows.len());
    let mut unresolved: BTreeMap<String, usize> = BTreeMap::new();
    let mut fell_back: BTreeMap<String, usize> = BTreeMap::new();

    for row in rows {
        let key = row.processor_key();
        let rate = match (rates.lookup(&key), policy) {
            (Some(rate), _) => rate,
            (None, UnknownProcessorPolicy::Abort) => return Err(FeeError::UnknownProcessor(key)),
            (None, UnknownProcessorPolicy::Exclude) => {
                *unresolved.entry(key).or_default() += 1;
                continue;
            }
            (None, UnknownProcessorPolicy::Fallback) => {
                let rate = rates.lookup_or_fallback(&key);
                *fell_back.entry(key).or_default() += 1;
                rate
            }
        };
        let fees = compute_fees(&row, rate);
        tracing::debug!(row = row.source_row, processor = %row.processor, total = ?fees.total_due, "row priced");
        detail.push(FeeRow { row, fees });
    }

    for (key, count) in &unresolved {
        tracing::warn!(processor = %key, rows = count, "no rate card entry, rows excluded");
    }
    for (key, count) in &fell_back {
        tracing::warn!(processor = %key, rows = count, "no rate card entry, priced with fallback");
    }
    Ok((detail, into_list(unresolved), into_list(fell_back)))
}

fn into_list(map: BTreeMap<String, usize>) -> Vec<UnresolvedProcessor> {
    map.into_iter()
        .map(|(key, rows)| UnresolvedProcessor { key, rows })
        .collect()
}

/// Sum `total_due` per key in ascending key order. Missing totals add
/// nothing; missing keys are dropped from the groups.
fn aggregate<F>(rows: &[FeeRow], grand_total: f64, key: F) -> GroupTotals
where
    F: Fn(&FeeRow) -> &String,
{
    let mut groups: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        let k = key(row).as_str();
        if is_missing(k) {
            tracing::warn!(row = row.row.source_row, "row without group key left out of grouping");
            continue;
        }
        *groups.entry(k).or_default() += row.fees.total_due.unwrap_or(0.0);
    }
    let totals = GroupTotals {
        groups: groups
            .into_iter()
            .map(|(key, total)| GroupTotal {
                key: key.to_string(),
                total,
            })
            .collect(),
        total: grand_total,
    };
    if totals.shadows_total() {
        tracing::warn!(
            label = GroupTotals::TOTAL_LABEL,
            "a group shares its name with the grand total row"
        );
    }
    totals
}
