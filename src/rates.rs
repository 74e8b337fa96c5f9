use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{FeeError, Result};
use crate::models::RateEntry;
use crate::table::{normalize_header, Table};

const PROCESSOR_COLUMN: &str = "Processor";

/// Accepted header spellings for each coefficient, already normalized.
const DISCOUNT_HEADERS: &[&str] = &["discount_fees", "discount_fee", "discount_fee_rate", "discount_rate"];
const ATTEMPT_HEADERS: &[&str] = &["attempt_fees", "attempt_fee", "attempt_fee_rate", "auth_fee"];
const CHARGEBACK_HEADERS: &[&str] = &["cb_fee", "cb_fees", "chargeback_fee", "chargeback_fees"];
const VISA_ALERT_HEADERS: &[&str] = &["visa_alert_due", "visa_alert", "visa_alert_fee", "visa_alert_fees"];

#[derive(Debug, Clone, PartialEq)]
pub struct RateCardOptions {
    pub fallback_processor: String,
    pub fallback_chargeback_fee: f64,
}

impl Default for RateCardOptions {
    fn default() -> Self {
        Self {
            fallback_processor: "merchant industries".to_string(),
            fallback_chargeback_fee: 35.0,
        }
    }
}

/// Processor key (lowercase) → fee coefficients. Built once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCard {
    entries: BTreeMap<String, RateEntry>,
    fallback_key: String,
}

impl RateCard {
    pub fn load(path: &Path, options: &RateCardOptions) -> Result<Self> {
        let table = Table::load(path)?;
        Self::from_table(&table, options)
    }

    pub fn from_table(table: &Table, options: &RateCardOptions) -> Result<Self> {
        let header_idx = table.find_header_row(PROCESSOR_COLUMN).ok_or_else(|| {
            FeeError::MalformedRateCard {
                row: 0,
                column: PROCESSOR_COLUMN.to_string(),
                detail: "no header row with a processor column".to_string(),
            }
        })?;
        let header: Vec<String> = table.rows[header_idx].iter().map(|h| normalize_header(h)).collect();
        let header_row = header_idx + 1;

        let find = |names: &[&str], label: &str| -> Result<usize> {
            header
                .iter()
                .position(|h| names.contains(&h.as_str()))
                .ok_or_else(|| FeeError::MalformedRateCard {
                    row: header_row,
                    column: label.to_string(),
                    detail: "column not found".to_string(),
                })
        };
        let idx_processor = find(&["processor"], PROCESSOR_COLUMN)?;
        let idx_discount = find(DISCOUNT_HEADERS, "Discount Fees")?;
        let idx_attempt = find(ATTEMPT_HEADERS, "Attempt Fees")?;
        let idx_chargeback = find(CHARGEBACK_HEADERS, "CB Fee")?;
        let idx_visa = find(VISA_ALERT_HEADERS, "Visa Alert Due")?;

        let mut entries = BTreeMap::new();
        for (offset, record) in table.rows[header_idx + 1..].iter().enumerate() {
            let row_num = header_row + offset + 1;
            let cell = |idx: usize| record.get(idx).map(|s| s.trim()).unwrap_or("");
            let processor = cell(idx_processor);
            if processor.is_empty() {
                // Sub-header and spacer rows carry no processor
                continue;
            }
            let coefficient = |idx: usize| parse_coefficient(cell(idx), row_num, &table.rows[header_idx], idx);
            let entry = RateEntry {
                discount_fee_rate: coefficient(idx_discount)?,
                attempt_fee_rate: coefficient(idx_attempt)?,
                chargeback_fee: coefficient(idx_chargeback)?,
                visa_alert_fee: coefficient(idx_visa)?,
            };
            let key = processor.to_lowercase();
            if entries.insert(key.clone(), entry).is_some() {
                return Err(FeeError::MalformedRateCard {
                    row: row_num,
                    column: PROCESSOR_COLUMN.to_string(),
                    detail: format!("duplicate processor '{key}'"),
                });
            }
        }

        let fallback_key = options.fallback_processor.trim().to_lowercase();
        entries.entry(fallback_key.clone()).or_insert(RateEntry {
            chargeback_fee: options.fallback_chargeback_fee,
            ..RateEntry::default()
        });

        tracing::info!(processors = entries.len(), "rate card loaded");
        Ok(Self {
            entries,
            fallback_key,
        })
    }

    /// Exact lookup. Never substitutes the fallback entry.
    pub fn lookup(&self, key: &str) -> Option<&RateEntry> {
        self.entries.get(key)
    }

    pub fn fallback(&self) -> &RateEntry {
        // Inserted at construction and never removed
        &self.entries[&self.fallback_key]
    }

    pub fn fallback_key(&self) -> &str {
        &self.fallback_key
    }

    pub fn lookup_or_fallback(&self, key: &str) -> &RateEntry {
        self.lookup(key).unwrap_or_else(|| self.fallback())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Every priced processor needs all four coefficients; a blank cell is as
/// malformed as a non-numeric one.
fn parse_coefficient(raw: &str, row: usize, header: &[String], idx: usize) -> Result<f64> {
    let malformed = |detail: String| FeeError::MalformedRateCard {
        row,
        column: header.get(idx).map(|h| h.trim().to_string()).unwrap_or_default(),
        detail,
    };
    if raw.is_empty() {
        return Err(malformed("empty coefficient".to_string()));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(format!("'{raw}' is not a number"))),
    }
}
