use serde::Serialize;

/// Fee coefficients for one processor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RateEntry {
    pub discount_fee_rate: f64,
    pub attempt_fee_rate: f64,
    pub chargeback_fee: f64,
    pub visa_alert_fee: f64,
}

/// One cleaned row of the transaction export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRow {
    /// 1-based position in the source table, header included.
    pub source_row: usize,
    pub processor: String,
    pub card_type: String,
    pub merchant_group: String,
    pub attempted_captured_charges: f64,
    pub processed: Option<f64>,
    pub chargebacks: f64,
    pub alerts: f64,
}

impl TransactionRow {
    pub fn processor_key(&self) -> String {
        self.processor.trim().to_lowercase()
    }

    pub fn is_visa(&self) -> bool {
        self.card_type.to_lowercase().contains("visa")
    }
}

/// Derived fee columns. `disc_due` and `total_due` are missing when the row
/// had no processed volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeeBreakdown {
    pub disc_due: Option<f64>,
    pub auth_due: f64,
    pub cb_due: f64,
    pub visa_alert_due: f64,
    pub total_due: Option<f64>,
}

/// A transaction row together with its computed fees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRow {
    #[serde(flatten)]
    pub row: TransactionRow,
    #[serde(flatten)]
    pub fees: FeeBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
}

/// Grouped sums plus the grand total that is rendered as the synthetic
/// `Total` row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GroupTotals {
    pub groups: Vec<GroupTotal>,
    pub total: f64,
}

impl GroupTotals {
    pub const TOTAL_LABEL: &'static str = "Total";

    /// Group rows followed by the `Total` row.
    pub fn rows(&self) -> Vec<GroupTotal> {
        let mut rows = self.groups.clone();
        rows.push(GroupTotal {
            key: Self::TOTAL_LABEL.to_string(),
            total: self.total,
        });
        rows
    }

    /// True when a real group is literally named `Total`, so the rendered
    /// table would carry two `Total` rows.
    pub fn shadows_total(&self) -> bool {
        self.groups.iter().any(|g| g.key == Self::TOTAL_LABEL)
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<f64> {
        if key == Self::TOTAL_LABEL {
            return Some(self.total);
        }
        self.groups.iter().find(|g| g.key == key).map(|g| g.total)
    }
}

/// A numeric cell that did not parse cleanly after stripping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercionWarning {
    pub source_row: usize,
    pub field: String,
    pub raw: String,
}

/// A processor key with no rate card entry and how many rows carried it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedProcessor {
    pub key: String,
    pub rows: usize,
}

/// Row counts for each filtering stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FilterStats {
    pub input_rows: usize,
    pub excluded_merchant_group: usize,
    pub excluded_processor: usize,
    pub empty_merchant_group: usize,
    pub excluded_processor_substring: usize,
    pub missing_processor: usize,
    pub retained_rows: usize,
}
