use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{FeeError, Result};

// ---------------------------------------------------------------------------
// Source formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited(u8),
    #[cfg(feature = "xlsx")]
    Workbook,
}

impl SourceFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delimited(b'\t') => "tsv",
            Self::Delimited(_) => "csv",
            #[cfg(feature = "xlsx")]
            Self::Workbook => "workbook",
        }
    }

    /// Pick a reader from the file extension, falling back to the leading bytes
    /// when the extension is missing or unfamiliar.
    pub fn detect(path: &Path, head: &[u8]) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("txt") => return Ok(Self::Delimited(b',')),
            Some("tsv") => return Ok(Self::Delimited(b'\t')),
            Some("xlsx") | Some("xlsm") | Some("xls") | Some("xlsb") | Some("ods") => {
                return workbook_format(path);
            }
            _ => {}
        }
        if is_workbook_magic(head) {
            return workbook_format(path);
        }
        if head.contains(&0) {
            return Err(FeeError::UnsupportedFormat(path.display().to_string()));
        }
        Ok(Self::Delimited(b','))
    }
}

#[cfg(feature = "xlsx")]
fn workbook_format(_path: &Path) -> Result<SourceFormat> {
    Ok(SourceFormat::Workbook)
}

#[cfg(not(feature = "xlsx"))]
fn workbook_format(path: &Path) -> Result<SourceFormat> {
    Err(FeeError::UnsupportedFormat(format!(
        "{} (built without workbook support)",
        path.display()
    )))
}

/// ZIP (xlsx/ods) or OLE compound document (xls).
fn is_workbook_magic(head: &[u8]) -> bool {
    head.starts_with(b"PK\x03\x04") || head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A raw grid of text cells, identical in shape whether it came from a
/// delimited file or the first sheet of a workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FeeError::InputNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let head = &bytes[..bytes.len().min(8)];
        let format = SourceFormat::detect(path, head)?;
        tracing::debug!(path = %path.display(), format = format.name(), "loading table");
        match format {
            SourceFormat::Delimited(delim) => Self::from_delimited(bytes.as_slice(), delim),
            #[cfg(feature = "xlsx")]
            SourceFormat::Workbook => Self::from_workbook(bytes),
        }
    }

    pub fn from_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let mut row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
            if let Some(first) = row.first_mut() {
                // Excel-exported CSVs lead with a UTF-8 BOM
                if let Some(stripped) = first.strip_prefix('\u{feff}') {
                    *first = stripped.to_string();
                }
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    #[cfg(feature = "xlsx")]
    pub fn from_workbook(bytes: Vec<u8>) -> Result<Self> {
        use calamine::Reader;

        let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes))?;
        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range?,
            None => return Ok(Self::default()),
        };
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Ok(Self { rows })
    }

    /// Index of the first row that has a cell matching `column` once both are
    /// normalized. Leading metadata rows are skipped this way.
    pub fn find_header_row(&self, column: &str) -> Option<usize> {
        let wanted = normalize_header(column);
        self.rows
            .iter()
            .position(|row| row.iter().any(|cell| normalize_header(cell) == wanted))
    }
}

#[cfg(feature = "xlsx")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => number_text(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => number_text(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

/// Integral floats print without a trailing `.0` so workbook and CSV inputs
/// clean to the same text.
#[cfg_attr(not(feature = "xlsx"), allow(dead_code))]
fn number_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// `Attempted Captured Charges ` → `attempted_captured_charges`
pub fn normalize_header(raw: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static pattern"));
    let lower = raw.trim().to_lowercase();
    re.replace_all(&lower, "_").trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Attempted Captured Charges"), "attempted_captured_charges");
        assert_eq!(normalize_header("  Card Type "), "card_type");
        assert_eq!(normalize_header("CB Fee"), "cb_fee");
        assert_eq!(normalize_header("Processed ($)"), "processed");
        assert_eq!(normalize_header("Merchant--Group"), "merchant_group");
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            SourceFormat::detect(Path::new("EOM_View.csv"), b"a,b").unwrap(),
            SourceFormat::Delimited(b',')
        );
        assert_eq!(
            SourceFormat::detect(Path::new("EOM_View.TSV"), b"a\tb").unwrap(),
            SourceFormat::Delimited(b'\t')
        );
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_detect_workbook() {
        assert_eq!(
            SourceFormat::detect(Path::new("EOM-Rubric.xlsx"), b"").unwrap(),
            SourceFormat::Workbook
        );
        assert_eq!(
            SourceFormat::detect(Path::new("download"), b"PK\x03\x04abcd").unwrap(),
            SourceFormat::Workbook
        );
    }

    #[test]
    fn test_detect_sniffs_text_without_extension() {
        assert_eq!(
            SourceFormat::detect(Path::new("download"), b"Processor").unwrap(),
            SourceFormat::Delimited(b',')
        );
    }

    #[test]
    fn test_from_delimited_flexible_rows() {
        let data = "\u{feff}Report,,\nProcessor,Processed\nAcme,\"$1,000.00\",extra\n";
        let table = Table::from_delimited(data.as_bytes(), b',').unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][0], "Report");
        assert_eq!(table.rows[2], vec!["Acme", "$1,000.00", "extra"]);
    }

    #[test]
    fn test_find_header_row_skips_metadata() {
        let table = Table::new(vec![
            vec!["EOM Rubric".into()],
            vec!["".into(), "Fees".into()],
            vec!["Processor".into(), "Discount Fees".into()],
        ]);
        assert_eq!(table.find_header_row("processor"), Some(2));
        assert_eq!(table.find_header_row("Card Type"), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Table::load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, FeeError::InputNotFound(_)));
    }

    #[test]
    fn test_number_text() {
        assert_eq!(number_text(35.0), "35");
        assert_eq!(number_text(0.025), "0.025");
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_cell_text_matches_csv_rendering() {
        use calamine::{CellErrorType, Data};

        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Visa Credit".into())), "Visa Credit");
        assert_eq!(cell_text(&Data::Float(100.0)), "100");
        assert_eq!(cell_text(&Data::Float(250.5)), "250.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
        assert_eq!(cell_text(&Data::DateTimeIso("2025-01-31".into())), "2025-01-31");
        assert_eq!(cell_text(&Data::Error(CellErrorType::NA)), "#N/A");
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_workbook_and_csv_load_identically() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures");
        let workbook = Table::load(&fixtures.join("EOM_View.xlsx")).unwrap();
        let csv = Table::load(&fixtures.join("EOM_View.csv")).unwrap();
        assert_eq!(workbook.rows[1], vec!["45688", "ACME", "Visa Credit", "G1", "100", "$1,000.00", "1", "2"]);
        assert_eq!(workbook.rows[3][5], "");
        assert_eq!(workbook.rows[4][5], "250.5");
        assert_eq!(workbook, csv);
    }
}
