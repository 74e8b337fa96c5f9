use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{FeeError, Result};

const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "xlsx", "xlsm", "xls", "xlsb", "ods"];

/// The two files a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub rate_card: PathBuf,
    pub export: PathBuf,
}

fn name_matches(name: &str, patterns: &[String]) -> bool {
    !patterns.is_empty() && patterns.iter().all(|p| name.contains(p.as_str()))
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Newest file in `dir` whose name contains every pattern. Ties on
/// modification time go to the lexically greatest name.
pub fn find_input(dir: &Path, patterns: &[String]) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Err(FeeError::InputNotFound(format!("{} is not a directory", dir.display())));
    }
    let mut best: Option<(SystemTime, String, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !has_supported_extension(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        // Lock files left behind by spreadsheet editors
        if name.starts_with("~$") || !name_matches(&name, patterns) {
            continue;
        }
        let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let candidate = (modified, name, path);
        if best.as_ref().map_or(true, |b| (&candidate.0, &candidate.1) > (&b.0, &b.1)) {
            best = Some(candidate);
        }
    }
    Ok(best.map(|(_, _, path)| path))
}

/// Resolve both inputs: explicit paths win, otherwise search `dir`.
pub fn resolve_inputs(
    dir: &Path,
    rate_card: Option<PathBuf>,
    export: Option<PathBuf>,
    rate_card_patterns: &[String],
    export_patterns: &[String],
) -> Result<Inputs> {
    let rate_card = match rate_card {
        Some(path) => path,
        None => find_input(dir, rate_card_patterns)?.ok_or_else(|| {
            FeeError::InputNotFound(format!(
                "no rate card matching {:?} in {}",
                rate_card_patterns,
                dir.display()
            ))
        })?,
    };
    let export = match export {
        Some(path) => path,
        None => find_input(dir, export_patterns)?.ok_or_else(|| {
            FeeError::InputNotFound(format!(
                "no export matching {:?} in {}",
                export_patterns,
                dir.display()
            ))
        })?,
    };
    tracing::info!(rate_card = %rate_card.display(), export = %export.display(), "inputs resolved");
    Ok(Inputs { rate_card, export })
}
