use std::path::{Path, PathBuf};

use comfy_table::{Cell, Table};

use crate::cli::search_dir;
use crate::error::{FeeError, Result};
use crate::inputs::find_input;
use crate::rates::RateCard;
use crate::settings::load_settings;

pub fn run(config: &Path, file: Option<PathBuf>, dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config)?;
    let path = match file {
        Some(path) => path,
        None => {
            let dir = search_dir(dir, &settings.data_dir);
            find_input(&dir, &settings.rate_card_patterns)?.ok_or_else(|| {
                FeeError::InputNotFound(format!(
                    "no rate card matching {:?} in {}",
                    settings.rate_card_patterns,
                    dir.display()
                ))
            })?
        }
    };

    let card = RateCard::load(&path, &settings.rate_card_options())?;
    let mut table = Table::new();
    table.set_header(vec!["Processor", "Discount Rate", "Attempt Fee", "CB Fee", "Visa Alert Fee"]);
    for (key, entry) in card.iter() {
        let label = if key == card.fallback_key() {
            format!("{key} (fallback)")
        } else {
            key.to_string()
        };
        table.add_row(vec![
            Cell::new(label),
            Cell::new(entry.discount_fee_rate),
            Cell::new(entry.attempt_fee_rate),
            Cell::new(entry.chargeback_fee),
            Cell::new(entry.visa_alert_fee),
        ]);
    }
    println!("Rate card: {}\n{table}", path.display());
    println!("{} processor(s)", card.len());
    Ok(())
}
