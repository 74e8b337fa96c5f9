use std::path::{Path, PathBuf};

use crate::cli::search_dir;
use crate::error::Result;
use crate::inputs::find_input;
use crate::settings::load_settings;

fn show(label: &str, found: Option<PathBuf>) {
    match found {
        Some(path) => println!("{label}{}", path.display()),
        None => println!("{label}(none found)"),
    }
}

pub fn run(config: &Path, dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config)?;
    let dir = search_dir(dir, &settings.data_dir);

    println!(
        "Settings:   {}{}",
        config.display(),
        if config.exists() { "" } else { " (defaults)" }
    );
    println!("Data dir:   {}", dir.display());

    if !dir.is_dir() {
        println!();
        println!("Data directory not found. Run `eomfees init` to set up.");
        return Ok(());
    }

    show("Rate card:  ", find_input(&dir, &settings.rate_card_patterns)?);
    show("Export:     ", find_input(&dir, &settings.export_patterns)?);

    println!();
    println!("Excluded merchant groups:   {}", join(settings.filters.excluded_merchant_groups.iter()));
    println!("Excluded processors:        {}", join(settings.filters.excluded_processors.iter()));
    println!("Excluded processor matches: {}", join(settings.filters.excluded_processor_substrings.iter()));
    println!("Fallback processor:         {}", settings.fallback_processor);
    println!("Unknown processors:         {:?}", settings.unknown_processor);
    println!("Empty processed:            {:?}", settings.empty_processed);
    Ok(())
}

fn join<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
