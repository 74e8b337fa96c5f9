use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(config: &Path, data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let data_path = PathBuf::from(shellexpand_path(&settings.data_dir));
    std::fs::create_dir_all(data_path.join("reports"))?;
    save_settings(&settings, config)?;

    println!("Settings written to {}", config.display());
    println!("Data directory: {}", data_path.display());
    println!(
        "Place the rate card (name containing {}) and the export (name containing {}) there, then run `eomfees run`.",
        settings.rate_card_patterns.join(" + "),
        settings.export_patterns.join(" + "),
    );
    Ok(())
}
