use crate::core::config::AppConfig;
use crate::store::{BOOK_FILE, Book};
use anyhow::{Context, Result};
use std::path::Path;

/// Creates a default configuration and an empty holdings book at the default location
pub fn setup() -> Result<()> {
    let path = AppConfig::default_config_path()?;
    setup_at_path(path)
}

/// Creates a default configuration at `path` and an empty holdings book in the
/// data directory it points to. An existing book is left alone.
pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    let config = AppConfig::default();
    config.save_to_path(path)?;
    tracing::info!("Created default configuration at {}", path.display());

    let data_dir = config.data_dir()?;
    create_empty_book(&data_dir)?;
    Ok(())
}

fn create_empty_book(data_dir: &Path) -> Result<()> {
    let book_path = data_dir.join(BOOK_FILE);
    if book_path.exists() {
        tracing::debug!("Keeping existing holdings book at {}", book_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create directory: {}", data_dir.display()))?;
    let yaml = serde_yaml::to_string(&Book::default()).context("Failed to serialize book")?;
    std::fs::write(&book_path, yaml)
        .with_context(|| format!("Failed to write holdings book to {}", book_path.display()))?;

    tracing::info!("Created empty holdings book at {}", book_path.display());
    Ok(())
}
