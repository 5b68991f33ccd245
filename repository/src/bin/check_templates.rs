//! Loads the configured SQL template directory and prints what it found.
//!
//! Usage: `check_templates [--simple.env=<env>] [directory]`

use anyhow::{Context, Result};
use simple_repository::logging::init_tracing;
use simple_repository::service::db::template::SqlTemplateStore;
use simple_repository::Settings;
use std::env;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("warn");

    let args: Vec<String> = env::args().collect();
    let explicit_dir = args
        .iter()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from);

    let dir = match explicit_dir {
        Some(dir) => dir,
        None => Settings::from_env()
            .and_then(|settings| settings.with_args(&args))
            .context("failed to load repository settings")?
            .template_dir(),
    };

    let store = SqlTemplateStore::load(&dir)
        .with_context(|| format!("failed to load templates from {}", dir.display()))?;

    println!("{} templates in {}", store.len(), dir.display());
    for template in store.templates() {
        if template.required_fields.is_empty() {
            println!("  {}", template.name);
        } else {
            println!(
                "  {} (required: {})",
                template.name,
                template.required_fields.join(", ")
            );
        }
        println!("    {}", template.sql);
    }
    Ok(())
}
