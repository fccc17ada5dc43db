//! Export command implementation.
//!
//! Writes the effective configuration together with every screen of the
//! catalog, so the result can be edited and loaded back as a complete file.

use anyhow::{anyhow, Context};
use pmctop::ScreenCatalog;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Configuration whose screens are exactly those of `catalog`.
pub fn exported_config(config: &Config, catalog: &ScreenCatalog) -> Config {
    Config {
        builtin_screens: Some(false),
        screens: catalog.definitions(),
        ..config.clone()
    }
}

/// Writes the export to `output`, or stdout when `None` or `-`.
pub fn command_export(
    config: &Config,
    catalog: &ScreenCatalog,
    format: ConfigFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let exported = exported_config(config, catalog);
    let content = render_config(&exported, format).map_err(|e| anyhow!("{}", e))?;

    match output {
        Some(path) if path.to_string_lossy() != "-" => {
            fs::write(&path, content)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            println!("✅ Configuration written to: {}", path.display());
        }
        _ => print!("{}", content),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use pmctop::screen::CpuInfo;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_exported_config_reloads_same_screens() {
        let catalog = ScreenCatalog::with_builtins_for(CpuInfo::default());
        let exported = exported_config(&Config::default(), &catalog);
        let text = render_config(&exported, ConfigFormat::Yaml).unwrap();
        let back = parse_config(&text, Path::new("x.yaml")).unwrap();
        assert_eq!(back.builtin_screens, Some(false));
        assert_eq!(back.screens, catalog.definitions());
    }

    #[test]
    fn test_command_export_to_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("out.json");
        let catalog = ScreenCatalog::with_builtins_for(CpuInfo::default());
        command_export(&Config::default(), &catalog, ConfigFormat::Json, Some(path.clone()))
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let back = parse_config(&text, &path).unwrap();
        assert_eq!(back.screens.len(), catalog.len());
        assert_eq!(back.screens[0].name, "default");
    }
}
