use devcred::config::DevcredConfig;
use std::path::PathBuf;

/// Write the commented default configuration.
pub fn execute(path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = PathBuf::from(path.unwrap_or_else(|| super::DEFAULT_CONFIG_PATH.to_string()));
    if path.exists() && !force {
        return Err(format!("'{}' already exists (use --force to overwrite)", path.display()).into());
    }
    DevcredConfig::create_default(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devcred.toml").to_string_lossy().to_string();

        execute(Some(path.clone()), false).unwrap();
        assert!(execute(Some(path.clone()), false).is_err());
        execute(Some(path.clone()), true).unwrap();
        assert!(DevcredConfig::load(std::path::Path::new(&path)).is_ok());
    }
}
