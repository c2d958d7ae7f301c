//! Init command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::InitArgs;
use std::path::{Path, PathBuf};
use tenaz::{DEFAULT_CONFIG_FILE, STARTER_CONFIG};
use tracing::debug;

/// Write the starter configuration; returns the file written
pub fn execute_init(_config: &CliConfig, args: &InitArgs) -> CliResult<PathBuf> {
    let target = init_target(&args.path, args.force)?;
    std::fs::create_dir_all(&args.path)?;
    std::fs::write(&target, STARTER_CONFIG)?;
    debug!(path = %target.display(), "starter config written");
    Ok(target)
}

/// Where `init` writes, refusing to clobber an existing file without `force`
pub fn init_target(dir: &Path, force: bool) -> CliResult<PathBuf> {
    if dir.exists() && !dir.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let target = dir.join(DEFAULT_CONFIG_FILE);
    if target.exists() && !force {
        return Err(CliError::invalid_argument(format!(
            "{} already exists (use --force to overwrite)",
            target.display()
        )));
    }
    Ok(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(path: &Path, force: bool) -> InitArgs {
        InitArgs {
            path: path.to_path_buf(),
            force,
        }
    }

    #[test]
    fn test_writes_loadable_starter() {
        let dir = TempDir::new().unwrap();
        let written = execute_init(&CliConfig::new(), &args(dir.path(), false)).unwrap();
        assert_eq!(written, dir.path().join("tenaz.yaml"));
        let config = tenaz::RunConfig::load(&written).unwrap();
        assert!(config.targets.contains_key("email"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("e2e");
        execute_init(&CliConfig::new(), &args(&nested, false)).unwrap();
        assert!(nested.join("tenaz.yaml").is_file());
    }

    #[test]
    fn test_refuses_existing_without_force() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tenaz.yaml"), "retries: 3\n").unwrap();
        let err = execute_init(&CliConfig::new(), &args(dir.path(), false)).unwrap_err();
        assert!(err.to_string().contains("--force"));
        let kept = std::fs::read_to_string(dir.path().join("tenaz.yaml")).unwrap();
        assert_eq!(kept, "retries: 3\n");
    }

    #[test]
    fn test_force_overwrites() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tenaz.yaml"), "retries: 3\n").unwrap();
        execute_init(&CliConfig::new(), &args(dir.path(), true)).unwrap();
        let written = std::fs::read_to_string(dir.path().join("tenaz.yaml")).unwrap();
        assert_eq!(written, STARTER_CONFIG);
    }

    #[test]
    fn test_rejects_file_as_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "").unwrap();
        assert!(init_target(&file, true).is_err());
    }
}
