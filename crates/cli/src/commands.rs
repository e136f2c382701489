//! Command handlers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use project::{Project, ResolvedRecord};
use storage::open_backend;
use tracing::debug;
use tracker_core::{short_id, Error, ProjectConfig, StorageConfig};

use crate::StorageArgs;

/// Storage location chosen from flags or project config
#[derive(Debug, Clone, PartialEq)]
pub struct StorageLocation {
    pub url: String,
    pub project_dir: PathBuf,
    pub options: StorageConfig,
}

/// Use `--storage-url` if given, otherwise the nearest keepsake.yaml
pub fn locate_storage(args: &StorageArgs, cwd: &Path) -> Result<StorageLocation> {
    let source_dir = match &args.source_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    };

    match &args.storage_url {
        Some(url) => {
            // Options still come from the project config when there is one
            let options = ProjectConfig::find_in_dir(&source_dir)
                .map(|(config, _)| config.storage_options)
                .unwrap_or_default();
            Ok(StorageLocation {
                url: url.clone(),
                project_dir: source_dir,
                options,
            })
        }
        None => {
            let (config, project_dir) = ProjectConfig::find_in_dir(&source_dir)?;
            Ok(StorageLocation {
                url: config.storage,
                project_dir,
                options: config.storage_options,
            })
        }
    }
}

async fn open_project(args: &StorageArgs) -> Result<Project> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let location = locate_storage(args, &cwd)?;
    debug!(?location, "Resolved storage location");

    let backend = open_backend(&location.url, &location.project_dir, &location.options)
        .await
        .with_context(|| format!("Failed to open storage {}", location.url))?;
    Ok(Project::with_config(backend, &location.options))
}

/// Remove each prefix in order, stopping at the first error
pub async fn remove(prefixes: &[String], args: &StorageArgs) -> Result<()> {
    let mut project = open_project(args).await?;

    for prefix in prefixes {
        match project.resolve(prefix).await {
            Ok(ResolvedRecord::Checkpoint(checkpoint)) => {
                println!("Removing checkpoint {}...", checkpoint.short_id());
            }
            Ok(ResolvedRecord::Experiment(experiment)) => {
                println!(
                    "Removing experiment {} and its checkpoints...",
                    experiment.short_id()
                );
            }
            // May still name an index entry of a half-removed checkpoint
            Err(Error::PrefixNotFound { .. }) => {
                let removed = project.remove(prefix).await?;
                println!("Removing checkpoint {}...", short_id(&removed.id));
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        project.remove(prefix).await?;
    }

    Ok(())
}

/// Print the record a prefix resolves to
pub async fn show(prefix: &str, args: &StorageArgs) -> Result<()> {
    let mut project = open_project(args).await?;
    let resolved = project.resolve(prefix).await?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flag_overrides_config() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("keepsake.yaml"), "storage: from-config\n").unwrap();

        let args = StorageArgs {
            storage_url: Some("s3://bucket".to_string()),
            source_dir: None,
        };
        let location = locate_storage(&args, dir.path()).unwrap();
        assert_eq!(location.url, "s3://bucket");
        assert_eq!(location.project_dir, dir.path());
    }

    #[test]
    fn test_config_from_source_dir() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("project");
        std::fs::create_dir_all(project_dir.join("src")).unwrap();
        std::fs::write(project_dir.join("keepsake.yaml"), "storage: .store\n").unwrap();

        let args = StorageArgs {
            storage_url: None,
            source_dir: Some(PathBuf::from("project/src")),
        };
        let location = locate_storage(&args, dir.path()).unwrap();
        assert_eq!(location.url, ".store");
        assert_eq!(location.project_dir, project_dir);
    }
}
