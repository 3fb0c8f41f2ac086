//! Project management
//!
//! Handles project initialization, the cross-process lock and access to the
//! repository.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use super::config::BACKLOG_DIR;
use super::{Config, JsonlRepository};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a backlog project. Run 'backlog init' first.")]
    NotInProject,
}

/// Held advisory lock on `.backlog/backlog.lock`, released on drop
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    exclusive: bool,
}

impl ProjectLock {
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        // Closing the file releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}

/// A backlog project
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(BACKLOG_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path; existing files are kept
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dir = root.join(BACKLOG_DIR);

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", BACKLOG_DIR, dir.display()))?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# backlog configuration

# Priority for items added without --priority (higher is more urgent)
default_priority = 0

# Log filter when neither --verbose nor BACKLOG_LOG is set
# log_level = "info"

[agent]
# Worker name recorded on claims (defaults to $BACKLOG_AGENT, then $USER)
# name = "agent-1"
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Lock file is only meaningful to running processes
backlog.lock

# Interrupted rewrites
*.tmp
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .backlog directory path
    pub fn backlog_dir(&self) -> PathBuf {
        self.root.join(BACKLOG_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the file-backed repository for this project
    pub fn repository(&self) -> JsonlRepository {
        JsonlRepository::for_project(&self.root)
    }

    fn lock_file(&self) -> Result<File> {
        let path = self.backlog_dir().join("backlog.lock");
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))
    }

    /// Blocks until no other process holds any lock on the project
    pub fn lock_exclusive(&self) -> Result<ProjectLock> {
        let file = self.lock_file()?;
        file.lock_exclusive()
            .context("Failed to acquire exclusive project lock")?;
        debug!(root = %self.root.display(), "acquired exclusive project lock");
        Ok(ProjectLock {
            file,
            exclusive: true,
        })
    }

    /// Blocks until no other process holds the exclusive lock
    pub fn lock_shared(&self) -> Result<ProjectLock> {
        let file = self.lock_file()?;
        file.lock_shared()
            .context("Failed to acquire shared project lock")?;
        debug!(root = %self.root.display(), "acquired shared project lock");
        Ok(ProjectLock {
            file,
            exclusive: false,
        })
    }
}
