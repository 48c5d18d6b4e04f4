use crate::error::TrainError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Output directory of one experiment, `logdir/expid`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Create `logdir/expid` if it does not exist yet.
    pub fn create(logdir: &Path, expid: &str) -> Result<Self, TrainError> {
        let path = logdir.join(expid);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            info!("Created dir: {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Record the parsed command line as pretty JSON in `args.txt`.
    pub fn write_args<T: Serialize>(&self, args: &T) -> Result<PathBuf, TrainError> {
        let path = self.join("args.txt");
        fs::write(&path, serde_json::to_string_pretty(args)?)?;
        Ok(path)
    }

    /// Write a compact JSON summary to `name`.
    pub fn write_summary<T: Serialize>(&self, name: &str, summary: &T) -> Result<PathBuf, TrainError> {
        let path = self.join(name);
        fs::write(&path, serde_json::to_string(summary)?)?;
        Ok(path)
    }
}
