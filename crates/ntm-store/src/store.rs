//! Durable `ExecutionState` persistence (C13, §4.9).
//!
//! One JSON file per run under `<project>/.ntm/pipelines/<run_id>.json`.
//! Writes are atomic via temp-file-then-rename so a crash mid-write never
//! leaves a half-written run file behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use ntm_core::execution::ExecutionState;

use crate::error::StoreError;

const FILE_PERMISSIONS: u32 = 0o644;

pub struct PipelineStore {
    pipelines_dir: PathBuf,
}

impl PipelineStore {
    /// `project_root` is the project directory; state lives under
    /// `<project_root>/.ntm/pipelines/`.
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            pipelines_dir: project_root.as_ref().join(".ntm").join("pipelines"),
        }
    }

    pub fn pipelines_dir(&self) -> &Path {
        &self.pipelines_dir
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.pipelines_dir.join(format!("{run_id}.json"))
    }

    /// Write `state` atomically, creating the pipelines directory if needed.
    pub fn save(&self, state: &ExecutionState) -> Result<(), StoreError> {
        fs::create_dir_all(&self.pipelines_dir)?;
        let path = self.path_for(&state.run_id);
        let body = serde_json::to_string_pretty(state)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);

        fs::write(&tmp_path, body)?;
        set_permissions(&tmp_path, FILE_PERMISSIONS)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Load the state for `run_id`. `StoreError::NotFound` if the file is
    /// absent; `StoreError::Malformed` if it cannot be parsed.
    pub fn load(&self, run_id: &str) -> Result<ExecutionState, StoreError> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Err(StoreError::NotFound(run_id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, run_id: &str) -> bool {
        self.path_for(run_id).exists()
    }

    /// Delete top-level `.json` run files whose mtime is older than
    /// `older_than`. Subdirectories are left untouched. Returns the number
    /// of files removed.
    pub fn cleanup(&self, older_than: Duration) -> Result<usize, StoreError> {
        if older_than <= Duration::zero() {
            return Err(StoreError::InvalidThreshold(
                "cleanup threshold must be a positive duration".to_string(),
            ));
        }
        if !self.pipelines_dir.exists() {
            return Ok(0);
        }

        let cutoff = Utc::now() - older_than;
        let mut removed = 0;

        for entry in fs::read_dir(&self.pipelines_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let modified: chrono::DateTime<Utc> = modified.into();
            if modified < cutoff {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = PipelineStore::new(dir.path());
        let state = ExecutionState::new("run-1", "deploy", "sess", "deploy.yaml");
        store.save(&state).unwrap();

        let loaded = store.load("run-1").unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.workflow_id, "deploy");
    }

    #[test]
    fn load_missing_run_is_not_found() {
        let dir = tempdir().unwrap();
        let store = PipelineStore::new(dir.path());
        assert!(matches!(store.load("absent"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = PipelineStore::new(dir.path());
        fs::create_dir_all(store.pipelines_dir()).unwrap();
        fs::write(store.pipelines_dir().join("bad.json"), "{not json").unwrap();
        assert!(matches!(store.load("bad"), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn zero_or_negative_threshold_is_rejected() {
        let dir = tempdir().unwrap();
        let store = PipelineStore::new(dir.path());
        assert!(store.cleanup(Duration::zero()).is_err());
        assert!(store.cleanup(Duration::seconds(-1)).is_err());
    }

    #[test]
    fn cleanup_removes_only_old_top_level_json_files() {
        let dir = tempdir().unwrap();
        let store = PipelineStore::new(dir.path());

        let old = ExecutionState::new("old-run", "wf", "sess", "wf.yaml");
        store.save(&old).unwrap();
        sleep(StdDuration::from_millis(20));

        fs::create_dir_all(store.pipelines_dir().join("subdir")).unwrap();
        fs::write(store.pipelines_dir().join("subdir").join("old-run.json"), "{}").unwrap();
        fs::write(store.pipelines_dir().join("notes.txt"), "hello").unwrap();

        let removed = store.cleanup(Duration::milliseconds(10)).unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists("old-run"));
        assert!(store.pipelines_dir().join("subdir").join("old-run.json").exists());
        assert!(store.pipelines_dir().join("notes.txt").exists());
    }
}
