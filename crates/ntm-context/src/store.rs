//! Pending-rotation store (§4.3, §6): a durable newline-delimited JSON file.
//!
//! Read-modify-write under a lock, atomic rewrite, append-only JSONL with
//! per-agent replacement semantics (the newest record for an agent wins).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use ntm_core::context::PendingRotation;
use tracing::warn;

use crate::error::ContextError;

pub struct PendingRotationStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PendingRotationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Insert `rotation`, replacing any prior record for the same agent.
    pub fn add(&self, rotation: PendingRotation) -> Result<(), ContextError> {
        let _guard = self.lock.lock().expect("pending rotation store lock poisoned");
        let mut all = self.read_all_raw()?;
        all.retain(|r| r.agent_id != rotation.agent_id);
        all.push(rotation);
        self.write_all(&all)
    }

    /// All non-expired records.
    pub fn get_all(&self) -> Result<Vec<PendingRotation>, ContextError> {
        let _guard = self.lock.lock().expect("pending rotation store lock poisoned");
        let now = Utc::now();
        Ok(self
            .read_all_raw()?
            .into_iter()
            .filter(|r| r.timeout_at > now)
            .collect())
    }

    /// Physically remove expired records from the file; returns how many were dropped.
    pub fn clean_expired(&self) -> Result<usize, ContextError> {
        let _guard = self.lock.lock().expect("pending rotation store lock poisoned");
        let now = Utc::now();
        let all = self.read_all_raw()?;
        let (kept, expired): (Vec<_>, Vec<_>) = all.into_iter().partition(|r| r.timeout_at > now);
        self.write_all(&kept)?;
        Ok(expired.len())
    }

    pub fn count(&self) -> Result<usize, ContextError> {
        self.get_all().map(|v| v.len())
    }

    pub fn clear(&self) -> Result<(), ContextError> {
        let _guard = self.lock.lock().expect("pending rotation store lock poisoned");
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(ContextError::Store)?;
        }
        Ok(())
    }

    fn read_all_raw(&self) -> Result<Vec<PendingRotation>, ContextError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(ContextError::Store)?;
        let mut out = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PendingRotation>(line) {
                Ok(record) => out.push(record),
                Err(err) => warn!(line = idx, error = %err, "skipping malformed pending-rotation record"),
            }
        }
        Ok(out)
    }

    fn write_all(&self, records: &[PendingRotation]) -> Result<(), ContextError> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(ContextError::Store)?;
        }

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, buf).map_err(ContextError::Store)?;
        fs::rename(&tmp_path, &self.path).map_err(ContextError::Store)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ntm_core::context::DefaultAction;
    use tempfile::tempdir;

    fn rotation(agent_id: &str, timeout_in: Duration) -> PendingRotation {
        let now = Utc::now();
        PendingRotation {
            agent_id: agent_id.to_string(),
            session_name: "sess".to_string(),
            pane_id: "pane-1".to_string(),
            context_percent: 80.0,
            created_at: now,
            timeout_at: now + timeout_in,
            default_action: DefaultAction::Rotate,
            work_dir: None,
        }
    }

    #[test]
    fn add_then_get_all_round_trips() {
        let dir = tempdir().unwrap();
        let store = PendingRotationStore::new(dir.path().join("pending.jsonl"));
        store.add(rotation("a1", Duration::hours(1))).unwrap();
        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, "a1");
    }

    #[test]
    fn add_replaces_same_agent_record() {
        let dir = tempdir().unwrap();
        let store = PendingRotationStore::new(dir.path().join("pending.jsonl"));
        store.add(rotation("a1", Duration::hours(1))).unwrap();
        store.add(rotation("a1", Duration::hours(2))).unwrap();
        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn get_all_excludes_expired() {
        let dir = tempdir().unwrap();
        let store = PendingRotationStore::new(dir.path().join("pending.jsonl"));
        store.add(rotation("expired", Duration::seconds(-10))).unwrap();
        store.add(rotation("live", Duration::hours(1))).unwrap();
        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, "live");
    }

    #[test]
    fn clean_expired_compacts_and_count_matches() {
        let dir = tempdir().unwrap();
        let store = PendingRotationStore::new(dir.path().join("pending.jsonl"));
        store.add(rotation("expired", Duration::seconds(-10))).unwrap();
        store.add(rotation("live", Duration::hours(1))).unwrap();
        let removed = store.clean_expired().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().unwrap(), store.get_all().unwrap().len());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");
        let store = PendingRotationStore::new(&path);
        store.add(rotation("a1", Duration::hours(1))).unwrap();
        store.clear().unwrap();
        assert!(!path.exists());
    }
}
