//! Run directory: every artifact of one council run.

use crate::error::StoreError;
use crate::ui::UiState;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const FINAL_PLAN_FILE: &str = "final-plan.md";
const ACCEPTED_FILE: &str = "final-plan-accepted.md";
const JUDGE_FILE: &str = "judge.md";
const UI_STATE_FILE: &str = "ui-state.json";
const METADATA_FILE: &str = "run.json";

/// Placeholder written when no final plan could be produced
pub const FINAL_PLAN_PLACEHOLDER: &str =
    "# Plan\n\n_No final plan: the judge did not produce a valid report._\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptRole {
    Planner,
    Judge,
    Refine,
}

/// One agent attempt, as recorded in `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub agent: String,
    pub role: AttemptRole,
    pub attempt: u32,
    pub valid: bool,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Anonymous label shown to the judge and the planner behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub label: String,
    pub agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelRecord>,
}

/// Directory-backed record of a run.
///
/// Writers are the orchestrator and the action worker, never for the same file at once.
#[derive(Debug)]
pub struct RunStore {
    dir: PathBuf,
    run_id: String,
    metadata: Mutex<RunMetadata>,
}

impl RunStore {
    /// Create `<runs_dir>/<date>-<slug>`, or `<runs_dir>/<run_id>` when given,
    /// suffixing `-2`, `-3`, … until the name is free.
    pub fn create(
        runs_dir: &Path,
        run_id: Option<&str>,
        label: &str,
        date: NaiveDate,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(runs_dir).map_err(|e| StoreError::CreateDir {
            path: runs_dir.to_path_buf(),
            source: e,
        })?;

        let base = match run_id.map(slugify).filter(|s| !s.is_empty()) {
            Some(id) => id,
            None => format!("{}-{}", date.format("%Y-%m-%d"), slugify(label)),
        };

        let mut suffix = 1u32;
        loop {
            let name = if suffix == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, suffix)
            };
            let dir = runs_dir.join(&name);

            // create_dir fails on an existing path, so concurrent runs never share a directory
            match fs::create_dir(&dir) {
                Ok(()) => {
                    info!("Run directory: {}", dir.display());
                    return Ok(Self {
                        metadata: Mutex::new(RunMetadata {
                            run_id: name.clone(),
                            started_at: Some(Utc::now()),
                            ..Default::default()
                        }),
                        dir,
                        run_id: name,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("Run directory {} exists, trying next suffix", dir.display());
                    suffix += 1;
                }
                Err(e) => {
                    return Err(StoreError::CreateDir {
                        path: dir,
                        source: e,
                    })
                }
            }
        }
    }

    /// Open an existing run directory (for resuming the UI)
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::Read {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a run directory"),
            });
        }
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "run".to_string());

        let metadata = fs::read_to_string(dir.join(METADATA_FILE))
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| RunMetadata {
                run_id: run_id.clone(),
                ..Default::default()
            });

        Ok(Self {
            dir: dir.to_path_buf(),
            run_id,
            metadata: Mutex::new(metadata),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn plan_path(&self, agent: &str) -> PathBuf {
        self.dir.join(format!("plan-{}.md", slugify(agent)))
    }

    pub fn plan_attempt_path(&self, agent: &str, attempt: u32) -> PathBuf {
        self.dir
            .join(format!("plan-{}-attempt{}.md", slugify(agent), attempt))
    }

    pub fn judge_path(&self) -> PathBuf {
        self.dir.join(JUDGE_FILE)
    }

    pub fn judge_attempt_path(&self, attempt: u32) -> PathBuf {
        self.dir.join(format!("judge-attempt{}.md", attempt))
    }

    pub fn final_plan_path(&self) -> PathBuf {
        self.dir.join(FINAL_PLAN_FILE)
    }

    pub fn accepted_path(&self) -> PathBuf {
        self.dir.join(ACCEPTED_FILE)
    }

    pub fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        fs::write(path, content).map_err(|e| StoreError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub fn write_final_plan(&self, text: &str) -> Result<PathBuf, StoreError> {
        let path = self.final_plan_path();
        self.write(&path, text)?;
        Ok(path)
    }

    pub fn read_final_plan(&self) -> Option<String> {
        fs::read_to_string(self.final_plan_path()).ok()
    }

    /// Write `final-plan-<N>.md` with the lowest unused N
    pub fn save_snapshot(&self, text: &str) -> Result<PathBuf, StoreError> {
        let mut n = 1u32;
        loop {
            let path = self.dir.join(format!("final-plan-{}.md", n));
            if !path.exists() {
                self.write(&path, text)?;
                return Ok(path);
            }
            n += 1;
        }
    }

    /// Persist the accepted plan as both the accepted and the canonical artifact
    pub fn write_accepted(&self, text: &str) -> Result<PathBuf, StoreError> {
        let path = self.accepted_path();
        self.write(&path, text)?;
        self.write_final_plan(text)?;
        Ok(path)
    }

    pub fn write_ui_state(&self, state: &UiState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        self.write(&self.dir.join(UI_STATE_FILE), &json)
    }

    pub fn load_ui_state(&self) -> Option<UiState> {
        let content = fs::read_to_string(self.dir.join(UI_STATE_FILE)).ok()?;
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring unreadable UI snapshot: {}", e);
                None
            }
        }
    }

    /// Append an attempt and rewrite `run.json`
    pub fn record_attempt(&self, record: AttemptRecord) -> Result<(), StoreError> {
        self.update_metadata(|metadata| metadata.attempts.push(record))
    }

    pub fn record_labels(&self, labels: Vec<LabelRecord>) -> Result<(), StoreError> {
        self.update_metadata(|metadata| metadata.labels = labels)
    }

    fn update_metadata<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RunMetadata),
    {
        let json = {
            let mut metadata = self.metadata.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut metadata);
            serde_json::to_string_pretty(&*metadata)?
        };
        self.write(&self.dir.join(METADATA_FILE), &json)
    }

    pub fn metadata(&self) -> RunMetadata {
        self.metadata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Remove the run directory if nothing was written to it
    pub fn remove_if_empty(&self) -> bool {
        let empty = fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(e) = fs::remove_dir(&self.dir) {
                warn!("Failed to remove empty run directory: {}", e);
                return false;
            }
            debug!("Removed empty run directory {}", self.dir.display());
        }
        empty
    }
}

/// Sanitize free text into a short directory/file name
pub fn slugify(text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let slug = first_line
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "run".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Add rate-limiting to the HTTP API now please"),
            "add-rate-limiting-to-the-http-api"
        );
        assert_eq!(slugify("\n  Fix: auth/session bug!\nmore"), "fix-auth-session-bug");
        assert_eq!(slugify("???"), "run");
        assert_eq!(slugify("gpt_5 agent"), "gpt_5-agent");
    }

    #[test]
    fn test_run_dir_collision_suffix() {
        let root = tempfile::tempdir().unwrap();
        let a = RunStore::create(root.path(), None, "Same task", date()).unwrap();
        let b = RunStore::create(root.path(), None, "Same task", date()).unwrap();
        let c = RunStore::create(root.path(), None, "Same task", date()).unwrap();

        assert_eq!(a.run_id(), "2026-10-16-same-task");
        assert_eq!(b.run_id(), "2026-10-16-same-task-2");
        assert_eq!(c.run_id(), "2026-10-16-same-task-3");
        assert!(c.dir().is_dir());
    }

    #[test]
    fn test_explicit_run_id() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::create(root.path(), Some("My Run"), "ignored", date()).unwrap();
        assert_eq!(store.run_id(), "my-run");
    }

    #[test]
    fn test_artifact_names() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::create(root.path(), Some("r"), "", date()).unwrap();
        assert!(store.plan_path("codex").ends_with("plan-codex.md"));
        assert!(store
            .plan_attempt_path("codex", 3)
            .ends_with("plan-codex-attempt3.md"));
        assert!(store.judge_attempt_path(2).ends_with("judge-attempt2.md"));
    }

    #[test]
    fn test_save_snapshots_are_numbered() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::create(root.path(), Some("r"), "", date()).unwrap();
        let first = store.save_snapshot("one").unwrap();
        let second = store.save_snapshot("two").unwrap();
        assert!(first.ends_with("final-plan-1.md"));
        assert!(second.ends_with("final-plan-2.md"));
        assert_eq!(fs::read_to_string(first).unwrap(), "one");
    }

    #[test]
    fn test_accept_writes_both_files() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::create(root.path(), Some("r"), "", date()).unwrap();
        store.write_accepted("accepted plan").unwrap();
        assert_eq!(store.read_final_plan().as_deref(), Some("accepted plan"));
        assert_eq!(
            fs::read_to_string(store.accepted_path()).unwrap(),
            "accepted plan"
        );
    }

    #[test]
    fn test_metadata_persisted_and_reopened() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::create(root.path(), Some("r"), "", date()).unwrap();
        store
            .record_attempt(AttemptRecord {
                agent: "cx".to_string(),
                role: AttemptRole::Planner,
                attempt: 1,
                valid: false,
                timed_out: true,
                error: Some("timed out".to_string()),
                artifact: None,
                recorded_at: Utc::now(),
            })
            .unwrap();

        let reopened = RunStore::open(store.dir()).unwrap();
        let metadata = reopened.metadata();
        assert_eq!(metadata.attempts.len(), 1);
        assert!(metadata.attempts[0].timed_out);
    }

    #[test]
    fn test_remove_if_empty() {
        let root = tempfile::tempdir().unwrap();
        let empty = RunStore::create(root.path(), Some("empty"), "", date()).unwrap();
        assert!(empty.remove_if_empty());
        assert!(!empty.dir().exists());

        let used = RunStore::create(root.path(), Some("used"), "", date()).unwrap();
        used.write_final_plan("x").unwrap();
        assert!(!used.remove_if_empty());
        assert!(used.dir().exists());
    }
}
