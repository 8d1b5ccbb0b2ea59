mod defaults;
mod types;

pub use defaults::*;
pub use types::*;

use crate::council::anonymize::collides_with_redaction;
use crate::error::ConfigError;
use crate::provider::Agent;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

impl TaskSpec {
    /// Load a task specification (YAML or JSON)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let spec: TaskSpec = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task.trim().is_empty() {
            return Err(ConfigError::EmptyTask);
        }
        Ok(())
    }
}

impl AgentsConfig {
    /// Load the per-user agents file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Planners plus the judge, each bound to its kind strategy.
#[derive(Debug, Clone)]
pub struct Roster {
    pub planners: Vec<Agent>,
    pub judge: Agent,
}

impl Roster {
    /// Validate descriptors and fabricate the judge from the first planner if none is set.
    pub fn from_config(config: AgentsConfig, source: &Path) -> Result<Self, ConfigError> {
        if config.planners.is_empty() {
            return Err(ConfigError::NoPlanners(source.to_path_buf()));
        }

        let mut seen = HashSet::new();
        for (idx, descriptor) in config.planners.iter().enumerate() {
            check_descriptor(idx, descriptor)?;
            if !seen.insert(descriptor.name.as_str()) {
                return Err(ConfigError::DuplicateAgent(descriptor.name.clone()));
            }
        }

        let judge = match config.judge {
            Some(judge) => {
                check_descriptor(config.planners.len(), &judge)?;
                judge
            }
            None => {
                let judge = config.planners[0].clone();
                info!("No judge configured, using planner '{}' as judge", judge.name);
                judge
            }
        };

        Ok(Self {
            planners: config.planners.into_iter().map(Agent::new).collect(),
            judge: Agent::new(judge),
        })
    }

    /// Inline agents from the task spec win over the agents file.
    pub fn load(task: &TaskSpec, agents_path: &Path) -> Result<Self, ConfigError> {
        if let Some(agents) = task.agents.clone() {
            if !agents.planners.is_empty() {
                debug!("Using {} inline planners", agents.planners.len());
                return Self::from_config(agents, Path::new("<task spec>"));
            }
        }

        if !agents_path.exists() {
            return Err(ConfigError::NoPlanners(agents_path.to_path_buf()));
        }
        debug!("Loading agents from {}", agents_path.display());
        Self::from_config(AgentsConfig::load(agents_path)?, agents_path)
    }

    pub fn planner_names(&self) -> Vec<String> {
        self.planners.iter().map(|a| a.name().to_string()).collect()
    }
}

fn check_descriptor(idx: usize, descriptor: &AgentDescriptor) -> Result<(), ConfigError> {
    if descriptor.name.trim().is_empty() {
        return Err(ConfigError::EmptyAgentName(idx));
    }
    if collides_with_redaction(&descriptor.name) {
        return Err(ConfigError::ReservedAgentName(descriptor.name.clone()));
    }
    if descriptor.kind == AgentKind::Command && descriptor.binary.is_none() {
        return Err(ConfigError::MissingBinary(descriptor.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_task_spec_yaml() {
        let yaml = r#"
task: Add rate limiting to the API
constraints:
  - no new services
  - keep p99 under 50ms
repoContext:
  root: /srv/api
  paths: [src/http]
  notes: axum based
runLabel: rate limits
agents:
  planners:
    - name: cx
      kind: codex
      model: gpt-5-codex
      reasoningEffort: high
    - name: cl
      kind: claude
      promptMode: stdin
"#;
        let spec: TaskSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.constraints.len(), 2);
        assert_eq!(spec.run_label.as_deref(), Some("rate limits"));
        let repo = spec.repo_context.unwrap();
        assert_eq!(repo.paths, vec![PathBuf::from("src/http")]);

        let agents = spec.agents.unwrap();
        assert_eq!(agents.planners[0].reasoning_effort.as_deref(), Some("high"));
        assert_eq!(agents.planners[1].prompt_mode, Some(PromptMode::Stdin));
    }

    #[test]
    fn test_parse_task_spec_json() {
        let json = r#"{"task": "t", "constraints": ["a"], "runId": "fixed"}"#;
        let spec: TaskSpec = serde_yaml::from_str(json).unwrap();
        assert_eq!(spec.run_id.as_deref(), Some("fixed"));
    }

    #[test]
    fn test_judge_fabricated_from_first_planner() {
        let config = AgentsConfig {
            planners: vec![
                AgentDescriptor::new("first", AgentKind::Codex),
                AgentDescriptor::new("second", AgentKind::Gemini),
            ],
            judge: None,
        };
        let roster = Roster::from_config(config, Path::new("agents.yaml")).unwrap();
        assert_eq!(roster.judge.name(), "first");
        assert_eq!(roster.judge.kind(), AgentKind::Codex);
        assert_eq!(roster.planner_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_roster_rejects_duplicates_and_empty() {
        let config = AgentsConfig {
            planners: vec![
                AgentDescriptor::new("same", AgentKind::Codex),
                AgentDescriptor::new("same", AgentKind::Claude),
            ],
            judge: None,
        };
        assert!(matches!(
            Roster::from_config(config, Path::new("x")),
            Err(ConfigError::DuplicateAgent(_))
        ));

        assert!(matches!(
            Roster::from_config(AgentsConfig::default(), Path::new("x")),
            Err(ConfigError::NoPlanners(_))
        ));
    }

    #[test]
    fn test_command_kind_needs_binary() {
        let config = AgentsConfig {
            planners: vec![AgentDescriptor::new("custom", AgentKind::Command)],
            judge: None,
        };
        assert!(matches!(
            Roster::from_config(config, Path::new("x")),
            Err(ConfigError::MissingBinary(_))
        ));
    }

    #[test]
    fn test_names_matching_redaction_marker_rejected() {
        for name in ["redacted", "[redacted]"] {
            let config = AgentsConfig {
                planners: vec![AgentDescriptor::new(name, AgentKind::Codex)],
                judge: None,
            };
            assert!(matches!(
                Roster::from_config(config, Path::new("x")),
                Err(ConfigError::ReservedAgentName(n)) if n == name
            ));
        }

        let config = AgentsConfig {
            planners: vec![AgentDescriptor::new("cx", AgentKind::Codex)],
            judge: Some(AgentDescriptor::new("Redacted", AgentKind::Claude)),
        };
        assert!(matches!(
            Roster::from_config(config, Path::new("x")),
            Err(ConfigError::ReservedAgentName(_))
        ));
    }

    #[test]
    fn test_agents_file_roundtrip_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agents.yaml");
        let config = AgentsConfig {
            planners: vec![AgentDescriptor::new("cx", AgentKind::Codex)],
            judge: Some(AgentDescriptor::new("cl", AgentKind::Claude)),
        };
        config.save(&path).unwrap();

        let task = TaskSpec {
            task: "t".to_string(),
            ..Default::default()
        };
        let roster = Roster::load(&task, &path).unwrap();
        assert_eq!(roster.judge.name(), "cl");

        let missing = dir.path().join("none.yaml");
        assert!(matches!(
            Roster::load(&task, &missing),
            Err(ConfigError::NoPlanners(_))
        ));
    }

    #[test]
    fn test_empty_task_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.yaml");
        std::fs::write(&path, "task: '  '\n").unwrap();
        assert!(matches!(TaskSpec::load(&path), Err(ConfigError::EmptyTask)));
    }
}
