//! Stage kinds and command definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use perfgate_core::StageTimeouts;
use serde::{Deserialize, Serialize};

/// Stages that talk to an external system and therefore carry a timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Build,
    /// One measurement pass.
    Measure,
    Deploy,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Build => "build",
            StageKind::Measure => "measure",
            StageKind::Deploy => "deploy",
        }
    }

    /// Time limit for one invocation of this stage.
    pub fn limit(&self, timeouts: &StageTimeouts) -> Duration {
        match self {
            StageKind::Build => timeouts.build(),
            StageKind::Measure => timeouts.measure(),
            StageKind::Deploy => timeouts.deploy(),
        }
    }
}

/// An external command a collaborator runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Program followed by its arguments.
    pub command: Vec<String>,

    /// Extra environment for the child.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Working directory; defaults to the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            workdir: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Program name for error messages.
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::Build.name(), "build");
        assert_eq!(StageKind::Measure.name(), "measure");
        assert_eq!(StageKind::Deploy.name(), "deploy");
    }

    #[test]
    fn test_stage_limits_follow_config() {
        let timeouts = StageTimeouts {
            build_secs: 10,
            measure_secs: 2,
            deploy_secs: 5,
        };
        assert_eq!(StageKind::Build.limit(&timeouts), Duration::from_secs(10));
        assert_eq!(StageKind::Measure.limit(&timeouts), Duration::from_secs(2));
        assert_eq!(StageKind::Deploy.limit(&timeouts), Duration::from_secs(5));
    }

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new(["npm", "run", "build"])
            .with_env("NODE_ENV", "production")
            .in_dir("/srv/site");
        assert_eq!(spec.program(), "npm");
        assert_eq!(spec.command.len(), 3);
        assert_eq!(spec.env["NODE_ENV"], "production");
        assert!(spec.workdir.is_some());
    }

    #[test]
    fn test_command_spec_serde_defaults() {
        let spec: CommandSpec =
            serde_json::from_str(r#"{"command":["./deploy.sh"]}"#).expect("deserialize");
        assert!(spec.env.is_empty());
        assert!(spec.workdir.is_none());
        assert_eq!(CommandSpec::new(Vec::<String>::new()).program(), "");
    }
}
