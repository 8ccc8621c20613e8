//! On-disk config for the `perfgate` binary.
//!
//! ```json
//! {
//!   "numberOfPasses": 3,
//!   "assertions": [{"category": "performance", "severity": "blocking", "minScore": 0.9}],
//!   "build":   {"command": ["npm", "run", "build"], "artifact": "dist"},
//!   "measure": {"command": ["./scripts/lighthouse-score.sh"]},
//!   "publish": {"command": ["./scripts/deploy.sh"]}
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use perfgate_core::PipelineConfig;
use serde::{Deserialize, Serialize};

use crate::stage::CommandSpec;

/// Build command plus where it leaves the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(flatten)]
    pub run: CommandSpec,

    /// Output file or directory, relative to `workdir` when set.
    pub artifact: PathBuf,
}

/// Pipeline config together with the commands backing each collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiConfigFile {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,

    pub build: BuildSpec,

    pub measure: CommandSpec,

    pub publish: CommandSpec,
}

impl CiConfigFile {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: CiConfigFile = serde_json::from_str(raw).context("parse perfgate config")?;
        file.pipeline.validate().context("validate perfgate config")?;
        Ok(file)
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        Self::from_json_str(&raw).with_context(|| format!("load {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfgate_core::{AssertionConfig, Category};

    const SAMPLE: &str = r#"{
        "numberOfPasses": 5,
        "assertions": [
            {"category": "performance", "severity": "blocking", "minScore": 0.9},
            {"category": "accessibility", "severity": "advisory", "minScore": 0.8}
        ],
        "targetName": "staging",
        "timeouts": {"buildSecs": 60, "measureSecs": 30, "deploySecs": 45},
        "build": {"command": ["npm", "run", "build"], "artifact": "dist", "workdir": "site"},
        "measure": {"command": ["./score.sh"], "env": {"CHROME_PATH": "/usr/bin/chromium"}},
        "publish": {"command": ["./deploy.sh"]}
    }"#;

    #[test]
    fn test_parse_full_config() {
        let file = CiConfigFile::from_json_str(SAMPLE).expect("parse");
        assert_eq!(file.pipeline.number_of_passes, 5);
        assert_eq!(file.pipeline.target_name, "staging");
        assert_eq!(file.pipeline.timeouts.measure_secs, 30);
        assert_eq!(
            file.pipeline.assertions[0],
            AssertionConfig::blocking(Category::Performance, 0.9)
        );
        assert_eq!(file.build.artifact, PathBuf::from("dist"));
        assert_eq!(file.build.run.program(), "npm");
        assert_eq!(file.build.run.workdir, Some(PathBuf::from("site")));
        assert_eq!(file.measure.env["CHROME_PATH"], "/usr/bin/chromium");
    }

    #[test]
    fn test_invalid_pipeline_section_rejected() {
        let raw = SAMPLE.replace("\"numberOfPasses\": 5", "\"numberOfPasses\": 0");
        let err = CiConfigFile::from_json_str(&raw).unwrap_err();
        assert!(format!("{err:#}").contains("numberOfPasses"));
    }

    #[test]
    fn test_missing_publish_rejected() {
        let raw = r#"{
            "build": {"command": ["make"], "artifact": "out"},
            "measure": {"command": ["x"]}
        }"#;
        assert!(CiConfigFile::from_json_str(raw).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("perfgate.json");
        std::fs::write(&path, SAMPLE).expect("write");
        let file = CiConfigFile::load(&path).expect("load");
        assert_eq!(file.pipeline.measured_categories().len(), 2);
        assert!(CiConfigFile::load(&dir.path().join("missing.json")).is_err());
    }
}
