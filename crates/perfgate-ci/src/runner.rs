//! Process execution and the command-backed collaborators.
//!
//! Children are spawned with `kill_on_drop`, so when the pipeline drops a
//! stage future on timeout or abort the process goes with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use perfgate_core::{Category, MetricSample};
use perfgate_state::{ArtifactRef, ContentDigest};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::debug;

use crate::collaborators::{
    Builder, CollaboratorError, DeployResult, MeasurementEngine, Publisher,
};
use crate::config::BuildSpec;
use crate::stage::{CommandSpec, StageKind};

/// Captured result of one command execution.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: StageKind,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl StageOutput {
    /// Turn a non-zero exit into `NonZeroExit`.
    pub fn into_success(self, spec: &CommandSpec) -> Result<Self, CollaboratorError> {
        if self.success {
            return Ok(self);
        }
        Err(CollaboratorError::NonZeroExit {
            program: spec.program().to_string(),
            code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs a [`CommandSpec`] and captures its output.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute `spec` with `env` added on top of the spec's own environment.
    ///
    /// No timeout is applied here; the pipeline bounds every stage.
    pub async fn execute(
        stage: StageKind,
        spec: &CommandSpec,
        env: &[(&str, String)],
    ) -> Result<StageOutput, CollaboratorError> {
        let start = Instant::now();

        let Some((exe, args)) = spec.command.split_first() else {
            return Err(CollaboratorError::EmptyCommand {
                stage: stage.name().to_string(),
            });
        };

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .envs(&spec.env)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }

        debug!(stage = stage.name(), program = %exe, "spawning stage command");
        let child = cmd.spawn().map_err(|source| CollaboratorError::Spawn {
            program: exe.clone(),
            source,
        })?;
        let output = child.wait_with_output().await?;

        Ok(StageOutput {
            stage,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}

// ---------------------------------------------------------------------------
// Artifact digests
// ---------------------------------------------------------------------------

/// SHA-256 of a file, or of a directory tree.
///
/// Directories hash every regular file's relative path and contents in
/// sorted path order, so the digest is independent of traversal order.
pub fn digest_path(path: &Path) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    if path.is_dir() {
        let mut files = Vec::new();
        collect_files(path, &mut files)?;
        files.sort();
        for file in files {
            let rel = file.strip_prefix(path).unwrap_or(&file);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(std::fs::read(&file)?);
        }
    } else {
        hasher.update(std::fs::read(path)?);
    }
    Ok(ContentDigest::from_hasher(hasher))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Runs the build command, then digests the artifact path it produced.
///
/// The child sees `PERFGATE_REVISION`.
pub struct CommandBuilder {
    spec: BuildSpec,
}

impl CommandBuilder {
    pub fn new(spec: BuildSpec) -> Self {
        Self { spec }
    }

    fn artifact_path(&self) -> PathBuf {
        match &self.spec.run.workdir {
            Some(dir) if self.spec.artifact.is_relative() => dir.join(&self.spec.artifact),
            _ => self.spec.artifact.clone(),
        }
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(&self, revision: &str) -> Result<ArtifactRef, CollaboratorError> {
        let env = [("PERFGATE_REVISION", revision.to_string())];
        CommandRunner::execute(StageKind::Build, &self.spec.run, &env)
            .await?
            .into_success(&self.spec.run)?;

        let path = self.artifact_path();
        let hashed = path.clone();
        let digest = tokio::task::spawn_blocking(move || digest_path(&hashed))
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("digest task failed: {e}")))?
            .map_err(|e| {
                CollaboratorError::InvalidOutput(format!(
                    "artifact {} unreadable: {e}",
                    path.display()
                ))
            })?;

        Ok(ArtifactRef::new(digest, path.display().to_string()))
    }
}

/// Parse a measurement command's stdout: a bare number or `{"score": x}`.
pub fn parse_score(stdout: &str) -> Result<f64, CollaboratorError> {
    let trimmed = stdout.trim();
    if let Ok(score) = trimmed.parse::<f64>() {
        return Ok(score);
    }
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| v.get("score").and_then(serde_json::Value::as_f64))
        .ok_or_else(|| CollaboratorError::InvalidOutput(format!("no score in {trimmed:?}")))
}

/// Runs the measurement command once per (category, pass).
///
/// The child sees `PERFGATE_ARTIFACT`, `PERFGATE_ARTIFACT_DIGEST`,
/// `PERFGATE_CATEGORY` and `PERFGATE_PASS`.
pub struct CommandMeasurer {
    spec: CommandSpec,
}

impl CommandMeasurer {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl MeasurementEngine for CommandMeasurer {
    async fn measure(
        &self,
        artifact: &ArtifactRef,
        category: &Category,
        pass: u32,
    ) -> Result<MetricSample, CollaboratorError> {
        let env = [
            ("PERFGATE_ARTIFACT", artifact.location.clone()),
            ("PERFGATE_ARTIFACT_DIGEST", artifact.digest.to_string()),
            ("PERFGATE_CATEGORY", category.to_string()),
            ("PERFGATE_PASS", pass.to_string()),
        ];
        let output = CommandRunner::execute(StageKind::Measure, &self.spec, &env)
            .await?
            .into_success(&self.spec)?;
        let score = parse_score(&output.stdout)?;
        MetricSample::new(category.clone(), score, pass)
            .map_err(|e| CollaboratorError::InvalidOutput(e.to_string()))
    }
}

/// Runs the publish command; the last non-empty stdout line is the
/// deployment id.
///
/// The child sees `PERFGATE_ARTIFACT` and `PERFGATE_TARGET`.
pub struct CommandPublisher {
    spec: CommandSpec,
}

impl CommandPublisher {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactRef,
        target: &str,
    ) -> Result<DeployResult, CollaboratorError> {
        let env = [
            ("PERFGATE_ARTIFACT", artifact.location.clone()),
            ("PERFGATE_ARTIFACT_DIGEST", artifact.digest.to_string()),
            ("PERFGATE_TARGET", target.to_string()),
        ];
        let output = CommandRunner::execute(StageKind::Deploy, &self.spec, &env)
            .await?
            .into_success(&self.spec)?;
        let deployment_id = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| {
                CollaboratorError::InvalidOutput("publisher printed no deployment id".to_string())
            })?;
        Ok(DeployResult {
            deployment_id: deployment_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script])
    }

    #[test]
    fn test_parse_score_accepts_number_and_json() {
        assert_eq!(parse_score("0.93\n").expect("number"), 0.93);
        assert_eq!(parse_score(r#"{"score": 0.5, "runs": 1}"#).expect("json"), 0.5);
        assert!(parse_score("lighthouse crashed").is_err());
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = CommandRunner::execute(StageKind::Build, &sh("echo hello"), &[])
            .await
            .expect("execute failed");
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = sh("echo boom >&2; exit 3");
        let result = CommandRunner::execute(StageKind::Build, &spec, &[])
            .await
            .expect("execute failed");
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        let err = result.into_success(&spec).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_execute_empty_command() {
        let spec = CommandSpec::new(Vec::<String>::new());
        let err = CommandRunner::execute(StageKind::Deploy, &spec, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::EmptyCommand { .. }));
    }

    #[tokio::test]
    async fn test_execute_passes_env() {
        let result = CommandRunner::execute(
            StageKind::Measure,
            &sh("echo $PERFGATE_CATEGORY"),
            &[("PERFGATE_CATEGORY", "seo".to_string())],
        )
        .await
        .expect("execute");
        assert_eq!(result.stdout.trim(), "seo");
    }

    #[test]
    fn test_directory_digest_ignores_creation_order() {
        let a = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(a.path().join("assets")).expect("mkdir");
        std::fs::write(a.path().join("index.html"), "<h1>hi</h1>").expect("write");
        std::fs::write(a.path().join("assets/app.js"), "run()").expect("write");

        let b = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(b.path().join("assets")).expect("mkdir");
        std::fs::write(b.path().join("assets/app.js"), "run()").expect("write");
        std::fs::write(b.path().join("index.html"), "<h1>hi</h1>").expect("write");

        assert_eq!(
            digest_path(a.path()).expect("digest a"),
            digest_path(b.path()).expect("digest b")
        );

        std::fs::write(b.path().join("index.html"), "<h1>bye</h1>").expect("write");
        assert_ne!(
            digest_path(a.path()).expect("digest a"),
            digest_path(b.path()).expect("digest b")
        );
    }

    #[test]
    fn test_file_digest_matches_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("bundle.tar");
        std::fs::write(&file, b"bundle").expect("write");
        assert_eq!(
            digest_path(&file).expect("digest"),
            ContentDigest::from_bytes(b"bundle")
        );
    }

    #[tokio::test]
    async fn test_command_builder_digests_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = BuildSpec {
            run: sh("mkdir -p dist && echo $PERFGATE_REVISION > dist/rev.txt").in_dir(dir.path()),
            artifact: PathBuf::from("dist"),
        };
        let artifact = CommandBuilder::new(spec).build("abc123").await.expect("build");
        assert!(artifact.location.ends_with("dist"));
        let rev = std::fs::read_to_string(dir.path().join("dist/rev.txt")).expect("read");
        assert_eq!(rev.trim(), "abc123");
        assert_eq!(
            artifact.digest,
            digest_path(&dir.path().join("dist")).expect("digest")
        );
    }

    #[tokio::test]
    async fn test_command_measurer_builds_sample() {
        let measurer = CommandMeasurer::new(sh(r#"echo "{\"score\": 0.$PERFGATE_PASS}""#));
        let artifact = ArtifactRef::new(ContentDigest::from_bytes(b"x"), "dist");
        let sample = measurer
            .measure(&artifact, &Category::Performance, 7)
            .await
            .expect("measure");
        assert_eq!(sample.score(), 0.7);
        assert_eq!(sample.pass_index(), 7);
        assert_eq!(sample.category(), &Category::Performance);
    }

    #[tokio::test]
    async fn test_command_measurer_rejects_out_of_range() {
        let measurer = CommandMeasurer::new(sh("echo 97"));
        let artifact = ArtifactRef::new(ContentDigest::from_bytes(b"x"), "dist");
        let err = measurer
            .measure(&artifact, &Category::Seo, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_command_publisher_takes_last_line() {
        let publisher =
            CommandPublisher::new(sh("echo uploading; echo dpl_$PERFGATE_TARGET; echo"));
        let artifact = ArtifactRef::new(ContentDigest::from_bytes(b"x"), "dist");
        let result = publisher.publish(&artifact, "staging").await.expect("publish");
        assert_eq!(result.deployment_id, "dpl_staging");
    }
}
