//! The build pipeline.
//!
//! One run takes resolved CMS data all the way to a published site:
//!
//! ```text
//! 1. Export    data        →  <export_dir>/*.json + snapshot
//! 2. Install   package.json →  node_modules/      (only when needed)
//! 3. Build     site_dir    →  <site_dir>/<site_output>/
//! 4. Publish   site_output →  <publish_dir>/      (staged swap)
//! ```
//!
//! Each step aborts the run on failure; nothing is retried. Filesystem
//! steps run on the blocking pool, child processes go through the
//! injected [`ProcessRunner`].

use crate::config::Config;
use crate::deps;
use crate::export::{self, ExportError, ExportSummary, ExportTarget};
use crate::publish::{self, PublishSummary};
use crate::runner::{ProcessOutput, ProcessRunner, RunOptions, RunnerError};
use crate::types::CmsData;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of output lines kept in failure messages.
const TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("dependency install failed: {0}")]
    DependencyInstall(StepError),
    #[error("build command failed: {0}")]
    BuildCommand(StepError),
    #[error("build produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("publish failed: {0}")]
    Publish(#[source] std::io::Error),
    #[error("pipeline aborted: {0}")]
    Aborted(String),
}

/// Why an external step failed.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("`{command}` exited with {}:\n{tail}", exit_label(.code))]
    Exit {
        command: String,
        code: Option<i32>,
        tail: String,
    },
    #[error("filesystem check failed: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// Everything a successful run did.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub export: ExportSummary,
    pub installed: bool,
    pub published: PublishSummary,
    pub publish_dir: PathBuf,
    pub duration: Duration,
}

/// Paths and commands a pipeline run needs, cut from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub export: ExportTarget,
    pub site_dir: PathBuf,
    pub build_output: PathBuf,
    pub dependency_dir: PathBuf,
    pub publish_dir: PathBuf,
    pub install_command: String,
    pub build_command: String,
    pub timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let paths = &config.paths;
        Self {
            export: ExportTarget {
                export_dir: paths.export_dir.clone(),
                snapshot_file: paths.snapshot_file.clone(),
            },
            site_dir: paths.site_dir.clone(),
            build_output: paths.build_output(),
            dependency_dir: paths.site_dir.join(&config.build.dependency_dir),
            publish_dir: paths.publish_dir.clone(),
            install_command: config.build.install_command.clone(),
            build_command: config.build.build_command.clone(),
            timeout: config.build.timeout(),
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            cwd: self.site_dir.clone(),
            timeout: self.timeout,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    runner: Arc<dyn ProcessRunner>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            settings: Arc::new(settings),
            runner,
        }
    }

    /// Step 1 alone: write artifacts and snapshot.
    pub async fn export(&self, data: CmsData) -> Result<ExportSummary, BuildError> {
        let target = self.settings.export.clone();
        let summary = tokio::task::spawn_blocking(move || export::export(data, &target))
            .await
            .map_err(|e| BuildError::Aborted(e.to_string()))??;
        Ok(summary)
    }

    /// Run all four steps.
    pub async fn run(&self, data: CmsData) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let s = &self.settings;

        let export = self.export(data).await?;
        info!(
            artifacts = export.artifacts.len(),
            dir = %s.export.export_dir.display(),
            "exported CMS data"
        );

        let installed = self.ensure_dependencies().await?;

        remove_stale_output(&s.build_output).map_err(|e| BuildError::BuildCommand(e.into()))?;
        let output = self
            .run_step(&s.build_command)
            .await
            .map_err(BuildError::BuildCommand)?;
        log_output(&s.build_command, &output);
        if !s.build_output.is_dir() {
            return Err(BuildError::MissingOutput(s.build_output.clone()));
        }

        let src = s.build_output.clone();
        let dst = s.publish_dir.clone();
        let published = tokio::task::spawn_blocking(move || publish::publish(&src, &dst))
            .await
            .map_err(|e| BuildError::Aborted(e.to_string()))?
            .map_err(BuildError::Publish)?;
        info!(
            files = published.files,
            bytes = published.bytes,
            dir = %s.publish_dir.display(),
            "published site"
        );

        Ok(BuildReport {
            export,
            installed,
            published,
            publish_dir: s.publish_dir.clone(),
            duration: started.elapsed(),
        })
    }

    /// Step 2. Returns whether the install command ran.
    async fn ensure_dependencies(&self) -> Result<bool, BuildError> {
        let s = &self.settings;
        let needed = deps::needs_install(&s.site_dir, &s.dependency_dir)
            .map_err(|e| BuildError::DependencyInstall(e.into()))?;
        if !needed {
            debug!(dir = %s.dependency_dir.display(), "dependencies up to date");
            return Ok(false);
        }

        info!(command = %s.install_command, "installing site dependencies");
        let output = self
            .run_step(&s.install_command)
            .await
            .map_err(BuildError::DependencyInstall)?;
        log_output(&s.install_command, &output);
        if let Err(e) = deps::write_stamp(&s.site_dir, &s.dependency_dir) {
            warn!(error = %e, "could not write install stamp");
        }
        Ok(true)
    }

    /// Run one command and turn a non-zero exit into an error.
    async fn run_step(&self, command: &str) -> Result<ProcessOutput, StepError> {
        info!(command, cwd = %self.settings.site_dir.display(), "running");
        let output = self
            .runner
            .run(command, &self.settings.run_options())
            .await?;
        if output.success() {
            Ok(output)
        } else {
            log_output(command, &output);
            Err(StepError::Exit {
                command: command.to_string(),
                code: output.exit_code,
                tail: output.tail(TAIL_LINES),
            })
        }
    }
}

fn remove_stale_output(path: &std::path::Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn log_output(command: &str, output: &ProcessOutput) {
    for line in output.stdout.lines() {
        debug!(target: "cms_rebuild::child", command, "{line}");
    }
    for line in output.stderr.lines() {
        if output.success() {
            debug!(target: "cms_rebuild::child", command, "{line}");
        } else {
            warn!(target: "cms_rebuild::child", command, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::MockRunner;
    use crate::test_helpers::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn run_exports_builds_and_publishes() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        let runner = Arc::new(MockRunner::new("build", &settings.build_output));
        let pipeline = Pipeline::new(settings.clone(), runner.clone());

        let report = pipeline.run(sample_data()).await.unwrap();

        assert_eq!(
            read_json(&settings.export.export_dir.join("pages.json")),
            json!([{"id": 1}])
        );
        assert_eq!(
            read_json(&settings.export.export_dir.join("settings.json")),
            json!({"siteTitle": "X"})
        );
        assert!(settings.publish_dir.join("index.html").exists());
        assert_eq!(report.published.files, 1);
        // No node_modules yet, so install ran before build
        assert!(report.installed);
        let commands: Vec<String> = runner.calls().into_iter().map(|c| c.command).collect();
        assert_eq!(commands, vec!["install", "build"]);
        assert!(runner.calls().iter().all(|c| c.cwd == settings.site_dir));
    }

    #[tokio::test]
    async fn install_skipped_when_dependencies_present() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        fs::create_dir_all(&settings.dependency_dir).unwrap();
        let runner = Arc::new(MockRunner::new("build", &settings.build_output));
        let pipeline = Pipeline::new(settings, runner.clone());

        let report = pipeline.run(sample_data()).await.unwrap();

        assert!(!report.installed);
        assert_eq!(runner.count("install"), 0);
        assert_eq!(runner.count("build"), 1);
    }

    #[tokio::test]
    async fn install_failure_skips_build() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        let runner = Arc::new(MockRunner::new("build", &settings.build_output).fail("install", 1));
        let pipeline = Pipeline::new(settings, runner.clone());

        let result = pipeline.run(sample_data()).await;

        assert!(matches!(result, Err(BuildError::DependencyInstall(_))));
        assert_eq!(runner.count("build"), 0);
    }

    #[tokio::test]
    async fn build_failure_keeps_published_site() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        fs::create_dir_all(&settings.dependency_dir).unwrap();
        fs::create_dir_all(&settings.publish_dir).unwrap();
        fs::write(settings.publish_dir.join("index.html"), "live").unwrap();
        let runner = Arc::new(MockRunner::new("build", &settings.build_output).fail("build", 2));
        let pipeline = Pipeline::new(settings.clone(), runner);

        let err = pipeline.run(sample_data()).await.unwrap_err();

        assert!(matches!(
            err,
            BuildError::BuildCommand(StepError::Exit { code: Some(2), .. })
        ));
        assert!(err.to_string().contains("build failed"));
        assert_eq!(
            fs::read_to_string(settings.publish_dir.join("index.html")).unwrap(),
            "live"
        );
    }

    #[tokio::test]
    async fn build_timeout_is_build_failure() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        fs::create_dir_all(&settings.dependency_dir).unwrap();
        fs::create_dir_all(&settings.publish_dir).unwrap();
        fs::write(settings.publish_dir.join("index.html"), "live").unwrap();
        let runner = Arc::new(MockRunner::new("build", &settings.build_output).time_out("build"));
        let pipeline = Pipeline::new(settings.clone(), runner);

        let err = pipeline.run(sample_data()).await.unwrap_err();

        assert!(matches!(
            err,
            BuildError::BuildCommand(StepError::Runner(RunnerError::TimedOut { ref command, .. }))
                if command == "build"
        ));
        assert!(err.to_string().contains("timed out after 5s"));
        assert_eq!(
            fs::read_to_string(settings.publish_dir.join("index.html")).unwrap(),
            "live"
        );
    }

    #[tokio::test]
    async fn missing_output_is_failure() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        fs::create_dir_all(&settings.dependency_dir).unwrap();
        // Build "succeeds" but writes nowhere
        let mut runner = MockRunner::new("build", &settings.build_output);
        runner.build_output = None;
        let pipeline = Pipeline::new(settings.clone(), Arc::new(runner));

        let result = pipeline.run(sample_data()).await;

        assert!(matches!(result, Err(BuildError::MissingOutput(p)) if p == settings.build_output));
        assert!(!settings.publish_dir.exists());
    }

    #[tokio::test]
    async fn stale_output_does_not_mask_missing_output() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        fs::create_dir_all(&settings.dependency_dir).unwrap();
        fs::create_dir_all(&settings.build_output).unwrap();
        fs::write(settings.build_output.join("index.html"), "old build").unwrap();
        let mut runner = MockRunner::new("build", &settings.build_output);
        runner.build_output = None;
        let pipeline = Pipeline::new(settings, Arc::new(runner));

        assert!(matches!(
            pipeline.run(sample_data()).await,
            Err(BuildError::MissingOutput(_))
        ));
    }

    #[tokio::test]
    async fn export_only_writes_artifacts() {
        let tmp = TempDir::new().unwrap();
        let settings = test_settings(tmp.path());
        let runner = Arc::new(MockRunner::new("build", &settings.build_output));
        let pipeline = Pipeline::new(settings.clone(), runner.clone());

        let summary = pipeline.export(sample_data()).await.unwrap();

        assert_eq!(summary.artifacts.len(), 4);
        assert!(settings.export.snapshot_file.exists());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn settings_from_config_joins_site_paths() {
        let config = Config::default().resolve_paths(std::path::Path::new("/srv/cms"));
        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.build_output, PathBuf::from("/srv/cms/site/dist"));
        assert_eq!(
            settings.dependency_dir,
            PathBuf::from("/srv/cms/site/node_modules")
        );
        assert_eq!(
            settings.export.snapshot_file,
            PathBuf::from("/srv/cms/data/cms-snapshot.json")
        );
    }
}
