//! Planner configuration.
//!
//! Every field has a default matching the repository layout the planner was
//! written for, so the config file is optional and may be partial. Loading
//! validates the result before any pass runs.
use crate::changes::RetryPolicy;
use crate::environment::{standard_environments, EnvironmentRegistry, EnvironmentSpec};
use crate::error::{Result, ScopeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Token in `packager_command` replaced by the handler path.
pub const HANDLER_TOKEN: &str = "{handler}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    /// Pipeline document rewritten by every pass, relative to the repo root.
    pub workflow_path: PathBuf,
    /// Top-level directories scanned for deployment descriptors.
    pub code_paths: Vec<String>,
    pub descriptor_filenames: Vec<String>,
    pub handler_extension: String,
    pub layer_manifest: String,
    /// Depth (in path segments) of service-level layer manifests.
    pub layer_manifest_depth: usize,
    /// Command printing a handler's bundle, one path per line.
    pub packager_command: String,
    /// Integration branch ephemeral branches are diffed against.
    pub baseline_branch: String,
    pub ephemeral_suffix: String,
    pub github_api: String,
    /// Attempts for diff and pull-request lookups, first try included.
    pub diff_attempts: u32,
    /// Delay before the first retry; doubles after each failure.
    pub diff_retry_delay_ms: u64,
    pub default_environment: String,
    pub environments: Vec<EnvironmentSpec>,
    pub handlers: MatrixPassConfig,
    pub layers: MatrixPassConfig,
    pub ecs: EcsPassConfig,
    pub ci_tests: CiTestPassConfig,
}

/// Names used by a pass that fans a build/hold/deploy chain over a matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixPassConfig {
    pub flag: String,
    pub workflow: String,
    pub parameter: String,
    /// Job-name stem (`Code` gives `Code-Build`, `Dev-Code-Deploy`).
    pub stage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcsPassConfig {
    pub flag: String,
    pub workflow: String,
    /// Job definition cloned for every synthesized deploy job.
    pub template_job: String,
    pub dockerfile_parameter: String,
    pub default_dockerfile: String,
    pub default_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CiTestPassConfig {
    pub flag: String,
    pub workflow: String,
    pub job: String,
    pub parameter: String,
    /// Directory whose children are the testable services.
    pub services_dir: String,
    /// Prefix whose changes invalidate every service.
    pub shared_prefix: String,
    /// Branches on which every service is always tested.
    pub full_run_branches: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            workflow_path: PathBuf::from(".circleci/workflow.yml"),
            code_paths: vec!["services".to_string(), "example".to_string()],
            descriptor_filenames: vec![
                "deployment.yaml".to_string(),
                "deployment.yml".to_string(),
            ],
            handler_extension: ".py".to_string(),
            layer_manifest: "requirements.txt".to_string(),
            layer_manifest_depth: 3,
            packager_command: format!("python3.9 make_lambda_package.py -l {HANDLER_TOKEN}"),
            baseline_branch: "develop".to_string(),
            ephemeral_suffix: "_dev".to_string(),
            github_api: "https://api.github.com".to_string(),
            diff_attempts: 3,
            diff_retry_delay_ms: 500,
            default_environment: "dev".to_string(),
            environments: standard_environments(),
            handlers: MatrixPassConfig {
                flag: "run-code-build-deploy".to_string(),
                workflow: "code-build-deploy".to_string(),
                parameter: "lambdahandler".to_string(),
                stage: "Code".to_string(),
            },
            layers: MatrixPassConfig {
                flag: "run-layer-build-deploy".to_string(),
                workflow: "layer-build-deploy".to_string(),
                parameter: "requirements_file".to_string(),
                stage: "Layer".to_string(),
            },
            ecs: EcsPassConfig::default(),
            ci_tests: CiTestPassConfig::default(),
        }
    }
}

impl Default for EcsPassConfig {
    fn default() -> Self {
        Self {
            flag: "run-ecs-build-deploy".to_string(),
            workflow: "ecs-build-deploy".to_string(),
            template_job: "ecs-deploy".to_string(),
            dockerfile_parameter: "DOCKER_FILE".to_string(),
            default_dockerfile: "Dockerfile".to_string(),
            default_tag: "latest".to_string(),
        }
    }
}

impl Default for CiTestPassConfig {
    fn default() -> Self {
        Self {
            flag: "run-ci-test-pipeline".to_string(),
            workflow: "ci-test-pipeline".to_string(),
            job: "Code-Test".to_string(),
            parameter: "services".to_string(),
            services_dir: "services".to_string(),
            shared_prefix: "commons/".to_string(),
            full_run_branches: vec!["staging".to_string(), "master".to_string()],
        }
    }
}

impl ScopeConfig {
    /// Build the environment registry described by this config.
    pub fn registry(&self) -> Result<EnvironmentRegistry> {
        EnvironmentRegistry::new(self.environments.clone(), &self.default_environment)
    }

    pub fn diff_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.diff_attempts,
            initial_delay: Duration::from_millis(self.diff_retry_delay_ms),
        }
    }
}

/// Load a config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ScopeConfig> {
    let Some(path) = path else {
        return Ok(ScopeConfig::default());
    };
    let bytes =
        fs::read(path).map_err(|err| ScopeError::io(format!("read {}", path.display()), err))?;
    let config: ScopeConfig = serde_json::from_slice(&bytes).map_err(|err| {
        ScopeError::Config(format!("parse {}: {err}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs that would make a pass silently do nothing.
pub fn validate_config(config: &ScopeConfig) -> Result<()> {
    let mut required = BTreeMap::new();
    required.insert("handler_extension", &config.handler_extension);
    required.insert("layer_manifest", &config.layer_manifest);
    required.insert("packager_command", &config.packager_command);
    required.insert("baseline_branch", &config.baseline_branch);
    required.insert("ephemeral_suffix", &config.ephemeral_suffix);
    required.insert("github_api", &config.github_api);
    required.insert("ecs.template_job", &config.ecs.template_job);
    for (label, value) in required {
        if value.trim().is_empty() {
            return Err(ScopeError::Config(format!("{label} must be non-empty")));
        }
    }
    if config.descriptor_filenames.is_empty() {
        return Err(ScopeError::Config(
            "descriptor_filenames must list at least one name".to_string(),
        ));
    }
    if config.diff_attempts == 0 {
        return Err(ScopeError::Config("diff_attempts must be at least 1".to_string()));
    }
    if config.layer_manifest_depth == 0 {
        return Err(ScopeError::Config("layer_manifest_depth must be at least 1".to_string()));
    }
    for code_path in &config.code_paths {
        let path = Path::new(code_path);
        if path.is_absolute()
            || path
                .components()
                .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            return Err(ScopeError::Config(format!(
                "code_paths entries must be relative paths without '..' (got {code_path:?})"
            )));
        }
    }
    shell_words::split(&config.packager_command).map_err(|err| {
        ScopeError::Config(format!(
            "packager_command is not a valid command line: {err}"
        ))
    })?;
    config.registry()?;
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
