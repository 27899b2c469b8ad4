//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// CI variables a developer shell may carry that would leak into a run.
const EVENT_VARS: &[&str] = &[
    "CIRCLE_BRANCH",
    "CIRCLE_SHA1",
    "CIRCLE_PULL_REQUEST",
    "CIRCLE_PROJECT_USERNAME",
    "CIRCLE_PROJECT_REPONAME",
    "GITHUB_TOKEN",
    "RUST_LOG",
];

/// Workflow document with every slot the default config expects for dev.
pub const WORKFLOW: &str = "\
version: 2.1
parameters:
  run-code-build-deploy:
    type: boolean
    default: false
  run-layer-build-deploy:
    type: boolean
    default: false
  run-ecs-build-deploy:
    type: boolean
    default: false
jobs:
  ecs-deploy:
    parameters:
      DOCKER_FILE:
        type: string
        default: Dockerfile
    steps:
    - checkout
workflows:
  code-build-deploy:
    jobs:
    - Code-Build:
        matrix:
          parameters:
            lambdahandler: []
    - Dev-Hold:
        type: approval
        matrix:
          parameters:
            lambdahandler: []
    - Dev-Code-Deploy:
        matrix:
          parameters:
            lambdahandler: []
  layer-build-deploy:
    jobs:
    - Layer-Build:
        matrix:
          parameters:
            requirements_file: []
    - Dev-Hold:
        type: approval
        matrix:
          parameters:
            requirements_file: []
    - Dev-Layer-Deploy:
        matrix:
          parameters:
            requirements_file: []
  ecs-build-deploy:
    jobs:
    - ecs-lint
";

/// Result from one `ci-scope` invocation.
#[derive(Debug)]
pub struct RunOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Lines of stdout starting with `label: `, label stripped.
    pub fn reported(&self, label: &str) -> Vec<String> {
        let prefix = format!("{label}: ");
        self.stdout
            .lines()
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .map(str::to_string)
            .collect()
    }
}

/// Scratch repository holding a workflow document and source tree.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let workspace = Self { dir };
        workspace.write(".circleci/workflow.yml", WORKFLOW);
        workspace
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read file")
    }

    /// Parsed workflow document after a run.
    pub fn workflow(&self) -> serde_yaml::Value {
        serde_yaml::from_str(&self.read(".circleci/workflow.yml")).expect("parse workflow")
    }

    /// `ci-scope <args>` in this workspace with `envs` as the only CI variables.
    pub fn command(&self, args: &[&str], envs: &[(&str, &str)]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_ci-scope"));
        command.args(args).arg("--repo-root").arg(self.root());
        for var in EVENT_VARS {
            command.env_remove(var);
        }
        command.envs(envs.iter().copied());
        command
    }

    pub fn run(&self, args: &[&str], envs: &[(&str, &str)]) -> RunOutput {
        capture(self.command(args, envs))
    }

    /// Run `git <args>` in this workspace and return its stdout.
    #[allow(dead_code)]
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .expect("spawn git");
        assert!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

pub fn capture(mut command: Command) -> RunOutput {
    let output = command.output().expect("spawn ci-scope");
    RunOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Whether `tool` is on PATH; prints a skip notice when it is not.
#[allow(dead_code)]
pub fn skip_without(tool: &str) -> bool {
    let missing = which::which(tool).is_err();
    if missing {
        eprintln!("Skipping: {tool} not available");
    }
    missing
}
