use super::{ChangeSet, VersionControl};
use crate::error::{Result, ScopeError};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Git driven through its command line inside one working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    repo_root: PathBuf,
}

impl GitCli {
    /// Find `git` on `PATH` and bind it to `repo_root`.
    pub fn locate(repo_root: &Path) -> Result<Self> {
        let program = which::which("git").map_err(|err| {
            ScopeError::DiffResolution(format!("git executable not found: {err}"))
        })?;
        Ok(Self {
            program,
            repo_root: repo_root.to_path_buf(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|err| {
                ScopeError::DiffResolution(format!("spawn git {}: {err}", args.join(" ")))
            })?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            elapsed_ms,
            command = %args.join(" "),
            stdout_bytes = output.stdout.len(),
            "git command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .trim()
                .lines()
                .next()
                .map(str::to_string)
                .unwrap_or_else(|| format!("status {}", output.status));
            return Err(ScopeError::DiffResolution(format!(
                "git {} failed: {detail}",
                args.join(" ")
            )));
        }

        String::from_utf8(output.stdout).map_err(|_| {
            ScopeError::DiffResolution(format!("git {} printed non-UTF-8 output", args.join(" ")))
        })
    }
}

impl VersionControl for GitCli {
    fn diff_names(&self, from: &str, to: &str) -> Result<ChangeSet> {
        let stdout = self.run(&["diff", "--name-only", from, to])?;
        Ok(ChangeSet::from_lines(&stdout))
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["fetch", remote, branch, "-q"]).map(|_| ())
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        self.run(&["checkout", reference, "-q"]).map(|_| ())
    }
}
