use crate::config::HANDLER_TOKEN;
use crate::error::{Result, ScopeError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Source of a handler's deployable bundle.
pub trait BundleResolver {
    /// Repository-relative files that make up the handler's bundle.
    fn bundle(&self, handler_path: &str) -> Result<BTreeSet<String>>;
}

/// External packaging tool run once per handler.
///
/// The command template is split with shell-words; every `{handler}` token is
/// replaced by the handler path, and the path is appended when no token is
/// present. The tool prints one bundle path per line.
#[derive(Debug, Clone)]
pub struct PackagingTool {
    argv: Vec<String>,
    cwd: PathBuf,
}

impl PackagingTool {
    pub fn new(command: &str, cwd: &Path) -> Result<Self> {
        let argv = shell_words::split(command).map_err(|err| {
            ScopeError::Config(format!("parse packager command {command:?}: {err}"))
        })?;
        if argv.is_empty() {
            return Err(ScopeError::Config("packager command is empty".to_string()));
        }
        Ok(Self {
            argv,
            cwd: cwd.to_path_buf(),
        })
    }

    fn argv_for(&self, handler_path: &str) -> Vec<String> {
        let mut argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace(HANDLER_TOKEN, handler_path))
            .collect();
        if !self.argv.iter().any(|arg| arg.contains(HANDLER_TOKEN)) {
            argv.push(handler_path.to_string());
        }
        argv
    }
}

impl BundleResolver for PackagingTool {
    fn bundle(&self, handler_path: &str) -> Result<BTreeSet<String>> {
        let argv = self.argv_for(handler_path);
        let failure = |detail: String| ScopeError::PackagingTool {
            handler: handler_path.to_string(),
            detail,
        };

        let start = Instant::now();
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.cwd)
            .output()
            .map_err(|err| failure(format!("spawn {}: {err}", argv[0])))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            handler = handler_path,
            stdout_bytes = output.stdout.len(),
            "packaging tool complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| failure("printed non-UTF-8 output".to_string()))?;
        Ok(stdout
            .lines()
            .map(|line| line.trim().trim_start_matches("./"))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
