//! Changed-file resolution for a CI event.
//!
//! The event context (branch, commit, pull request) picks one of four diff
//! strategies. Git and the hosting API sit behind traits so strategy selection
//! can be exercised without a repository or network.
mod git;
mod github;
mod retry;

pub use git::GitCli;
pub use github::GithubClient;
pub use retry::RetryPolicy;

use crate::environment::EnvironmentRegistry;
use crate::error::{Result, ScopeError};
use std::collections::BTreeSet;

/// Deduplicated set of repository-relative paths touched by a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<String>);

impl ChangeSet {
    /// Build from newline-delimited tool output, skipping blank lines.
    pub fn from_lines(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether any path of `bundle` is in this set.
    pub fn intersects(&self, bundle: &BTreeSet<String>) -> bool {
        if bundle.len() < self.0.len() {
            bundle.iter().any(|path| self.0.contains(path))
        } else {
            self.0.iter().any(|path| bundle.contains(path))
        }
    }

    /// Paths exactly `depth` segments deep whose last segment is `file_name`.
    pub fn manifests(&self, file_name: &str, depth: usize) -> ChangeSet {
        self.iter()
            .filter(|path| {
                let segments: Vec<&str> = path.split('/').collect();
                segments.len() == depth && segments.last() == Some(&file_name)
            })
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<String> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        ChangeSet(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        ChangeSet(iter.into_iter().map(str::to_string).collect())
    }
}

/// What triggered this run.
#[derive(Debug, Clone, Default)]
pub struct BranchContext {
    pub branch: String,
    /// Commit that triggered the run, used by the fallback strategy.
    pub sha: Option<String>,
    /// Pull-request URL (`.../pull/123`) when the run belongs to a PR.
    pub pull_request: Option<String>,
}

/// Diff primitives the resolver needs from version control.
pub trait VersionControl {
    /// Names of files that differ between two revisions.
    fn diff_names(&self, from: &str, to: &str) -> Result<ChangeSet>;
    fn fetch(&self, remote: &str, branch: &str) -> Result<()>;
    fn checkout(&self, reference: &str) -> Result<()>;
}

/// File listing for a pull request on the hosting platform.
pub trait PullRequestSource {
    fn changed_files(&self, number: &str) -> Result<ChangeSet>;
}

/// Strategy chosen for a context, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Per-developer branch diffed against the integration baseline.
    Ephemeral { baseline: String, branch: String },
    PullRequest { number: String },
    /// Integration branch: HEAD against its parent.
    Trunk,
    /// Triggering commit against its parent.
    Commit { sha: String },
}

pub struct DiffResolver<'a> {
    vcs: &'a dyn VersionControl,
    pulls: Option<&'a dyn PullRequestSource>,
    registry: &'a EnvironmentRegistry,
    baseline: &'a str,
    ephemeral_suffix: &'a str,
    retry: RetryPolicy,
}

impl<'a> DiffResolver<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        pulls: Option<&'a dyn PullRequestSource>,
        registry: &'a EnvironmentRegistry,
        baseline: &'a str,
        ephemeral_suffix: &'a str,
    ) -> Self {
        Self {
            vcs,
            pulls,
            registry,
            baseline,
            ephemeral_suffix,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn strategy(&self, context: &BranchContext) -> Result<DiffStrategy> {
        if context.branch.ends_with(self.ephemeral_suffix) {
            return Ok(DiffStrategy::Ephemeral {
                baseline: self.baseline.to_string(),
                branch: context.branch.clone(),
            });
        }
        if let Some(url) = context
            .pull_request
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        {
            return Ok(DiffStrategy::PullRequest {
                number: pull_request_number(url)?,
            });
        }
        if self.registry.is_trunk(&context.branch) {
            return Ok(DiffStrategy::Trunk);
        }
        match context.sha.as_deref().filter(|sha| !sha.trim().is_empty()) {
            Some(sha) => Ok(DiffStrategy::Commit {
                sha: sha.trim().to_string(),
            }),
            None => Err(ScopeError::DiffResolution(format!(
                "branch {:?} is not a trunk or ephemeral branch and no commit sha was given",
                context.branch
            ))),
        }
    }

    /// Resolve the files changed by the event.
    pub fn resolve(&self, context: &BranchContext) -> Result<ChangeSet> {
        let strategy = self.strategy(context)?;
        tracing::debug!(?strategy, branch = %context.branch, "diff strategy selected");
        let changes = match &strategy {
            DiffStrategy::Ephemeral { baseline, branch } => {
                self.vcs.fetch("origin", baseline)?;
                self.vcs.checkout(baseline)?;
                self.vcs.checkout(branch)?;
                self.retry
                    .run("git diff", || self.vcs.diff_names(baseline, branch))?
            }
            DiffStrategy::PullRequest { number } => {
                let pulls = self.pulls.ok_or_else(|| {
                    ScopeError::Network(format!(
                        "pull request {number} needs a repository owner and name to query"
                    ))
                })?;
                self.retry
                    .run("pull request files", || pulls.changed_files(number))?
            }
            DiffStrategy::Trunk => self
                .retry
                .run("git diff", || self.vcs.diff_names("HEAD", "HEAD~1"))?,
            DiffStrategy::Commit { sha } => {
                let parent = format!("{sha}^");
                self.retry
                    .run("git diff", || self.vcs.diff_names(&parent, sha))?
            }
        };
        tracing::info!(files = changes.len(), "changed files resolved");
        Ok(changes)
    }
}

/// PR number from the last path segment of a pull-request URL.
pub fn pull_request_number(url: &str) -> Result<String> {
    let number = url.trim().trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if number.is_empty() || !number.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ScopeError::DiffResolution(format!(
            "cannot read a pull request number from {url:?}"
        )));
    }
    Ok(number.to_string())
}

#[cfg(test)]
mod tests;
