use super::{ChangeSet, PullRequestSource};
use crate::error::{Result, ScopeError};
use serde::Deserialize;
use std::time::Instant;

/// GitHub caps page size at 100 and a PR listing at 3000 files.
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 30;

/// Record returned by `GET /repos/{owner}/{repo}/pulls/{number}/files`.
#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
}

/// Pull-request file listing over the GitHub REST API.
pub struct GithubClient {
    agent: ureq::Agent,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_base: &str, owner: &str, repo: &str, token: Option<String>) -> Self {
        Self::with_agent(ureq::Agent::new_with_defaults(), api_base, owner, repo, token)
    }

    pub fn with_agent(
        agent: ureq::Agent,
        api_base: &str,
        owner: &str,
        repo: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            agent,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
        }
    }

    fn files_page(&self, number: &str, page: usize) -> Result<Vec<PullRequestFile>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{number}/files?per_page={PER_PAGE}&page={page}",
            self.api_base, self.owner, self.repo
        );
        let mut request = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "ci-scope");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let start = Instant::now();
        let mut response = request
            .call()
            .map_err(|err| ScopeError::Network(format!("GET {url}: {err}")))?;
        let records: Vec<PullRequestFile> = response
            .body_mut()
            .read_json()
            .map_err(|err| ScopeError::Network(format!("decode {url}: {err}")))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            page,
            records = records.len(),
            "pull request files page fetched"
        );
        Ok(records)
    }
}

impl PullRequestSource for GithubClient {
    fn changed_files(&self, number: &str) -> Result<ChangeSet> {
        let mut files = Vec::new();
        for page in 1..=MAX_PAGES {
            let records = self.files_page(number, page)?;
            let count = records.len();
            files.extend(records.into_iter().map(|record| record.filename));
            if count < PER_PAGE {
                break;
            }
        }
        Ok(files.into_iter().collect())
    }
}
