//! Declarative registry of deployment tracks.
//!
//! Every branch-keyed decision (which AWS account, which approval filter, which
//! matrix jobs to touch) is looked up here instead of being branched on by name.
use crate::error::{Result, ScopeError};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Positions a track owns inside the code/layer build-deploy workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOffsets {
    pub build: usize,
    pub hold: usize,
    pub deploy: usize,
}

/// One deployment track (dev, test, prod).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Display name used as the job-name prefix (`Dev`, `Test`, `Prod`).
    pub name: String,
    /// Short code substituted for `${DEPLOY_STAGE}` and matched against
    /// registration keys.
    pub code: String,
    pub region: String,
    pub account_id: String,
    /// Integration branch that selects this track.
    pub trunk_branch: String,
    /// Branch filter written into approval and deploy jobs. Entries wrapped in
    /// slashes (`/.*_dev/`) are regular expressions.
    pub allowed_branches: Vec<String>,
    pub job_offsets: JobOffsets,
}

/// A job the matrix passes rewrite, named and with its conventional position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSlot {
    pub name: String,
    pub offset: usize,
}

impl EnvironmentSpec {
    /// Build, hold and deploy slots for a matrix workflow whose jobs are named
    /// after `stage` (`Code`, `Layer`).
    pub fn matrix_slots(&self, stage: &str) -> Vec<JobSlot> {
        vec![
            JobSlot {
                name: format!("{stage}-Build"),
                offset: self.job_offsets.build,
            },
            JobSlot {
                name: format!("{}-Hold", self.name),
                offset: self.job_offsets.hold,
            },
            JobSlot {
                name: format!("{}-{stage}-Deploy", self.name),
                offset: self.job_offsets.deploy,
            },
        ]
    }

    /// Whether the track's branch filter lets `branch` through.
    pub fn allows(&self, branch: &str) -> bool {
        self.allowed_branches
            .iter()
            .filter_map(|entry| BranchPattern::parse(entry).ok())
            .any(|pattern| pattern.matches(branch))
    }
}

/// Parsed form of an `allowed_branches` entry.
#[derive(Debug, Clone)]
pub enum BranchPattern {
    Literal(String),
    Regex(Regex),
}

impl BranchPattern {
    pub fn parse(entry: &str) -> Result<Self> {
        match entry
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Some(body) if !body.is_empty() => {
                let regex = Regex::new(&format!("^(?:{body})$")).map_err(|err| {
                    ScopeError::Config(format!("invalid branch pattern {entry:?}: {err}"))
                })?;
                Ok(Self::Regex(regex))
            }
            _ => Ok(Self::Literal(entry.to_string())),
        }
    }

    pub fn matches(&self, branch: &str) -> bool {
        match self {
            Self::Literal(name) => name == branch,
            Self::Regex(regex) => regex.is_match(branch),
        }
    }
}

/// The set of tracks plus the one used when no trunk branch matches.
#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    environments: Vec<EnvironmentSpec>,
    default_code: String,
}

impl EnvironmentRegistry {
    /// Validate and build a registry.
    pub fn new(environments: Vec<EnvironmentSpec>, default_code: &str) -> Result<Self> {
        if environments.is_empty() {
            return Err(ScopeError::Config(
                "at least one environment is required".to_string(),
            ));
        }
        for (idx, env) in environments.iter().enumerate() {
            if env.code.trim().is_empty() || env.name.trim().is_empty() {
                return Err(ScopeError::Config(format!(
                    "environment #{idx} needs a non-empty name and code"
                )));
            }
            let later = &environments[idx + 1..];
            if later.iter().any(|other| other.code == env.code) {
                return Err(ScopeError::Config(format!(
                    "duplicate environment code {:?}",
                    env.code
                )));
            }
            if later
                .iter()
                .any(|other| other.trunk_branch == env.trunk_branch)
            {
                return Err(ScopeError::Config(format!(
                    "trunk branch {:?} is claimed by more than one environment",
                    env.trunk_branch
                )));
            }
            for entry in &env.allowed_branches {
                BranchPattern::parse(entry)?;
            }
        }
        if !environments.iter().any(|env| env.code == default_code) {
            return Err(ScopeError::Config(format!(
                "default environment {default_code:?} is not registered"
            )));
        }
        Ok(Self {
            environments,
            default_code: default_code.to_string(),
        })
    }

    /// The dev/test/prod tracks fed by develop/staging/master.
    #[cfg(test)]
    pub fn standard() -> Self {
        Self {
            environments: standard_environments(),
            default_code: "dev".to_string(),
        }
    }

    /// Active track for a branch: its trunk owner, else the default track.
    pub fn select(&self, branch: &str) -> &EnvironmentSpec {
        self.environments
            .iter()
            .find(|env| env.trunk_branch == branch)
            .unwrap_or_else(|| self.default_environment())
    }

    pub fn is_trunk(&self, branch: &str) -> bool {
        self.environments
            .iter()
            .any(|env| env.trunk_branch == branch)
    }

    pub fn default_environment(&self) -> &EnvironmentSpec {
        // `new` guarantees the default code is registered.
        self.environments
            .iter()
            .find(|env| env.code == self.default_code)
            .unwrap_or(&self.environments[0])
    }
}

pub fn standard_environments() -> Vec<EnvironmentSpec> {
    vec![
        EnvironmentSpec {
            name: "Dev".to_string(),
            code: "dev".to_string(),
            region: "ap-southeast-1".to_string(),
            account_id: "054647111382".to_string(),
            trunk_branch: "develop".to_string(),
            allowed_branches: vec!["develop".to_string(), "/.*_dev/".to_string()],
            job_offsets: JobOffsets {
                build: 0,
                hold: 1,
                deploy: 2,
            },
        },
        EnvironmentSpec {
            name: "Test".to_string(),
            code: "test".to_string(),
            region: "ap-southeast-1".to_string(),
            account_id: "072198228306".to_string(),
            trunk_branch: "staging".to_string(),
            allowed_branches: vec!["staging".to_string()],
            job_offsets: JobOffsets {
                build: 0,
                hold: 3,
                deploy: 4,
            },
        },
        EnvironmentSpec {
            name: "Prod".to_string(),
            code: "prod".to_string(),
            region: "ap-southeast-1".to_string(),
            account_id: "381719257168".to_string(),
            trunk_branch: "master".to_string(),
            allowed_branches: vec!["master".to_string()],
            job_offsets: JobOffsets {
                build: 0,
                hold: 5,
                deploy: 6,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_branches_select_their_track() {
        let registry = EnvironmentRegistry::standard();
        assert_eq!(registry.select("develop").code, "dev");
        assert_eq!(registry.select("staging").code, "test");
        assert_eq!(registry.select("master").code, "prod");
    }

    #[test]
    fn feature_and_ephemeral_branches_fall_back_to_dev() {
        let registry = EnvironmentRegistry::standard();
        assert_eq!(registry.select("feature/login").code, "dev");
        assert_eq!(registry.select("alice_dev").code, "dev");
        assert!(!registry.is_trunk("alice_dev"));
    }

    #[test]
    fn allow_list_supports_literals_and_patterns() {
        let registry = EnvironmentRegistry::standard();
        let dev = registry.select("develop");
        assert!(dev.allows("develop"));
        assert!(dev.allows("alice_dev"));
        assert!(!dev.allows("staging"));
        assert!(!dev.allows("alice_dev_old"));
    }

    #[test]
    fn matrix_slots_follow_track_offsets() {
        let registry = EnvironmentRegistry::standard();
        let slots = registry.select("staging").matrix_slots("Layer");
        let names: Vec<_> = slots.iter().map(|slot| slot.name.as_str()).collect();
        assert_eq!(names, ["Layer-Build", "Test-Hold", "Test-Layer-Deploy"]);
        let offsets: Vec<_> = slots.iter().map(|slot| slot.offset).collect();
        assert_eq!(offsets, [0, 3, 4]);
    }

    #[test]
    fn registry_rejects_unknown_default() {
        let err = EnvironmentRegistry::new(standard_environments(), "qa").unwrap_err();
        assert!(err.to_string().contains("qa"));
    }

    #[test]
    fn registry_rejects_bad_pattern() {
        let mut envs = standard_environments();
        envs[0].allowed_branches.push("/(/".to_string());
        assert!(EnvironmentRegistry::new(envs, "dev").is_err());
    }
}
