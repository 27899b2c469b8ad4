//! CLI argument parsing for the scoping passes.
//!
//! Every event field has a CircleCI environment fallback so the binary can run
//! as a bare pipeline step with no flags at all.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ci-scope",
    version,
    about = "Scope a CI pipeline run to the deployables a change touches",
    after_help = "Commands:\n  run       Handler, layer and ECS passes (default pipeline entry)\n  handlers  Schedule Lambda handlers whose bundle changed\n  layers    Schedule Lambda layers whose manifest changed\n  ecs       Synthesize ECS approval and deploy jobs\n  tests     Schedule the CI test pipeline for touched services\n  diff      Print the changed files for this event\n\nExamples:\n  ci-scope run\n  ci-scope handlers --branch feature_dev\n  ci-scope diff --branch master --repo-root /src/app",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the handler, layer and ECS passes in order
    Run(PassArgs),
    /// Schedule Lambda handlers whose bundle changed
    Handlers(PassArgs),
    /// Schedule Lambda layers whose manifest changed
    Layers(PassArgs),
    /// Synthesize ECS approval and deploy jobs
    Ecs(PassArgs),
    /// Schedule the CI test pipeline for touched services
    Tests(PassArgs),
    /// Print the changed files for this event
    Diff(PassArgs),
}

impl Command {
    pub fn args(&self) -> &PassArgs {
        match self {
            Self::Run(args)
            | Self::Handlers(args)
            | Self::Layers(args)
            | Self::Ecs(args)
            | Self::Tests(args)
            | Self::Diff(args) => args,
        }
    }
}

/// Inputs shared by every pass.
#[derive(Args, Debug, Clone)]
pub struct PassArgs {
    #[command(flatten)]
    pub event: EventArgs,

    /// Repository working tree the diff and descriptor scan run in
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo_root: PathBuf,

    /// JSON config overriding the built-in defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workflow document to rewrite (default: config `workflow_path` under the repo root)
    #[arg(long, value_name = "PATH")]
    pub workflow: Option<PathBuf>,

    /// Branch a pull request merges into; release targets widen the CI test run
    #[arg(short = 'b', long, value_name = "BRANCH", default_value = "develop")]
    pub target_branch: String,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

/// The CI event being scoped.
#[derive(Args, Debug, Clone)]
pub struct EventArgs {
    /// Branch that triggered the run
    #[arg(long, env = "CIRCLE_BRANCH", value_name = "BRANCH")]
    pub branch: String,

    /// Commit that triggered the run
    #[arg(long, env = "CIRCLE_SHA1", value_name = "SHA")]
    pub sha: Option<String>,

    /// Pull-request URL when the run belongs to one
    #[arg(long, env = "CIRCLE_PULL_REQUEST", value_name = "URL")]
    pub pull_request: Option<String>,

    /// Repository owner on the hosting platform
    #[arg(long, env = "CIRCLE_PROJECT_USERNAME", value_name = "OWNER")]
    pub repo_owner: Option<String>,

    /// Repository name on the hosting platform
    #[arg(long, env = "CIRCLE_PROJECT_REPONAME", value_name = "NAME")]
    pub repo_name: Option<String>,

    /// Token for pull-request file listings
    #[arg(long, env = "GITHUB_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}
