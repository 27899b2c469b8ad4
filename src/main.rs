mod changes;
mod cli;
mod config;
mod ecs;
mod environment;
mod error;
mod passes;
mod targets;
mod workflow;

use anyhow::{Context, Result};
use changes::{BranchContext, ChangeSet};
use clap::Parser;
use cli::{Command, PassArgs, RootArgs};
use passes::ScopeContext;
use targets::{PackagingTool, RunConfig};
use tracing_subscriber::EnvFilter;
use workflow::WorkflowFile;

fn main() -> Result<()> {
    let root = RootArgs::parse();
    let args = root.command.args();
    init_tracing(args.verbose);

    let ctx = build_context(args)?;
    let env = ctx.environment();
    tracing::info!(
        branch = %ctx.event.branch,
        env = %env.code,
        gated = env.allows(&ctx.event.branch),
        target_branch = %ctx.target_branch,
        workflow = %ctx.workflow.path().display(),
        "scoping event"
    );

    match &root.command {
        Command::Run(_) => run_all(&ctx),
        Command::Handlers(_) => {
            let changes = passes::resolve_changes(&ctx)?;
            let packager = packager(&ctx)?;
            report("handler", &passes::handler_pass(&ctx, &changes, &packager)?);
            Ok(())
        }
        Command::Layers(_) => {
            let changes = passes::resolve_changes(&ctx)?;
            report("layer", &passes::layer_pass(&ctx, &changes)?);
            Ok(())
        }
        Command::Ecs(_) => {
            match passes::resolve_changes(&ctx) {
                Ok(changes) => report_changes(&changes),
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "changed files unavailable"),
            }
            report("ecs", &passes::ecs_pass(&ctx)?);
            Ok(())
        }
        Command::Tests(_) => {
            let changes = passes::resolve_changes(&ctx)?;
            report("service", &passes::ci_test_pass(&ctx, &changes)?);
            Ok(())
        }
        Command::Diff(_) => {
            let changes = passes::resolve_changes(&ctx)?;
            for path in changes.iter() {
                println!("{path}");
            }
            Ok(())
        }
    }
}

/// Handler, layer and ECS passes over a single diff.
fn run_all(ctx: &ScopeContext) -> Result<()> {
    let changes = passes::resolve_changes(ctx)?;
    report_changes(&changes);
    let packager = packager(ctx)?;
    report("handler", &passes::handler_pass(ctx, &changes, &packager)?);
    report("layer", &passes::layer_pass(ctx, &changes)?);
    report("ecs", &passes::ecs_pass(ctx)?);
    Ok(())
}

fn build_context(args: &PassArgs) -> Result<ScopeContext> {
    let config = config::load_config(args.config.as_deref()).with_context(|| {
        match &args.config {
            Some(path) => format!("load config {}", path.display()),
            None => "load default config".to_string(),
        }
    })?;
    let registry = config.registry().context("build environment registry")?;
    let workflow_path = args
        .workflow
        .clone()
        .unwrap_or_else(|| args.repo_root.join(&config.workflow_path));
    let event = BranchContext {
        branch: args.event.branch.clone(),
        sha: args.event.sha.clone(),
        pull_request: args.event.pull_request.clone(),
    };

    Ok(ScopeContext {
        config,
        registry,
        run_config: RunConfig::from_env(),
        repo_root: args.repo_root.clone(),
        workflow: WorkflowFile::new(workflow_path),
        event,
        target_branch: args.target_branch.clone(),
        repo_owner: args.event.repo_owner.clone(),
        repo_name: args.event.repo_name.clone(),
        github_token: args.event.github_token.clone(),
    })
}

fn packager(ctx: &ScopeContext) -> Result<PackagingTool> {
    PackagingTool::new(&ctx.config.packager_command, &ctx.repo_root)
        .context("prepare packaging tool")
}

fn report(label: &str, items: &[String]) {
    for item in items {
        println!("{label}: {item}");
    }
}

fn report_changes(changes: &ChangeSet) {
    for path in changes.iter() {
        println!("changed: {path}");
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
