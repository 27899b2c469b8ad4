//! Orchestration of the scoping passes over one CI event.
//!
//! Each pass reads the shared change set, decides what it affects, and does at
//! most one read-modify-write of the workflow document. A pass with nothing to
//! schedule leaves the file alone.
use crate::changes::{
    BranchContext, ChangeSet, DiffResolver, GitCli, GithubClient, PullRequestSource,
};
use crate::config::ScopeConfig;
use crate::ecs::{collect_deployments, synthesize_ecs_jobs};
use crate::environment::{EnvironmentRegistry, EnvironmentSpec};
use crate::targets::{BundleResolver, RunConfig, TargetMapper};
use crate::workflow::WorkflowFile;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

/// Everything a pass needs, built once per invocation.
pub struct ScopeContext {
    pub config: ScopeConfig,
    pub registry: EnvironmentRegistry,
    pub run_config: RunConfig,
    pub repo_root: PathBuf,
    pub workflow: WorkflowFile,
    pub event: BranchContext,
    /// Branch a pull request merges into.
    pub target_branch: String,
    /// Hosting-platform coordinates for pull-request listings.
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub github_token: Option<String>,
}

impl ScopeContext {
    /// Track selected by the event's branch.
    pub fn environment(&self) -> &EnvironmentSpec {
        self.registry.select(&self.event.branch)
    }

    fn mapper(&self) -> TargetMapper<'_> {
        TargetMapper::new(
            &self.run_config,
            &self.config.handler_extension,
            &self.config.layer_manifest,
            self.config.layer_manifest_depth,
        )
    }

    fn github(&self) -> Option<GithubClient> {
        let owner = self.repo_owner.as_deref().filter(|value| !value.is_empty())?;
        let name = self.repo_name.as_deref().filter(|value| !value.is_empty())?;
        Some(GithubClient::new(
            &self.config.github_api,
            owner,
            name,
            self.github_token.clone(),
        ))
    }
}

/// Resolve the files changed by the event.
pub fn resolve_changes(ctx: &ScopeContext) -> Result<ChangeSet> {
    let git = GitCli::locate(&ctx.repo_root)?;
    let github = ctx.github();
    let resolver = DiffResolver::new(
        &git,
        github.as_ref().map(|client| client as &dyn PullRequestSource),
        &ctx.registry,
        &ctx.config.baseline_branch,
        &ctx.config.ephemeral_suffix,
    )
    .with_retry(ctx.config.diff_retry());
    let changes = resolver
        .resolve(&ctx.event)
        .with_context(|| format!("resolve changed files for branch {:?}", ctx.event.branch))?;
    if changes.is_empty() {
        tracing::warn!(branch = %ctx.event.branch, "event changed no files");
    }
    Ok(changes)
}

/// Schedule build and deploy jobs for handlers whose bundle changed.
pub fn handler_pass(
    ctx: &ScopeContext,
    changes: &ChangeSet,
    bundles: &dyn BundleResolver,
) -> Result<Vec<String>> {
    let env = ctx.environment();
    let handlers = ctx
        .mapper()
        .resolve_affected_handlers(&env.code, changes, bundles)
        .context("resolve affected handlers")?;
    tracing::info!(env = %env.code, affected = handlers.len(), "handler pass resolved");
    if handlers.is_empty() {
        return Ok(handlers);
    }

    let pass = &ctx.config.handlers;
    let slots = env.matrix_slots(&pass.stage);
    ctx.workflow
        .update(|document| {
            document.activate_feature(&pass.flag)?;
            document.inject_matrix_parameter(&pass.workflow, &slots, &pass.parameter, &handlers)
        })
        .with_context(|| format!("schedule handlers in {}", ctx.workflow.path().display()))?;
    Ok(handlers)
}

/// Schedule layer rebuilds for services whose own manifest changed.
pub fn layer_pass(ctx: &ScopeContext, changes: &ChangeSet) -> Result<Vec<String>> {
    let env = ctx.environment();
    let layers = ctx.mapper().resolve_affected_layers(&env.code, changes);
    tracing::info!(env = %env.code, affected = layers.len(), "layer pass resolved");
    if layers.is_empty() {
        return Ok(layers);
    }

    let pass = &ctx.config.layers;
    let slots = env.matrix_slots(&pass.stage);
    ctx.workflow
        .update(|document| {
            document.activate_feature(&pass.flag)?;
            document.inject_matrix_parameter(&pass.workflow, &slots, &pass.parameter, &layers)
        })
        .with_context(|| format!("schedule layers in {}", ctx.workflow.path().display()))?;
    Ok(layers)
}

/// Synthesize approval and deploy jobs for every active ECS resource.
///
/// Returns the deploy job names written.
pub fn ecs_pass(ctx: &ScopeContext) -> Result<Vec<String>> {
    let env = ctx.environment();
    let pass = &ctx.config.ecs;
    let deployments = collect_deployments(
        &ctx.repo_root,
        &ctx.config.code_paths,
        &ctx.config.descriptor_filenames,
        env,
        pass,
    )
    .context("collect ecs deployments")?;
    tracing::info!(env = %env.code, deployments = deployments.len(), "ecs pass resolved");
    if deployments.is_empty() {
        return Ok(Vec::new());
    }

    ctx.workflow
        .update(|document| synthesize_ecs_jobs(document, env, &deployments, pass))
        .with_context(|| format!("synthesize ecs jobs in {}", ctx.workflow.path().display()))?;
    Ok(deployments
        .iter()
        .map(|deployment| deployment.deploy_job(env))
        .collect())
}

/// Pick the services the CI test pipeline should exercise and schedule them.
///
/// Every service runs when either the event branch or the merge target is a
/// release branch, or when shared code changed.
pub fn ci_test_pass(ctx: &ScopeContext, changes: &ChangeSet) -> Result<Vec<String>> {
    let pass = &ctx.config.ci_tests;
    let full_run = [&ctx.event.branch, &ctx.target_branch]
        .into_iter()
        .any(|branch| pass.full_run_branches.contains(branch))
        || changes.iter().any(|path| path.starts_with(&pass.shared_prefix));
    let services = if full_run {
        list_services(ctx)?
    } else {
        touched_services(changes, &pass.services_dir)
    };
    tracing::info!(full_run, services = services.len(), "ci test pass resolved");
    if services.is_empty() {
        return Ok(services);
    }

    ctx.workflow
        .update(|document| {
            document.activate_feature(&pass.flag)?;
            document.set_matrix_parameter(&pass.workflow, &pass.job, &pass.parameter, &services)
        })
        .with_context(|| format!("schedule ci tests in {}", ctx.workflow.path().display()))?;
    Ok(services)
}

/// Service directories directly under the services root, in name order.
fn list_services(ctx: &ScopeContext) -> Result<Vec<String>> {
    let dir = ctx.repo_root.join(&ctx.config.ci_tests.services_dir);
    let entries =
        fs::read_dir(&dir).with_context(|| format!("list services in {}", dir.display()))?;
    let mut services = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            services.push(name.to_string());
        }
    }
    services.sort();
    Ok(services)
}

/// Names of `<services_dir>/<name>/...` entries touched by `changes`.
fn touched_services(changes: &ChangeSet, services_dir: &str) -> Vec<String> {
    let prefix = format!("{}/", services_dir.trim_end_matches('/'));
    let services: BTreeSet<&str> = changes
        .iter()
        .filter_map(|path| path.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split_once('/'))
        .map(|(service, _)| service)
        .filter(|service| !service.is_empty())
        .collect();
    services.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
