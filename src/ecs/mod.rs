//! Container-service job synthesis.
//!
//! Every active `type: ecs` resource found in a deployment descriptor becomes
//! an approval gate plus a deploy job in the ECS workflow, both filtered to
//! the active track's allow-listed branches.
mod descriptor;
mod placeholder;

use descriptor::{find_descriptors, load_descriptor, EcsResource};
use placeholder::Placeholders;

use crate::config::EcsPassConfig;
use crate::environment::EnvironmentSpec;
use crate::error::{Result, ScopeError};
use crate::workflow::{JobAppend, WorkflowDocument};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An ECS resource with every field resolved for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsDeployment {
    pub source: PathBuf,
    pub resource: String,
    pub cluster: String,
    pub service: String,
    pub image: String,
    pub context: String,
    pub dockerfile: String,
    pub tag: String,
}

impl EcsDeployment {
    pub fn hold_job(&self, env: &EnvironmentSpec) -> String {
        format!("{}-Hold-{}-{}", env.name, self.cluster, self.service)
    }

    pub fn deploy_job(&self, env: &EnvironmentSpec) -> String {
        format!("{}-ECS-Deploy-{}-{}", env.name, self.cluster, self.service)
    }
}

/// Resolve one descriptor resource, or `None` when it is inactive.
fn resolve_resource(
    source: &Path,
    name: &str,
    resource: &EcsResource,
    placeholders: &Placeholders,
    pass: &EcsPassConfig,
) -> Result<Option<EcsDeployment>> {
    if !resource.is_active() {
        tracing::debug!(resource = name, source = %source.display(), "inactive ecs resource skipped");
        return Ok(None);
    }
    let field = |label: &str, value: Option<&str>| -> Result<String> {
        let value = value.ok_or_else(|| ScopeError::Descriptor {
            path: source.to_path_buf(),
            detail: format!("resource {name} has no {label}"),
        })?;
        placeholders.resolve(&format!("{name}.{label}"), value)
    };

    Ok(Some(EcsDeployment {
        source: source.to_path_buf(),
        resource: name.to_string(),
        cluster: field("cluster", resource.cluster.as_deref())?,
        service: field("service", resource.service.as_deref())?,
        image: field("image", resource.image.as_deref())?,
        context: field("context", resource.context.as_deref())?,
        dockerfile: field(
            "dockerfile",
            Some(
                resource
                    .dockerfile
                    .as_deref()
                    .filter(|value| !value.is_empty())
                    .unwrap_or(&pass.default_dockerfile),
            ),
        )?,
        tag: field(
            "tag",
            Some(
                resource
                    .tag
                    .as_deref()
                    .filter(|value| !value.is_empty())
                    .unwrap_or(&pass.default_tag),
            ),
        )?,
    }))
}

/// Scan descriptors and resolve every active ECS resource for `env`.
///
/// Two resources resolving to the same cluster and service collide on their
/// job keys; both are kept here and the later one wins when the jobs are
/// written.
pub fn collect_deployments(
    repo_root: &Path,
    code_paths: &[String],
    descriptor_names: &[String],
    env: &EnvironmentSpec,
    pass: &EcsPassConfig,
) -> Result<Vec<EcsDeployment>> {
    let placeholders = Placeholders::for_environment(env);
    let mut deployments = Vec::new();
    let mut seen: BTreeMap<(String, String), PathBuf> = BTreeMap::new();

    for path in find_descriptors(repo_root, code_paths, descriptor_names)? {
        let resources = load_descriptor(&path)?;
        let source = path.strip_prefix(repo_root).unwrap_or(&path);
        tracing::debug!(
            descriptor = %source.display(),
            ecs_resources = resources.len(),
            "descriptor loaded"
        );
        for (name, resource) in &resources {
            let Some(deployment) = resolve_resource(source, name, resource, &placeholders, pass)?
            else {
                continue;
            };
            let key = (deployment.cluster.clone(), deployment.service.clone());
            if let Some(previous) = seen.insert(key, deployment.source.clone()) {
                tracing::warn!(
                    cluster = %deployment.cluster,
                    service = %deployment.service,
                    previous = %previous.display(),
                    current = %deployment.source.display(),
                    "duplicate cluster/service, later descriptor wins"
                );
            }
            deployments.push(deployment);
        }
    }
    Ok(deployments)
}

/// Write approval and deploy jobs for `deployments` into the document.
///
/// Activates the ECS flag when at least one deployment was written. Jobs
/// already present under the same key are replaced, so running twice leaves
/// the same graph.
pub fn synthesize_ecs_jobs(
    document: &mut WorkflowDocument,
    env: &EnvironmentSpec,
    deployments: &[EcsDeployment],
    pass: &EcsPassConfig,
) -> Result<usize> {
    let filters = branch_filters(&env.allowed_branches);
    for deployment in deployments {
        let hold_name = deployment.hold_job(env);
        let deploy_name = deployment.deploy_job(env);

        document.clone_job_template(
            &pass.template_job,
            &deploy_name,
            &[(
                pass.dockerfile_parameter.as_str(),
                Value::from(deployment.dockerfile.as_str()),
            )],
        )?;

        let mut hold = Mapping::new();
        hold.insert("name".into(), hold_name.as_str().into());
        hold.insert("type".into(), "approval".into());
        hold.insert("filters".into(), filters.clone());

        let mut parameters = Mapping::new();
        for (key, value) in [
            ("ECS_CLUSTER", deployment.cluster.as_str()),
            ("ECS_SERVICE", deployment.service.as_str()),
            ("PROFILE", env.code.as_str()),
            ("AWS_REGION", env.region.as_str()),
            (pass.dockerfile_parameter.as_str(), deployment.dockerfile.as_str()),
            ("DOCKER_CONTEXT", deployment.context.as_str()),
            ("ECR_IMAGE", deployment.image.as_str()),
            ("DOCKER_TAG", deployment.tag.as_str()),
        ] {
            parameters.insert(key.into(), value.into());
        }

        let mut deploy = Mapping::new();
        deploy.insert("name".into(), deploy_name.as_str().into());
        deploy.insert(
            "requires".into(),
            Value::Sequence(vec![hold_name.as_str().into()]),
        );
        deploy.insert("parameters".into(), Value::Mapping(parameters));
        deploy.insert("filters".into(), filters.clone());

        let hold_outcome = document.append_job(&pass.workflow, &hold_name, hold)?;
        let deploy_outcome = document.append_job(&pass.workflow, &deploy_name, deploy)?;
        if hold_outcome == JobAppend::Replaced || deploy_outcome == JobAppend::Replaced {
            tracing::warn!(job = %deploy_name, "existing ecs jobs replaced");
        }
        tracing::info!(
            job = %deploy_name,
            resource = %deployment.resource,
            source = %deployment.source.display(),
            "ecs deploy job synthesized"
        );
    }
    if !deployments.is_empty() {
        document.activate_feature(&pass.flag)?;
    }
    Ok(deployments.len())
}

fn branch_filters(allowed: &[String]) -> Value {
    let only = Value::Sequence(allowed.iter().map(|branch| branch.as_str().into()).collect());
    let mut branches = Mapping::new();
    branches.insert("only".into(), only);
    let mut filters = Mapping::new();
    filters.insert("branches".into(), Value::Mapping(branches));
    Value::Mapping(filters)
}
