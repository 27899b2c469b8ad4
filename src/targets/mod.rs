//! Mapping from changed files to deployment targets.
//!
//! Handlers are invalidated through their whole bundle, so an edit to a shared
//! module marks every handler importing it. Layers are invalidated only by an
//! edit to their own service-level manifest.
mod packager;
mod registry;

pub use packager::{BundleResolver, PackagingTool};
pub use registry::{RunConfig, TargetKind};

use crate::changes::ChangeSet;
use crate::error::Result;

pub struct TargetMapper<'a> {
    run_config: &'a RunConfig,
    handler_extension: &'a str,
    layer_manifest: &'a str,
    layer_manifest_depth: usize,
}

impl<'a> TargetMapper<'a> {
    pub fn new(
        run_config: &'a RunConfig,
        handler_extension: &'a str,
        layer_manifest: &'a str,
        layer_manifest_depth: usize,
    ) -> Self {
        Self {
            run_config,
            handler_extension,
            layer_manifest,
            layer_manifest_depth,
        }
    }

    /// Handlers registered for `env_code` whose bundle touches `changes`.
    pub fn resolve_affected_handlers(
        &self,
        env_code: &str,
        changes: &ChangeSet,
        bundles: &dyn BundleResolver,
    ) -> Result<Vec<String>> {
        let registrations = self.run_config.registrations(
            env_code,
            TargetKind::Handler {
                extension: self.handler_extension,
            },
        );
        tracing::debug!(
            env = env_code,
            registrations = registrations.len(),
            "handler registrations loaded"
        );

        let mut affected = Vec::new();
        for registration in registrations {
            let bundle = bundles.bundle(&registration.artifact_path)?;
            if changes.intersects(&bundle) {
                tracing::debug!(
                    handler = %registration.name,
                    path = %registration.artifact_path,
                    "handler bundle changed"
                );
                affected.push(registration.name);
            }
        }
        Ok(affected)
    }

    /// Layers registered for `env_code` whose own manifest is in `changes`.
    pub fn resolve_affected_layers(&self, env_code: &str, changes: &ChangeSet) -> Vec<String> {
        let manifests = changes.manifests(self.layer_manifest, self.layer_manifest_depth);
        self.run_config
            .registrations(
                env_code,
                TargetKind::Layer {
                    manifest: self.layer_manifest,
                },
            )
            .into_iter()
            .filter(|registration| manifests.contains(&registration.artifact_path))
            .map(|registration| registration.name)
            .collect()
    }
}
