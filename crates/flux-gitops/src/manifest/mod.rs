//! Repository layout and the manifests written into it.
//!
//! ```text
//! {path}/{cluster}/eksa-system/eksa-cluster.yaml
//! {path}/{cluster}/eksa-system/kustomization.yaml
//! {path}/{namespace}/kustomization.yaml     (self-managed only)
//! {path}/{namespace}/gotk-sync.yaml
//! {path}/{namespace}/gotk-patches.yaml
//! ```

pub mod templater;
pub mod writer;

use std::path::PathBuf;

use minijinja::context;

use crate::cluster::OperationContext;
use crate::error::ManifestError;

pub use templater::Templater;
pub use writer::ManifestWriter;

pub const KUSTOMIZE_FILE_NAME: &str = "kustomization.yaml";
pub const CLUSTER_CONFIG_FILE_NAME: &str = "eksa-cluster.yaml";
pub const FLUX_SYNC_FILE_NAME: &str = "gotk-sync.yaml";
pub const FLUX_PATCH_FILE_NAME: &str = "gotk-patches.yaml";

/// Serializes the cluster, datacenter and machine documents as one
/// multi-document YAML stream.
pub fn marshal_cluster_spec(
    cluster: &serde_yaml::Value,
    datacenter: Option<&serde_yaml::Value>,
    machines: &[serde_yaml::Value],
) -> Result<String, ManifestError> {
    let mut docs = vec![serde_yaml::to_string(cluster)?];
    if let Some(datacenter) = datacenter {
        docs.push(serde_yaml::to_string(datacenter)?);
    }
    for machine in machines {
        docs.push(serde_yaml::to_string(machine)?);
    }
    Ok(docs.join("---\n"))
}

/// Writes the manifests a cluster needs into the working copy.
#[derive(Debug)]
pub struct ManifestGenerator {
    templater: Templater,
}

impl ManifestGenerator {
    pub fn new() -> Result<Self, ManifestError> {
        Ok(Self {
            templater: Templater::new()?,
        })
    }

    /// Writes the cluster configuration and its kustomization.
    ///
    /// Returns `None` without touching the filesystem when no datacenter or
    /// machine documents were supplied.
    pub fn write_eksa_system_files(
        &self,
        writer: &ManifestWriter,
        ctx: &OperationContext<'_>,
    ) -> Result<Option<PathBuf>, ManifestError> {
        if !ctx.has_provider_config() {
            tracing::debug!("no provider configuration supplied, skipping eksa-system files");
            return Ok(None);
        }

        let w = writer.with_dir(&ctx.eksa_system_dir())?;
        tracing::debug!(dir = %w.dir().display(), "generating eksa-system files");

        let spec = marshal_cluster_spec(&ctx.spec().cluster, ctx.datacenter(), ctx.machines())?;
        w.write(CLUSTER_CONFIG_FILE_NAME, spec.as_bytes())?;

        let kustomization = self.templater.render(
            templater::EKSA_KUSTOMIZATION,
            context! { config_file_name => CLUSTER_CONFIG_FILE_NAME },
        )?;
        w.write(KUSTOMIZE_FILE_NAME, kustomization.as_bytes())?;

        Ok(Some(w.dir().to_path_buf()))
    }

    /// Writes the toolkit kustomization, sync placeholder and controller patches.
    pub fn write_flux_system_files(
        &self,
        writer: &ManifestWriter,
        ctx: &OperationContext<'_>,
    ) -> Result<PathBuf, ManifestError> {
        let w = writer.with_dir(&ctx.flux_system_dir())?;
        tracing::debug!(dir = %w.dir().display(), "generating flux-system files");

        let namespace = ctx.namespace();
        let kustomization = self
            .templater
            .render(templater::FLUX_KUSTOMIZATION, context! { namespace => namespace })?;
        w.write(KUSTOMIZE_FILE_NAME, kustomization.as_bytes())?;

        let sync = self.templater.render(templater::FLUX_SYNC, context! {})?;
        w.write(FLUX_SYNC_FILE_NAME, sync.as_bytes())?;

        let images = &ctx.spec().toolkit_images;
        let patches = self.templater.render(
            templater::FLUX_PATCHES,
            context! {
                namespace => namespace,
                source_controller_image => &images.source_controller,
                kustomize_controller_image => &images.kustomize_controller,
                helm_controller_image => &images.helm_controller,
                notification_controller_image => &images.notification_controller,
            },
        )?;
        w.write(FLUX_PATCH_FILE_NAME, patches.as_bytes())?;

        Ok(w.dir().to_path_buf())
    }
}
