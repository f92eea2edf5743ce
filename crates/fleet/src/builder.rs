//! Agent image build stage

use crate::error::BuildFailure;
use crate::spec::{BuildSpec, FleetSpec};
use sandbox::{BuildOptions, ContainerBackend, ContainerError};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Build arg naming the host opencode config directory
pub const CONFIG_HOST_BUILD_ARG: &str = "OPENCODE_CONFIG_HOST";

/// Builds the shared agent image once per run
pub struct ImageBuilder {
    backend: Arc<dyn ContainerBackend>,
}

impl ImageBuilder {
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    /// Build options for `spec`, forwarding the config directory when known
    pub fn options(build: &BuildSpec, config_host: Option<&Path>) -> BuildOptions {
        let mut options = BuildOptions::new();
        if let Some(file) = &build.dockerfile {
            options = options.file(file);
        }
        if let Some(dir) = config_host {
            options = options.build_arg(CONFIG_HOST_BUILD_ARG, dir.display().to_string());
        }
        options
    }

    /// Build `fleet.image`. Returns immediately when the build stage is disabled.
    pub async fn build(&self, fleet: &FleetSpec) -> Result<(), BuildFailure> {
        let Some(build) = &fleet.build else {
            info!(target: "fleet::build", image = %fleet.image, "Skipping image build");
            return Ok(());
        };

        info!(
            target: "fleet::build",
            image = %fleet.image,
            context = %build.context_dir.display(),
            backend = self.backend.name(),
            "Building agent image"
        );

        let options = Self::options(build, fleet.template.config_host.as_deref());
        match self
            .backend
            .build(&build.context_dir, &fleet.image, Some(options))
            .await
        {
            Ok(()) => {
                info!(target: "fleet::build", image = %fleet.image, "Image built");
                Ok(())
            }
            Err(e) => {
                error!(
                    target: "fleet::build",
                    image = %fleet.image,
                    error = %e,
                    "Image build failed"
                );
                let output = match e {
                    ContainerError::BuildFailed { output, .. } => output,
                    other => other.to_string(),
                };
                Err(BuildFailure {
                    image: fleet.image.clone(),
                    output,
                })
            }
        }
    }
}
