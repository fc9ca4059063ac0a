//! Artifact builder: renders every target environment concurrently.

use futures::future::try_join_all;

use crate::domain::{Environment, PublishError, RenderedArtifact, Result};
use crate::obs;
use crate::render::{execute_plan, plan_render, ChartRenderer, ChartSource};

/// Render one artifact per environment.
///
/// All overlays are resolved before the renderer is invoked at all, so a
/// missing overlay fails without any render work. Renders are then joined
/// all-or-nothing: the first failure drops the remaining in-flight renders.
/// The result follows the order of `environments`, not completion order.
pub async fn build_artifacts(
    renderer: &dyn ChartRenderer,
    source: &ChartSource,
    project: &str,
    environments: &[Environment],
) -> Result<Vec<RenderedArtifact>> {
    let mut plans = Vec::with_capacity(environments.len());
    for environment in environments {
        plans.push(plan_render(source, *environment).await?);
    }

    try_join_all(plans.iter().map(|plan| async move {
        let output = execute_plan(renderer, plan).await?;
        let artifact = RenderedArtifact::new(project, plan.environment, output);
        obs::emit_artifact_rendered(
            artifact.environment().as_str(),
            artifact.path(),
            artifact.content().len(),
        );
        Ok::<_, PublishError>(artifact)
    }))
    .await
}
