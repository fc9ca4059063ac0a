//! Render invoker: drives the external chart renderer for one environment.
//!
//! Values overlays follow a fixed layout inside the chart directory:
//! - ungrouped: `{chart}/values-{env}.yaml`, used only when present
//! - grouped:   `{chart}/{group}/values-{env}.yaml`, required for every group

use async_trait::async_trait;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::descriptor::DeployDescriptor;
use crate::domain::{Environment, PublishError, RenderError, Result};

/// One `template` invocation of the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub release_name: String,
    pub chart: PathBuf,
    pub namespace: String,
    pub values: Option<PathBuf>,
}

impl RenderRequest {
    /// Arguments for `helm template`.
    pub fn template_args(&self) -> Vec<String> {
        let mut args = vec![
            "template".to_string(),
            self.release_name.clone(),
            self.chart.to_string_lossy().into_owned(),
            "--no-hooks".to_string(),
            "--namespace".to_string(),
            self.namespace.clone(),
        ];
        if let Some(values) = &self.values {
            args.push("--values".to_string());
            args.push(values.to_string_lossy().into_owned());
        }
        args
    }
}

/// External template renderer.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Fetch the chart's declared dependencies into its `charts/` folder.
    async fn dependency_update(&self, chart: &Path) -> std::result::Result<(), RenderError>;

    /// Render the chart and return the manifest text.
    async fn template(&self, request: &RenderRequest) -> std::result::Result<String, RenderError>;
}

/// [`ChartRenderer`] backed by the `helm` binary.
#[derive(Debug, Clone)]
pub struct HelmRenderer {
    program: PathBuf,
    timeout: Duration,
}

impl HelmRenderer {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> std::result::Result<String, RenderError> {
        let program = self.program.to_string_lossy().into_owned();
        let command = format!("{} {}", program, args.join(" "));
        debug!(command = %command, "Invoking renderer");

        // Dropping the future (timeout, or a failed sibling render) kills the child.
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenderError::TimedOut {
                command: command.clone(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(RenderError::NonZeroExit {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        if !stderr.is_empty() {
            return Err(RenderError::Diagnostics { command, stderr });
        }

        String::from_utf8(output.stdout).map_err(|_| RenderError::InvalidOutput { command })
    }
}

#[async_trait]
impl ChartRenderer for HelmRenderer {
    async fn dependency_update(&self, chart: &Path) -> std::result::Result<(), RenderError> {
        self.run(vec![
            "dependency".to_string(),
            "update".to_string(),
            chart.to_string_lossy().into_owned(),
        ])
        .await
        .map(|_| ())
    }

    async fn template(&self, request: &RenderRequest) -> std::result::Result<String, RenderError> {
        self.run(request.template_args()).await
    }
}

/// Everything the invoker needs to know about the chart being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSource {
    /// Base release name (the source repository's short name).
    pub release_name: String,
    pub chart: PathBuf,
    pub namespace_prefix: String,
    pub flag_groups: Option<Vec<String>>,
}

impl ChartSource {
    pub fn new(release_name: &str, chart: PathBuf, descriptor: &DeployDescriptor) -> Self {
        Self {
            release_name: release_name.to_string(),
            chart,
            namespace_prefix: descriptor.namespace_prefix.clone(),
            flag_groups: descriptor.flag_groups.clone(),
        }
    }

    fn namespace(&self, environment: Environment) -> String {
        format!("{}-{}", self.namespace_prefix, environment)
    }
}

/// Overlay location for an environment, optionally inside a flag group.
pub fn overlay_path(chart: &Path, group: Option<&str>, environment: Environment) -> PathBuf {
    let file = format!("values-{environment}.yaml");
    match group {
        Some(group) => chart.join(group).join(file),
        None => chart.join(file),
    }
}

/// Resolved renderer invocations for one environment, in group order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPlan {
    pub environment: Environment,
    pub requests: Vec<RenderRequest>,
}

/// Resolve overlays for one environment without invoking the renderer.
pub async fn plan_render(source: &ChartSource, environment: Environment) -> Result<RenderPlan> {
    let namespace = source.namespace(environment);

    let requests = match &source.flag_groups {
        Some(groups) => {
            let mut requests = Vec::with_capacity(groups.len());
            for group in groups {
                let values = overlay_path(&source.chart, Some(group), environment);
                if !tokio::fs::try_exists(&values).await? {
                    return Err(PublishError::MissingValues {
                        group: group.clone(),
                        environment: environment.to_string(),
                        path: values,
                    });
                }
                requests.push(RenderRequest {
                    release_name: format!("{}-{}", source.release_name, group),
                    chart: source.chart.clone(),
                    namespace: namespace.clone(),
                    values: Some(values),
                });
            }
            requests
        }
        None => {
            let values = overlay_path(&source.chart, None, environment);
            let values = tokio::fs::try_exists(&values).await?.then_some(values);
            vec![RenderRequest {
                release_name: source.release_name.clone(),
                chart: source.chart.clone(),
                namespace,
                values,
            }]
        }
    };

    Ok(RenderPlan {
        environment,
        requests,
    })
}

/// Run every invocation of a plan concurrently and join the outputs in
/// group order, separated by a line break.
pub async fn execute_plan(renderer: &dyn ChartRenderer, plan: &RenderPlan) -> Result<String> {
    let outputs = try_join_all(plan.requests.iter().map(|request| async move {
        renderer
            .template(request)
            .await
            .map_err(|e| PublishError::render(plan.environment.as_str(), e))
    }))
    .await?;

    Ok(outputs.join("\n"))
}

/// Render one environment: resolve overlays, then invoke the renderer.
pub async fn render_environment(
    renderer: &dyn ChartRenderer,
    source: &ChartSource,
    environment: Environment,
) -> Result<String> {
    let plan = plan_render(source, environment).await?;
    execute_plan(renderer, &plan).await
}
