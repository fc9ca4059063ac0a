//! Manifest Publisher CLI
//!
//! The `manifest-publisher` command turns a published release into deploy
//! manifests committed to the deployment repository.
//!
//! ## Commands
//!
//! - `publish`: handle a `release` event payload end to end
//! - `render`: render a local checkout without touching git

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use manifest_publisher_core::{
    render_tree, ChartRenderer, Environment, HelmRenderer, PublishPipeline, PublishReport,
    PublisherConfig, ReleasePayload, RenderedTree, MAX_ATTEMPTS,
};
use manifest_publisher_github::{
    GitHubClient, GitHubConfig, RegistryClient, RegistryConfig, DEFAULT_API_URL,
};

#[derive(Parser)]
#[command(name = "manifest-publisher")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Render Helm manifests for a release and commit them to the deploy repository",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish manifests for a release event payload
    Publish {
        /// Path to the webhook payload (JSON)
        #[arg(long, env = "GITHUB_EVENT_PATH")]
        event: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        github: GitHubArgs,

        #[command(flatten)]
        registry: RegistryArgs,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Render manifests of a local checkout (no git calls)
    Render {
        /// Checkout root containing `.viaops.yml`
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Project name (release name and manifest folder)
        #[arg(long)]
        project: String,

        /// Write `{project}/deploy-{env}.yaml` files here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Owner of the deploy repository (default: the release owner)
    #[arg(long, env = "TARGET_OWNER")]
    target_owner: Option<String>,

    /// Deploy repository receiving the manifests
    #[arg(long, env = "SPINNAKER_REPO", default_value = "spinnaker")]
    target_repo: String,

    /// Branch ref to update, without the `refs/` prefix
    #[arg(long, env = "REF_SPINNAKER", default_value = "heads/main")]
    target_ref: String,

    /// Ref update attempts before giving up
    #[arg(long, default_value_t = MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Web base URL used in the registered artifact URL
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    web_base_url: String,

    /// Directory for staging release archives (default: system temp dir)
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct GitHubArgs {
    /// Token for the GitHub API and archive downloads
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    github_api_url: String,

    /// Timeout for every HTTP request, in seconds
    #[arg(long, default_value_t = 30)]
    http_timeout: u64,
}

#[derive(Args, Debug, Clone)]
struct RegistryArgs {
    /// Artifact registry base URL; registration is disabled when unset
    #[arg(long, env = "VIAOPS_URL")]
    viaops_url: Option<String>,

    /// Token endpoint for the registry credentials
    #[arg(long, env = "LOGIN_URL")]
    login_url: Option<String>,

    #[arg(long, env = "CLIENT_ID", default_value = "")]
    client_id: String,

    #[arg(long, env = "GRANT_TYPE", default_value = "password")]
    grant_type: String,

    #[arg(long, env = "VIAOPS_USERNAME", default_value = "")]
    viaops_username: String,

    #[arg(long, env = "VIAOPS_PASSWORD", default_value = "", hide_env_values = true)]
    viaops_password: String,

    #[arg(long, env = "SCOPE", default_value = "")]
    scope: String,
}

#[derive(Args, Debug, Clone)]
struct RenderArgs {
    /// Helm executable
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    helm_bin: PathBuf,

    /// Chart directory relative to the archive root
    #[arg(long, default_value = "chart")]
    chart_dir: String,

    /// Timeout for each helm invocation, in seconds
    #[arg(long, default_value_t = 120)]
    render_timeout: u64,

    /// Environments to render, in output order
    #[arg(long, value_delimiter = ',', default_value = "stg,sit,hlg,prd")]
    environments: Vec<Environment>,
}

impl RenderArgs {
    fn apply(&self, config: &mut PublisherConfig) {
        config.helm_bin = self.helm_bin.clone();
        config.chart_dir = self.chart_dir.clone();
        config.render_timeout_secs = self.render_timeout;
        config.environments = self.environments.clone();
    }
}

impl TargetArgs {
    fn apply(&self, config: &mut PublisherConfig) {
        config.target_owner = self.target_owner.clone();
        config.target_repo = self.target_repo.clone();
        config.target_ref = self.target_ref.clone();
        config.max_attempts = self.max_attempts;
        config.web_base_url = self.web_base_url.clone();
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
    }
}

impl RegistryArgs {
    /// Registry settings, or `None` when registration is disabled.
    fn to_config(&self, timeout_secs: u64) -> Result<Option<RegistryConfig>> {
        let Some(base_url) = &self.viaops_url else {
            return Ok(None);
        };
        let Some(login_url) = &self.login_url else {
            bail!("LOGIN_URL is required when VIAOPS_URL is set");
        };
        Ok(Some(RegistryConfig {
            base_url: base_url.clone(),
            login_url: login_url.clone(),
            client_id: self.client_id.clone(),
            grant_type: self.grant_type.clone(),
            username: self.viaops_username.clone(),
            password: self.viaops_password.clone(),
            scope: self.scope.clone(),
            timeout_secs,
        }))
    }
}

fn renderer_for(config: &PublisherConfig) -> HelmRenderer {
    HelmRenderer::new(config.helm_bin.clone(), config.render_timeout())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    manifest_publisher_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Publish {
            event,
            target,
            github,
            registry,
            render,
        } => {
            let report = cmd_publish(&event, &target, &github, &registry, &render).await?;
            if let Some(report) = report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Commands::Render {
            root,
            project,
            out,
            render,
        } => {
            let mut config = PublisherConfig::default();
            render.apply(&mut config);
            config.validate()?;
            let renderer = renderer_for(&config);
            cmd_render(&renderer, &config, &root, &project, out.as_deref()).await
        }
    }
}

/// Handle a release event payload; `None` when the action is ignored.
async fn cmd_publish(
    event_path: &Path,
    target: &TargetArgs,
    github: &GitHubArgs,
    registry: &RegistryArgs,
    render: &RenderArgs,
) -> Result<Option<PublishReport>> {
    let raw = tokio::fs::read_to_string(event_path)
        .await
        .with_context(|| format!("Failed to read event payload {}", event_path.display()))?;
    let payload = ReleasePayload::from_json(&raw)?;
    if !payload.is_released() {
        info!(action = %payload.action, "Ignoring release event");
        return Ok(None);
    }
    let event = payload.into_event()?;

    let mut config = PublisherConfig::default();
    target.apply(&mut config);
    render.apply(&mut config);

    let github_config = GitHubConfig {
        timeout_secs: github.http_timeout,
        ..GitHubConfig::new(&github.github_token).with_api_url(&github.github_api_url)
    };
    let client = Arc::new(
        GitHubClient::new(&github_config).context("Failed to create GitHub client")?,
    );
    let renderer = Arc::new(renderer_for(&config));

    let mut pipeline = PublishPipeline::new(config, client.clone(), renderer, client)
        .context("Invalid publisher configuration")?;
    if let Some(registry_config) = registry.to_config(github.http_timeout)? {
        let registry_client =
            RegistryClient::new(registry_config).context("Failed to create registry client")?;
        pipeline = pipeline.with_registry(Arc::new(registry_client));
    }

    let report = pipeline
        .publish(&event)
        .await
        .with_context(|| format!("Failed to publish {}", event.tag_name()))?;
    if !report.committed() {
        warn!("Release skipped; nothing was committed");
    }
    Ok(Some(report))
}

/// Render a local checkout to `out`, or to stdout as a multi-document stream.
async fn cmd_render(
    renderer: &dyn ChartRenderer,
    config: &PublisherConfig,
    root: &Path,
    project: &str,
    out: Option<&Path>,
) -> Result<()> {
    let artifacts = match render_tree(renderer, config, project, root).await? {
        RenderedTree::Rendered { artifacts, .. } => artifacts,
        RenderedTree::Skipped(gap) => {
            warn!(gap = %gap, "Nothing to render");
            return Ok(());
        }
    };

    match out {
        Some(dir) => {
            for artifact in &artifacts {
                let path = dir.join(artifact.path());
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, artifact.content())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Wrote manifest");
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            for artifact in &artifacts {
                writeln!(stdout, "---\n# Source: {}", artifact.path())?;
                stdout.write_all(artifact.content())?;
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}
