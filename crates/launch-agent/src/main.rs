//! `launch-agent` CLI
//!
//! ```bash
//! # Deploy a repository, trying detected roots then the generic fallback
//! launch-agent deploy acme/shop --branch main
//!
//! # Skip detection entirely
//! launch-agent deploy acme/shop --build "npm run build" --start "npm start"
//!
//! # Mobile access
//! launch-agent mobile deploy acme/phone --secret s3cr3t --branch dev
//! launch-agent mobile status
//! launch-agent mobile recover
//! launch-agent mobile stop
//! ```
//!
//! Ctrl-C cancels an in-flight deployment between status polls.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use launch_agent::config::AgentConfig;
use launch_agent::providers::{
    AgentTunnelProvider, GitHubSource, HostingProvider, HttpHostingProvider, SourceRepository,
};
use launch_agent::record::DEFAULT_RECORD_FILE;
use launch_agent::{
    resolve_inputs, MobileDeploymentCoordinator, MobileRecord, MobileTarget, ProgressEvent,
    ProgressTx, RetryOrchestrator, TunnelLifecycleManager,
};
use planner::{Framework, RepoRef, StrategyOverrides};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (values override LAUNCH_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Status poll interval in milliseconds (overrides config)
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a repository with strategy fallback
    Deploy(DeployArgs),
    /// Mobile access: tunnel plus client deployment
    #[command(subcommand)]
    Mobile(MobileCommand),
}

#[derive(clap::Args, Debug)]
struct DeployArgs {
    /// Repository as owner/name
    repository: String,
    #[arg(long, default_value = "main")]
    branch: String,
    #[arg(long)]
    root: Option<String>,
    /// Framework slug (nextjs, vite, expo, ...)
    #[arg(long)]
    framework: Option<String>,
    #[arg(long)]
    build: Option<String>,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    install: Option<String>,
    #[arg(long)]
    output: Option<String>,
}

#[derive(Subcommand, Debug)]
enum MobileCommand {
    /// Create a tunnel and deploy the mobile client against it
    Deploy {
        /// Repository as owner/name [default: mobile.client_repository]
        repository: Option<String>,
        /// Access secret injected into the client deployment
        #[arg(long, env = "LAUNCH_MOBILE_SECRET")]
        secret: String,
        /// [default: mobile.client_branch]
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = DEFAULT_RECORD_FILE)]
        record: PathBuf,
    },
    /// Check whether the recorded tunnel still exists
    Status {
        #[arg(long, default_value = DEFAULT_RECORD_FILE)]
        record: PathBuf,
    },
    /// Replace a vanished tunnel and update the deployment environment
    Recover {
        #[arg(long, default_value = DEFAULT_RECORD_FILE)]
        record: PathBuf,
    },
    /// Delete the recorded tunnel
    Stop {
        #[arg(long, default_value = DEFAULT_RECORD_FILE)]
        record: PathBuf,
    },
}

struct Agent {
    config: AgentConfig,
    hosting: Arc<dyn HostingProvider>,
    source: Arc<dyn SourceRepository>,
    orchestrator: Arc<RetryOrchestrator>,
}

impl Agent {
    fn new(config: AgentConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let hosting: Arc<dyn HostingProvider> = Arc::new(
            HttpHostingProvider::new(&config.hosting, timeout)
                .context("Failed to build hosting client")?,
        );
        let source: Arc<dyn SourceRepository> = Arc::new(
            GitHubSource::new(&config.source, timeout).context("Failed to build source client")?,
        );
        let orchestrator = Arc::new(
            RetryOrchestrator::new(hosting.clone(), config.poll_interval())
                .with_log_limit(config.log_limit),
        );
        Ok(Self {
            config,
            hosting,
            source,
            orchestrator,
        })
    }

    fn coordinator(&self) -> Result<MobileDeploymentCoordinator> {
        let tunnel_provider =
            AgentTunnelProvider::new(&self.config.tunnel, self.config.request_timeout())
                .context("Failed to build tunnel client")?;
        let tunnels = TunnelLifecycleManager::new(
            Arc::new(tunnel_provider),
            self.config.tunnel.proto.clone(),
        );
        let target = MobileTarget {
            local_port: self.config.mobile.local_port,
            general_env: self.config.general_env(),
        };
        Ok(MobileDeploymentCoordinator::new(
            tunnels,
            self.source.clone(),
            self.hosting.clone(),
            self.orchestrator.clone(),
            target,
        ))
    }
}

fn overrides_from(args: &DeployArgs) -> Result<StrategyOverrides> {
    let framework = match args.framework.as_deref() {
        Some(slug) => Some(
            Framework::from_slug(slug).with_context(|| format!("Unknown framework '{slug}'"))?,
        ),
        None => None,
    };
    Ok(StrategyOverrides {
        framework,
        root_directory: args.root.clone(),
        build_command: args.build.clone(),
        start_command: args.start.clone(),
        install_command: args.install.clone(),
        output_directory: args.output.clone(),
    })
}

fn render(event: &ProgressEvent) {
    match event {
        ProgressEvent::StrategyStarted {
            index,
            total,
            label,
        } => println!("[{}/{}] trying {label}", index + 1, total),
        ProgressEvent::AttemptCreated {
            deployment_id,
            inspector_url,
            ..
        } => match inspector_url {
            Some(url) => println!("      deployment {deployment_id} ({url})"),
            None => println!("      deployment {deployment_id}"),
        },
        ProgressEvent::Status { update, .. } => println!("      {}", update.status),
        ProgressEvent::StrategyFailed { failure } => {
            println!("      failed: {}", failure.message);
            if let Some(tail) = &failure.log_tail {
                for line in tail.lines() {
                    println!("      | {line}");
                }
            }
        }
        ProgressEvent::Succeeded { label, url, .. } => {
            println!("ready via {label}: {}", url.as_deref().unwrap_or("(no url)"))
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling deployment");
            token.cancel();
        }
    });
}

/// Channel whose events are printed as they arrive.
fn progress_printer() -> (ProgressTx, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&event);
        }
    });
    (tx, printer)
}

async fn run_deploy(agent: &Agent, args: DeployArgs) -> Result<()> {
    let repository = RepoRef::parse(&args.repository)?;
    let overrides = overrides_from(&args)?;
    let inputs = resolve_inputs(
        agent.source.as_ref(),
        repository,
        &args.branch,
        overrides,
        agent.config.general_env(),
    )
    .await;

    let mut handle = agent.orchestrator.start_deployment(inputs, Vec::new());
    cancel_on_ctrl_c(handle.cancellation_token());
    while let Some(event) = handle.next_event().await {
        render(&event);
    }
    match handle.wait().await {
        Ok(success) => {
            info!(strategy = %success.strategy.label, attempts = success.failures.len() + 1, "done");
            Ok(())
        }
        Err(err) => {
            for failure in err.failures() {
                eprintln!("  {failure}");
            }
            Err(anyhow::Error::new(err).context("Deployment failed"))
        }
    }
}

async fn run_mobile(agent: &Agent, command: MobileCommand) -> Result<()> {
    let coordinator = agent.coordinator()?;
    match command {
        MobileCommand::Deploy {
            repository,
            secret,
            branch,
            record,
        } => {
            let repository = RepoRef::parse(
                repository
                    .as_deref()
                    .unwrap_or(&agent.config.mobile.client_repository),
            )?;
            let branch = branch.unwrap_or_else(|| agent.config.mobile.client_branch.clone());
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let (tx, printer) = progress_printer();
            let result = coordinator
                .deploy(&repository, &secret, &branch, &cancel, Some(&tx))
                .await;
            drop(tx);
            let _ = printer.await;
            let deployment = result
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.category()))
                .context("Mobile deployment failed")?;
            println!("tunnel: {}", deployment.tunnel.public_url);
            if let Some(url) = &deployment.deployment.url {
                println!("client: {url}");
            }
            MobileRecord::new(deployment).save(&record)?;
        }
        MobileCommand::Status { record } => {
            let mut saved = MobileRecord::load(&record)?;
            let status = coordinator.check_status(saved.tunnel_id(), saved.active).await;
            println!("active: {} (verified: {})", status.active, status.verified);
            if status.needs_recovery() {
                println!("tunnel is gone; run `launch-agent mobile recover`");
            }
            if status.verified && status.active != saved.active {
                saved.set_active(status.active);
                saved.save(&record)?;
            }
        }
        MobileCommand::Recover { record } => {
            let mut saved = MobileRecord::load(&record)?;
            let tunnel = coordinator
                .recover(&saved.deployment)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.category()))
                .context("Tunnel recovery failed")?;
            println!("tunnel: {}", tunnel.public_url);
            saved.deployment.tunnel = tunnel;
            saved.set_active(true);
            saved.save(&record)?;
        }
        MobileCommand::Stop { record } => {
            let saved = MobileRecord::load(&record)?;
            coordinator.stop(saved.tunnel_id()).await;
            MobileRecord::remove(&record)?;
            println!("stopped");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    config.validate()?;

    let agent = Agent::new(config)?;
    match cli.command {
        Command::Deploy(args) => run_deploy(&agent, args).await,
        Command::Mobile(command) => run_mobile(&agent, command).await,
    }
}
