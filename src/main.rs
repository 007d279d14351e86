use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scan_client_rs::api::{HttpScanApi, ScanApi};
use scan_client_rs::config::{ClientConfig, PollPolicy, DEFAULT_BASE_URL, DEFAULT_MAX_ATTEMPTS};
use scan_client_rs::render::{render_vulnerabilities, RenderStyle};
use scan_client_rs::server::{self, MockConfig};
use scan_client_rs::sink::ConsoleSink;
use scan_client_rs::{ScanManager, ScanSession, TaskId};

/// scan-client-rs — submit, watch and stop scans on an OpenVAS-style scan service.
#[derive(Debug, Parser)]
#[command(
    name = "scan-client-rs",
    version,
    about = "Submit, watch and stop scans on an OpenVAS-style scan service.",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct ServiceArgs {
    /// Base URL of the scan service.
    #[arg(long = "api-url", env = "SCAN_API_URL", default_value = DEFAULT_BASE_URL, global = true)]
    api_url: String,

    /// Delay between status polls in milliseconds.
    #[arg(long = "poll-interval-ms", env = "SCAN_POLL_INTERVAL_MS", default_value_t = 5_000, global = true)]
    poll_interval_ms: u64,

    /// Status polls before a scan is reported as timed out.
    #[arg(long = "max-attempts", env = "SCAN_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    max_attempts: u32,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 30_000, global = true)]
    timeout_ms: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start one scan per target and follow them until they finish (Ctrl+C stops them).
    Scan {
        /// Hosts, IPs or URLs to scan.
        #[arg(required = true)]
        targets: Vec<String>,

        /// Scan profile, e.g. full, fast or discovery.
        #[arg(long = "scan-type")]
        scan_type: Option<String>,

        /// One status line per scan instead of a detailed panel.
        #[arg(long, default_value_t = false)]
        compact: bool,

        /// Write final sessions as pretty JSON to this path (optional).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    #[command(flatten)]
    Call(CallCommand),
    /// Run the simulated scan service.
    ServeMock {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,

        /// Status polls before a simulated task reports Done.
        #[arg(long = "polls-until-done", default_value_t = 3)]
        polls_until_done: u32,
    },
}

/// One-shot requests against the service.
#[derive(Debug, Subcommand)]
enum CallCommand {
    /// Show the raw service status of a task.
    Status { task_id: String },
    /// Fetch and print the results of a finished task.
    Results { task_id: String },
    /// Ask the service to stop a task.
    Stop { task_id: String },
    /// Check that the service can reach its scanner.
    TestConnection,
    /// Check that the service is up.
    Health,
}

impl ServiceArgs {
    fn client_config(&self, style: RenderStyle) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            request_timeout: Duration::from_millis(self.timeout_ms),
            poll: PollPolicy {
                interval: Duration::from_millis(self.poll_interval_ms),
                max_attempts: self.max_attempts,
            },
            style,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_client_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ServeMock { bind, polls_until_done } => {
            let config = MockConfig {
                polls_until_done,
                ..MockConfig::default()
            };
            println!("Simulated scan service on http://{} (Ctrl+C to stop)", bind);
            tokio::select! {
                res = server::spawn_server(&bind, config) => res?,
                _ = tokio::signal::ctrl_c() => {}
            }
            Ok(())
        }
        Command::Scan { targets, scan_type, compact, output } => {
            let style = if compact { RenderStyle::Compact } else { RenderStyle::Detailed };
            let config = cli.service.client_config(style);
            run_scans(&config, &targets, scan_type.as_deref(), output.as_deref()).await
        }
        Command::Call(call) => {
            let config = cli.service.client_config(RenderStyle::Detailed);
            config.validate()?;
            let api = HttpScanApi::new(&config)?;
            run_single_call(&api, call).await
        }
    }
}

async fn run_scans(
    config: &ClientConfig,
    targets: &[String],
    scan_type: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    config.validate()?;
    println!("scan-client-rs configuration:");
    println!("  api_url      : {}", config.base_url);
    println!("  scan_type    : {}", scan_type.unwrap_or("<service default>"));
    println!("  interval_ms  : {}", config.poll.interval.as_millis());
    println!("  max_attempts : {}", config.poll.max_attempts);
    println!("  budget_s     : {}", config.poll.budget().as_secs());

    let api = Arc::new(HttpScanApi::new(config)?);
    let manager =
        ScanManager::new(api, Arc::new(ConsoleSink), config.poll)?.with_style(config.style);

    let mut handles = Vec::new();
    for target in targets {
        match manager.submit(target, scan_type).await {
            Ok(handle) => handles.push(handle),
            Err(e) => eprintln!("Error: {target}: {e}"),
        }
    }
    if handles.is_empty() {
        bail!("no scan could be started");
    }

    let waiter = {
        let manager = manager.clone();
        let handles = handles.clone();
        async move {
            for handle in &handles {
                manager.wait(handle).await?;
            }
            anyhow::Ok(())
        }
    };
    tokio::select! {
        res = waiter => res?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nStopping {} scan(s)...", handles.len());
            for res in manager.stop_all().await {
                if let Err(e) = res {
                    warn!(error = %e, "failed to stop scan");
                }
            }
        }
    }

    let sessions = manager.sessions().await;
    print_sessions_table(&sessions);
    if let Some(path) = output {
        if let Err(e) = write_sessions_json(path, &sessions) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON sessions to {}", path.display());
        }
    }
    Ok(())
}

async fn run_single_call(api: &HttpScanApi, call: CallCommand) -> Result<()> {
    match call {
        CallCommand::Status { task_id } => {
            let reply = api.get_status(&TaskId::new(task_id)).await?;
            if reply.is_error() {
                println!("Error: {}", reply.message.as_deref().unwrap_or("unknown error"));
            } else {
                println!("Status: {}", reply.status);
            }
        }
        CallCommand::Results { task_id } => {
            let reply = api.get_results(&TaskId::new(task_id)).await?;
            if reply.is_completed() {
                println!("{}", render_vulnerabilities(&reply.vulnerabilities));
            } else {
                println!(
                    "Error retrieving results: {}",
                    reply.message.as_deref().unwrap_or(&reply.status)
                );
            }
        }
        CallCommand::Stop { task_id } => {
            let reply = api.stop_scan(&TaskId::new(task_id)).await?;
            println!("{}", reply.message);
        }
        CallCommand::TestConnection => {
            let reply = api.test_connection().await?;
            println!("{}", scan_client_rs::render::render_connection(&reply));
        }
        CallCommand::Health => {
            let reply = api.health().await.context("backend is not reachable")?;
            println!("{}", scan_client_rs::render::render_health(&reply));
        }
    }
    Ok(())
}

fn print_sessions_table(sessions: &[ScanSession]) {
    let mut target_w = "target".len();
    let mut task_w = "task_id".len();
    for s in sessions {
        target_w = target_w.max(s.target.len().min(40));
        task_w = task_w.max(s.task_id.as_str().len());
    }
    let status_w = "timeout".len();
    let att_w = "attempts".len();
    let vuln_w = "vulns".len();

    println!("\nScans: {}", sessions.len());
    println!(
        "{:<target_w$}  {:<task_w$}  {:<status_w$}  {:>att_w$}  {:>vuln_w$}  message",
        "target", "task_id", "status", "attempts", "vulns",
    );
    println!(
        "{:-<target_w$}  {:-<task_w$}  {:-<status_w$}  {:-<att_w$}  {:-<vuln_w$}  -------",
        "", "", "", "", "",
    );
    for s in sessions {
        let target: String = s.target.chars().take(40).collect();
        let vulns = s
            .vulnerabilities
            .as_ref()
            .map(|v| v.len().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<target_w$}  {:<task_w$}  {:<status_w$}  {:>att_w$}  {:>vuln_w$}  {}",
            target,
            s.task_id,
            s.status,
            format!("{}/{}", s.attempts, s.max_attempts),
            vulns,
            s.message.as_deref().unwrap_or_default().replace('\n', " "),
        );
    }
}

fn write_sessions_json(path: &Path, sessions: &[ScanSession]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, sessions)?;
    Ok(())
}
