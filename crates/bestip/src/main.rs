// # bestip - fastest endpoint picker
//
// Thin front end over bestip-core:
// 1. Parse flags (each one has an environment fallback)
// 2. Validate the configuration before any I/O
// 3. Wire the speed-test runner, IP-list fetcher and DNS provider
// 4. Run the workflow once and print the summary
//
// All selection and DNS logic lives in bestip-core. This binary only
// assembles collaborators and maps the outcome to an exit code.
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
//
// bestip -i cf -s 5 -q 3 -n -d example.com
// ```
//
// ## Exit codes
//
// - 0: Run finished (including "nothing qualified" without --dns)
// - 1: Configuration error
// - 2: Runtime failure or cancellation

mod cli;
mod report;

use anyhow::Result;
use bestip_core::config::ProviderConfig;
use bestip_core::{RunFailure, SourceCatalog, WorkflowConfig, WorkflowCoordinator, WorkflowEvent};
use bestip_ip_list::HttpIpListFetcher;
use bestip_speedtest::{CsvResultParser, SpeedTestRunner};
use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Process exit codes
#[derive(Debug, Clone, Copy)]
enum BestipExitCode {
    /// Run finished
    Success = 0,
    /// Configuration error
    ConfigError = 1,
    /// Runtime failure or cancellation
    RuntimeError = 2,
}

impl From<BestipExitCode> for ExitCode {
    fn from(code: BestipExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        eprintln!("Configuration error: {}", e);
        return BestipExitCode::ConfigError.into();
    }

    let log_level = match cli.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BestipExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BestipExitCode::ConfigError.into();
    }

    let config = cli.to_config();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BestipExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BestipExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(config, cli.dry_run)).into()
}

/// Assemble the workflow, run it once and report
async fn run(config: WorkflowConfig, dry_run: bool) -> BestipExitCode {
    if let Err(e) = tokio::fs::create_dir_all(&config.test.work_dir).await {
        error!(
            "Cannot create work directory {}: {}",
            config.test.work_dir.display(),
            e
        );
        return BestipExitCode::RuntimeError;
    }

    let criteria = match config.filter.criteria() {
        Ok(criteria) => criteria,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return BestipExitCode::ConfigError;
        }
    };
    let domain = config.dns.domain.clone();

    let (coordinator, events) = match build_coordinator(config, dry_run) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BestipExitCode::ConfigError;
        }
    };

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(cancel_on_signal(cancel.clone()));
    let monitor = tokio::spawn(log_events(events));

    let outcome = coordinator.run_with_cancellation(cancel).await;

    signals.abort();
    // Dropping the coordinator closes the event channel so the monitor drains and exits
    drop(coordinator);
    let _ = monitor.await;

    match outcome {
        Ok(report) => {
            print!("{}", report::render(&report, &criteria, &domain));
            BestipExitCode::Success
        }
        Err(failure) => exit_code_for(&failure, &domain),
    }
}

fn build_coordinator(
    config: WorkflowConfig,
    dry_run: bool,
) -> Result<(WorkflowCoordinator, mpsc::Receiver<WorkflowEvent>)> {
    let runner = SpeedTestRunner::from_config(&config.test);
    let dns_enabled = config.dns.enabled;
    let provider_config = config.dns.provider.clone();

    let (coordinator, events) = WorkflowCoordinator::new(
        SourceCatalog::builtin(),
        Box::new(runner),
        Box::new(CsvResultParser::new()),
        config,
    )?;
    let coordinator = coordinator.with_ip_lists(Box::new(HttpIpListFetcher::new()));

    if !dns_enabled {
        return Ok((coordinator, events));
    }

    let coordinator = attach_provider(coordinator, &provider_config, dry_run)?;
    Ok((coordinator, events))
}

#[cfg(feature = "cloudflare")]
fn attach_provider(
    coordinator: WorkflowCoordinator,
    provider_config: &ProviderConfig,
    dry_run: bool,
) -> Result<WorkflowCoordinator> {
    let provider =
        bestip_provider_cloudflare::CloudflareProvider::from_config(provider_config, dry_run)?;
    info!(
        "DNS provider: {}{}",
        provider_config.type_name(),
        if dry_run { " (dry run)" } else { "" }
    );
    Ok(coordinator.with_provider(Box::new(provider)))
}

#[cfg(not(feature = "cloudflare"))]
fn attach_provider(
    _coordinator: WorkflowCoordinator,
    provider_config: &ProviderConfig,
    _dry_run: bool,
) -> Result<WorkflowCoordinator> {
    anyhow::bail!(
        "--dns needs the '{}' provider, which this build does not include",
        provider_config.type_name()
    )
}

fn exit_code_for(failure: &RunFailure, domain: &str) -> BestipExitCode {
    eprintln!("Run failed during {}: {}", failure.step, failure.cause);

    if !failure.applied.is_empty() {
        eprintln!("DNS changes applied before the failure:");
        eprint!("{}", report::render_applied(&failure.applied, domain));
    }

    if failure.is_configuration() {
        BestipExitCode::ConfigError
    } else {
        BestipExitCode::RuntimeError
    }
}

/// Log workflow events as they arrive
async fn log_events(mut events: mpsc::Receiver<WorkflowEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Event: {:?}", event);
    }
}

/// Cancel the run on SIGTERM or SIGINT
#[cfg(unix)]
async fn cancel_on_signal(cancel: CancellationToken) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to set up signal handlers: {}", e);
                return;
            }
        };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received {}, cancelling run", name);
    cancel.cancel();
}

/// Cancel the run on CTRL-C
#[cfg(not(unix))]
async fn cancel_on_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received CTRL-C, cancelling run");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to wait for CTRL-C: {}", e),
    }
}
