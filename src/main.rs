use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_lead_verifier::config::{Cli, Config, GatewayConfig};
use rust_lead_verifier::errors::PipelineError;
use rust_lead_verifier::executor::VerificationExecutor;
use rust_lead_verifier::gateway_client::RemoteSessionGateway;
use rust_lead_verifier::mock_gateway::MockGateway;
use rust_lead_verifier::pipeline::Pipeline;
use rust_lead_verifier::progress::TracingProgress;
use rust_lead_verifier::session::SessionGateway;

fn build_gateway(config: &GatewayConfig) -> Result<Box<dyn SessionGateway>, PipelineError> {
    match config {
        GatewayConfig::Mock(strategy) => {
            tracing::info!("Mock mode ({:?}); no session is used", strategy);
            Ok(Box::new(MockGateway::new(*strategy)))
        }
        GatewayConfig::Remote {
            base_url,
            token,
            session_file,
            request_timeout,
        } => {
            let gateway = RemoteSessionGateway::new(
                base_url,
                token.clone(),
                session_file.clone(),
                *request_timeout,
            )?;
            tracing::info!("✓ Session gateway client initialized: {}", base_url);
            Ok(Box::new(gateway))
        }
    }
}

/// Main entry point.
///
/// Loads `.env`, parses the CLI, wires Ctrl-C to the pipeline's cancellation
/// token and maps the outcome to an exit status: 0 for a completed or
/// interrupted run, non-zero for setup, storage or fatal session failures.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose || cli.attended {
        "rust_lead_verifier=debug,lead_verifier=debug"
    } else {
        "rust_lead_verifier=info,lead_verifier=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let gateway = match build_gateway(&config.gateway) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing the current record and saving progress");
            signal_token.cancel();
        }
    });

    let executor = VerificationExecutor::new(gateway, config.executor);
    let mut pipeline = Pipeline::new(
        config.pipeline.clone(),
        executor,
        config.rate.limiter(),
        Box::new(TracingProgress),
        cancel,
    );

    match pipeline.run().await {
        Ok(report) => {
            if report.completed() {
                tracing::info!("Run {} complete", report.run_id);
            } else {
                tracing::warn!("Run {} interrupted; rerun with --resume", report.run_id);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            if e.is_setup_failure() {
                tracing::error!("Nothing was verified");
            }
            ExitCode::from(e.exit_code())
        }
    }
}
