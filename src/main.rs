use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use appointbot_core::config::{self, Config};
use appointbot_core::keepalive::{run_keepalive, KeepAliveTimer};
use appointbot_core::relay::RelayProfile;
use appointbot_core::service::http::{serve, AppState};
use appointbot_core::types::ChatEnvelope;

#[derive(Parser)]
#[command(
    name = "appointbot",
    about = "Appointment chat relay and database keep-alive",
    version = appointbot_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP triggers and run the keep-alive timer
    Serve {
        /// HTTP port
        #[arg(short, long, default_value_t = 7071)]
        port: u16,
        /// Do not start the keep-alive timer
        #[arg(long)]
        no_timer: bool,
    },
    /// Relay one message to the chat service and print the reply
    Chat {
        /// Message to send
        message: Vec<String>,
        /// Relay profile (assistant or strict)
        #[arg(short, long, default_value = "assistant")]
        profile: String,
    },
    /// Run the database keep-alive query once
    Keepalive,
    /// Run only the keep-alive timer
    Timer,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("appointbot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_from_env();

    match cli.command {
        Commands::Serve { port, no_timer } => cmd_serve(cfg, port, no_timer).await?,
        Commands::Chat { message, profile } => cmd_chat(cfg, message, profile).await?,
        Commands::Keepalive => cmd_keepalive(cfg).await?,
        Commands::Timer => cmd_timer(cfg).await?,
    }

    Ok(())
}

async fn cmd_serve(cfg: Config, port: u16, no_timer: bool) -> Result<()> {
    let state = Arc::new(AppState::from_config(cfg.clone()));
    let (stop_tx, stop_rx) = watch::channel(());

    let timer_handle = if no_timer || !cfg.keepalive.enabled {
        info!("Keep-alive timer disabled");
        None
    } else {
        match build_timer(&cfg, &state) {
            Ok(timer) => Some(tokio::spawn(timer.run(stopped(stop_rx)))),
            Err(e) => {
                warn!("Keep-alive timer not started: {}", e);
                None
            }
        }
    };

    let addr = format!("0.0.0.0:{}", port);
    println!("Starting appointbot HTTP triggers on {}...", addr);
    serve(&addr, state, ctrl_c()).await?;

    let _ = stop_tx.send(());
    if let Some(handle) = timer_handle {
        handle.await?;
    }
    Ok(())
}

async fn cmd_chat(cfg: Config, message: Vec<String>, profile: String) -> Result<()> {
    let Some(profile) = RelayProfile::from_name(&profile) else {
        bail!("Unknown profile '{}': expected assistant or strict", profile);
    };
    let message = message.join(" ");

    let state = AppState::from_config(cfg);
    let relay = state.relay(profile)?;
    let reply = relay.relay(Some(&message)).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&ChatEnvelope { response: reply })?
    );
    Ok(())
}

async fn cmd_keepalive(cfg: Config) -> Result<()> {
    let state = AppState::from_config(cfg);
    let probe = state.probe()?;
    let report = run_keepalive(probe.as_ref(), "cli").await?;
    println!("Database ready ({}ms)", report.elapsed.as_millis());
    Ok(())
}

async fn cmd_timer(cfg: Config) -> Result<()> {
    let state = AppState::from_config(cfg.clone());
    let timer = build_timer(&cfg, &state)?;
    println!("Keep-alive timer running on '{}' ({})", cfg.keepalive.schedule, cfg.keepalive.timezone);
    timer.run(ctrl_c()).await;
    Ok(())
}

fn build_timer(cfg: &Config, state: &AppState) -> Result<KeepAliveTimer> {
    let probe = state.probe()?;
    let timezone = cfg.keepalive.timezone()?;
    Ok(KeepAliveTimer::new(&cfg.keepalive.schedule, timezone, probe)?)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
}

async fn stopped(mut rx: watch::Receiver<()>) {
    let _ = rx.changed().await;
}
