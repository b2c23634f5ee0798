use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reply_loop::action::{self, Action};
use reply_loop::config::{credential_from_env, Config};
use reply_loop::error::ReplyError;
use reply_loop::generator::OpenAiGenerator;
use reply_loop::loop_controller::{LoopController, LoopResult};
use reply_loop::state::SharedState;
use reply_loop::twitter::XGateway;

/// Reply Loop: answer mentions and direct messages with generated replies
#[derive(Parser, Debug)]
#[command(name = "reply-loop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (TOML format)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Seconds between polling cycles (default: 60)
    #[arg(short = 'i', long = "interval")]
    interval: Option<u64>,

    /// Maximum reply length in characters (default: 280)
    #[arg(short = 'l', long = "message-limit")]
    message_limit: Option<usize>,

    /// Stop after this many cycles (omit to run until Ctrl+C)
    #[arg(short = 'n', long = "cycles")]
    cycles: Option<u32>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message and exit without polling
    #[command(group(ArgGroup::new("target").required(true).args(["reply", "dm"])))]
    Send {
        /// Reply under this tweet id
        #[arg(long, value_name = "TWEET_ID")]
        reply: Option<String>,

        /// Direct message this user id
        #[arg(long, value_name = "USER_ID")]
        dm: Option<String>,

        /// Message text, truncated to the message limit
        text: String,
    },
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("reply_loop=debug,info")
    } else {
        EnvFilter::new("reply_loop=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ReplyError> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.merge_cli_args(cli.interval, cli.message_limit, cli.cycles);
    config.validate()?;
    Ok(config)
}

fn build_collaborators(config: &Config) -> anyhow::Result<(XGateway, OpenAiGenerator)> {
    let access_token = credential_from_env(&config.gateway.access_token_env)
        .context("platform gateway credentials")?;
    let api_key = credential_from_env(&config.generator.api_key_env)
        .context("response generator credentials")?;

    Ok((
        XGateway::new(&config.gateway, access_token),
        OpenAiGenerator::new(config.generator.clone(), api_key),
    ))
}

async fn send_once(config: &Config, action: &Action, text: &str) -> anyhow::Result<String> {
    let access_token = credential_from_env(&config.gateway.access_token_env)
        .context("platform gateway credentials")?;
    let gateway = XGateway::new(&config.gateway, access_token);
    let sent = action::perform(&gateway, action, text, config.message_limit)
        .await
        .with_context(|| format!("sending {}", action.kind()))?;
    Ok(sent)
}

async fn print_summary(state: &SharedState) {
    let stats = state.snapshot().await;
    println!(
        "  {} cycle(s), {} failed cycle(s); {} sent, {} skipped, {} failed event(s)",
        stats.cycles, stats.cycle_failures, stats.sent, stats.skipped, stats.failed
    );
    let per_kind = [
        ("mentions", stats.mentions),
        ("direct messages", stats.direct_messages),
    ];
    for (label, counts) in per_kind {
        println!(
            "    {}: {} sent, {} skipped, {} failed",
            label, counts.sent, counts.skipped, counts.failed
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(Command::Send { reply, dm, text }) = &cli.command {
        let action = match (reply.clone(), dm.clone()) {
            (Some(tweet_id), _) => Action::Reply { tweet_id },
            (None, Some(user_id)) => Action::DirectMessage { user_id },
            (None, None) => {
                error!("send needs --reply or --dm");
                std::process::exit(2);
            }
        };
        match send_once(&config, &action, text).await {
            Ok(sent) => {
                println!("{} {}", "SENT:".green().bold(), sent);
                std::process::exit(0);
            }
            Err(e) => {
                error!("{:#}", e);
                println!("\n{} {:#}", "FAILED:".red().bold(), e);
                std::process::exit(1);
            }
        }
    }

    let (gateway, generator) = match build_collaborators(&config) {
        Ok(pair) => pair,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    // Setup shutdown signal handling
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("Received Ctrl+C, finishing current event...");
        let _ = shutdown_tx.send(true);
    });

    info!(
        "Polling every {}s, replies limited to {} characters",
        config.interval_secs, config.message_limit
    );
    if let Some(max) = config.max_cycles {
        info!("Stopping after {} cycle(s)", max);
    }

    let state = SharedState::new_shared();
    let mut controller =
        LoopController::with_state(config, gateway, generator, shutdown_rx, state.clone());

    match controller.run().await {
        Ok(LoopResult::CyclesExhausted { cycles }) => {
            println!(
                "\n{} Completed {} cycle(s)",
                "DONE:".green().bold(),
                cycles
            );
            print_summary(&state).await;
            std::process::exit(0);
        }
        Ok(LoopResult::Shutdown { cycles }) => {
            println!(
                "\n{} Shutdown after {} cycle(s)",
                "INTERRUPTED:".yellow().bold(),
                cycles
            );
            print_summary(&state).await;
            std::process::exit(130); // Standard exit code for Ctrl+C
        }
        Err(e) => {
            error!("{}", e);
            println!("\n{} {}", "FAILED:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
