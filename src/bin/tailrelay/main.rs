// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use tailrelay::delivery::LogNotifier;
use tailrelay::init::agent::Agent;
use tailrelay::init::args::{AgentRun, StoreArgs, SubscriberArgs};
use tailrelay::subscribers::SubscriberStore;

// The agent bounds its own shutdown; this only catches a wedged runtime.
const AGENT_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Tail a file and relay new lines to subscribers
    Start(Box<AgentRun>),

    /// Add a subscriber
    Subscribe(SubscriberArgs),

    /// Remove a subscriber
    Unsubscribe(SubscriberArgs),

    /// List subscribers
    Subscribers(StoreArgs),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "tailrelay")]
#[command(bin_name = "tailrelay")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "TAILRELAY_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let command = match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version());
            return ExitCode::SUCCESS;
        }
        Some(command) => command,
        None => {
            // unreachable while a subcommand is required
            eprintln!("ERROR: must specify a command");
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let res = match command {
        Commands::Start(agent) => run_agent(*agent),
        Commands::Subscribe(args) => subscribe(args),
        Commands::Unsubscribe(args) => unsubscribe(args),
        Commands::Subscribers(args) => list_subscribers(args),
        Commands::Version => Ok(()),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = e, "Command failed.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_agent(agent_args: AgentRun) -> Result<(), BoxError> {
    let mut agent_join_set = JoinSet::new();

    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        agent_join_set.spawn(async move { Agent::new(agent_args, LogNotifier).run(token).await });
    }

    select! {
        res = signal_wait() => {
            res?;
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        res = agent_join_set.join_next() => {
            return match res {
                Some(res) => {
                    res??;
                    warn!("Unexpected early exit of agent.");
                    Ok(())
                }
                None => Ok(()),
            };
        },
    }

    match timeout(AGENT_EXIT_TIMEOUT, agent_join_set.join_next()).await {
        Ok(Some(res)) => res?,
        Ok(None) => Ok(()),
        Err(_) => Err("timed out waiting for agent to exit".into()),
    }
}

fn subscribe(args: SubscriberArgs) -> Result<(), BoxError> {
    let store = SubscriberStore::open(&args.subscribers_path)?;
    let subscription = store.subscribe(args.id)?;
    println!(
        "{} subscribed since {}",
        subscription.user_id,
        subscription.created_at.to_rfc3339()
    );
    Ok(())
}

fn unsubscribe(args: SubscriberArgs) -> Result<(), BoxError> {
    let store = SubscriberStore::open(&args.subscribers_path)?;
    if store.unsubscribe(args.id)? {
        println!("{} unsubscribed", args.id);
    } else {
        println!("{} was not subscribed", args.id);
    }
    Ok(())
}

fn list_subscribers(args: StoreArgs) -> Result<(), BoxError> {
    let store = SubscriberStore::open(&args.subscribers_path)?;
    for id in store.subscribers()? {
        println!("{}", id);
    }
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("notify=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(stdout_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

async fn signal_wait() -> Result<(), BoxError> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}
