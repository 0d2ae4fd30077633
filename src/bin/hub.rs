use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use site_sentinel::{
    Credentials, ServerProfile, Target,
    config::{Config, read_config_file},
    monitors::{Cancellation, cycle::MonitorCycle, scheduler::Scheduler},
    storage::{self, TargetStore},
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file; built-in defaults when absent
    #[arg(short)]
    file: Option<String>,

    /// Log at debug level (twice for trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check all targets on the configured interval until Ctrl-C
    Run,
    /// Run a single monitoring cycle
    Once,
    /// Start monitoring a URL
    Add { url: String },
    /// Stop monitoring a URL
    Remove { url: String },
    /// Switch down alerts for a URL on or off
    Toggle { url: String },
    /// Show the last known state of every target
    Status,
    /// Watch CPU, RAM and disk of the server behind a URL
    Attach {
        url: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 22)]
        port: u16,
        #[arg(long)]
        user: String,
        #[arg(long, conflicts_with = "key")]
        password: Option<String>,
        /// Private key file
        #[arg(long)]
        key: Option<String>,
    },
    /// Stop watching the server behind a URL
    Detach { url: String },
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("site_sentinel", level), ("sentinel_hub", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    dotenv::dotenv().ok();

    let mut config = match &args.file {
        Some(file) => read_config_file(file)
            .with_context(|| format!("failed to load configuration from {file}"))?,
        None => Config::default(),
    };
    config.apply_env();

    let store = storage::open(&config.storage.clone().unwrap_or_default())
        .await
        .context("failed to open storage")?;

    match args.command {
        Command::Run => run(&config, store).await,
        Command::Once => once(&config, store).await,
        Command::Add { url } => {
            store.add_target(&url).await?;
            println!("added {url}");
            Ok(())
        }
        Command::Remove { url } => {
            if !store.remove_target(&url).await? {
                bail!("no target with url {url}");
            }
            println!("removed {url}");
            Ok(())
        }
        Command::Toggle { url } => match store.toggle_notify(&url).await? {
            Some(enabled) => {
                println!(
                    "down alerts for {url} {}",
                    if enabled { "enabled" } else { "disabled" }
                );
                Ok(())
            }
            None => bail!("no target with url {url}"),
        },
        Command::Status => status(store.as_ref()).await,
        Command::Attach {
            url,
            host,
            port,
            user,
            password,
            key,
        } => {
            let credentials = Credentials {
                username: user,
                password,
                key_path: key,
            };
            if !credentials.is_usable() {
                bail!("either --password or --key is required");
            }

            let mut profile = ServerProfile::new(host, credentials);
            profile.port = port;
            store.attach_server(&url, profile).await?;
            println!("attached server to {url}");
            Ok(())
        }
        Command::Detach { url } => {
            if !store.detach_server(&url).await? {
                bail!("no server attached to {url}");
            }
            println!("detached server from {url}");
            Ok(())
        }
    }
}

async fn run(config: &Config, store: std::sync::Arc<dyn TargetStore>) -> anyhow::Result<()> {
    let cycle = MonitorCycle::from_config(config, store)?;
    let mut scheduler = Scheduler::new(cycle, config.monitor.interval());
    scheduler.start()?;
    info!(
        "checking every {}s, alert cooldown {}s",
        config.monitor.interval_secs, config.monitor.cooldown_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    debug!("received Ctrl-C, stopping");

    scheduler.stop().await;
    let stats = scheduler.stats();
    info!(
        "{} cycles completed, {} failed",
        stats.completed, stats.failed
    );
    Ok(())
}

async fn once(config: &Config, store: std::sync::Arc<dyn TargetStore>) -> anyhow::Result<()> {
    let cycle = MonitorCycle::from_config(config, store)?;
    let report = cycle.run(&Cancellation::never()).await?;

    println!(
        "{} targets: {} up, {} down, {} servers measured, {} alerts sent, {} undelivered",
        report.targets,
        report.up,
        report.down,
        report.collected,
        report.alerts_sent,
        report.alerts_failed
    );
    Ok(())
}

async fn status(store: &dyn TargetStore) -> anyhow::Result<()> {
    let targets = store.list_targets().await?;
    if targets.is_empty() {
        println!("no targets");
        return Ok(());
    }

    let now = Utc::now();
    for target in targets {
        print_target(&target, now);
    }
    Ok(())
}

fn print_target(target: &Target, now: chrono::DateTime<Utc>) {
    println!(
        "{} {} (checked {}s ago, down alerts {})",
        if target.is_up { "UP  " } else { "DOWN" },
        target.url,
        (now - target.last_checked).num_seconds(),
        if target.notify_on_down { "on" } else { "off" }
    );

    if let Some(server) = &target.server {
        let reading = |value: Option<f64>| match value {
            Some(value) => format!("{value:.1}%"),
            None => "n/a".to_string(),
        };
        println!(
            "     {}:{} cpu {} ram {} disk {}",
            server.host,
            server.port,
            reading(server.cpu_usage),
            reading(server.ram_usage),
            reading(server.disk_usage)
        );
    }
}
