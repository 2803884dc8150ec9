use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use callrelay::telephony::AriClient;
use callrelay::{Config, Daemon};

/// Callrelay - Telephony audio relay for realtime speech endpoints
#[derive(Parser)]
#[command(name = "callrelay", version, about)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "CALLRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Status API port (overrides config)
    #[arg(long)]
    api_port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Verify configuration, resample program and telephony reachability
    Check,
    /// Remove stale streaming objects and exit
    Purge,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,callrelay=info",
        1 => "info,callrelay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_from(cli.config.as_deref())?;
    if let Some(port) = cli.api_port {
        config.api_server.port = port;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Check => cmd_check(config).await,
            Command::Purge => cmd_purge(config),
        };
    }

    tracing::info!(
        ari = %config.ari.url,
        listen = %config.media.listen,
        api_port = config.api_server.port,
        "starting call relay"
    );

    Daemon::new(config).run().await?;
    Ok(())
}

async fn cmd_check(config: Config) -> anyhow::Result<()> {
    println!("ARI:          {} (app {})", config.ari.url, config.ari.app);
    println!("Remote:       {}", config.remote.url);
    println!("Listener:     {}", config.media.listen);
    if let Some(host) = config.media.external_host {
        println!("Media host:   {host}");
    }
    println!("Playback dir: {}", config.playback.dir.display());

    let client = AriClient::new(&config.ari);
    let daemon = Daemon::new(config);

    match daemon.find_resampler() {
        Some(path) => println!("Resampler:    {}", path.display()),
        None => anyhow::bail!("resample program not found on PATH"),
    }

    let info = client.info().await?;
    let version = info
        .pointer("/system/version")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");
    println!("Asterisk:     reachable (version {version})");

    Ok(())
}

fn cmd_purge(config: Config) -> anyhow::Result<()> {
    let dir = config.playback.dir.clone();
    let removed = Daemon::new(config).prepare_playback_dir()?;
    println!("Removed {removed} stale streaming object(s) from {}", dir.display());
    Ok(())
}
