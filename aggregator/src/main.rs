use aggregator::run;
use aggregator::Config;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Weather-data aggregation node: accepts producer PUTs and client GETs
/// over a single Lamport-clocked TCP protocol.
#[derive(Parser, Debug)]
#[clap(name = "aggregator", version)]
struct Args {
    /// TCP port to listen on, either positional or via `--port`.
    #[clap(long, index = 1, default_value_t = 4567)]
    port: u16,

    /// Path of the checkpoint file.
    #[clap(long, default_value = "data.json")]
    checkpoint_path: PathBuf,

    /// Interval between checkpoint snapshots, in seconds.
    #[clap(long, default_value_t = 15)]
    checkpoint_interval_secs: u64,

    /// Raises the tracing filter; repeatable (-v, -vv).
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            port: args.port,
            checkpoint_path: args.checkpoint_path,
            checkpoint_interval: Duration::from_secs(args.checkpoint_interval_secs),
            ..Config::default()
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "aggregator=info",
        1 => "aggregator=debug",
        _ => "aggregator=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::from(args);
    run::run(config).await?;
    Ok(())
}
