use clap::Parser;
use poly_notify::cli::{Cli, Commands};
use poly_notify::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::parse(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    poly_notify::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(&config).await?;
        }
        Commands::Status(args) => {
            args.execute(&config)?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Venue: {}", config.venue.clob_url);
            println!(
                "  Discovery: every {}s, full pass every {} ticks",
                config.discovery.interval_secs, config.discovery.full_rescan_every
            );
            println!("  Detection: every {}s", config.detection.interval_secs);
            for bucket in config.buckets()? {
                println!("    {:>4}  threshold {}", bucket.name, bucket.threshold);
            }
            println!(
                "  Tracking: tags={:?} keywords={:?} explicit={}",
                config.tracking.tags,
                config.tracking.keywords,
                config.tracking.markets.len()
            );
            println!("  Notify: {:?}", config.notify.mode);
            println!("  State: {}", config.state.path.display());
        }
    }

    Ok(())
}
