use clap::Parser;
use paper_desk::cli::{Cli, Commands};
use paper_desk::config::Config;
use paper_desk::portfolio::{JsonFileStore, StateStore};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    paper_desk::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Simulate(args) => {
            tracing::info!("Starting paper session");
            args.execute(&config)?;
        }
        Commands::Status => match &config.snapshot.path {
            Some(path) => {
                let store = JsonFileStore::new(path);
                match store.load()? {
                    Some(snapshot) => {
                        println!("Portfolio snapshot ({})", path.display());
                        for (asset, total) in &snapshot.balances {
                            println!("  {}: {}", asset, total);
                        }
                        println!("  Positions: {}", snapshot.positions.len());
                        println!("  Peak equity: {}", snapshot.peak_equity);
                    }
                    None => println!("No snapshot at {}", path.display()),
                }
            }
            None => println!("No snapshot path configured"),
        },
        Commands::Config => {
            println!("Current configuration:");
            println!("  Balances: {:?}", config.portfolio.initial_balances);
            println!(
                "  Risk: drawdown {} / instrument cap {} / exposure cap {}",
                config.risk.max_drawdown_pct,
                config.risk.max_instrument_notional,
                config.risk.max_net_exposure
            );
            println!(
                "  Engine: max fills {}, leverage {}",
                config.engine.max_fills_per_order, config.engine.leverage
            );
            println!("  Latency: {} ms", config.latency.insert_ms);
        }
    }

    Ok(())
}
