use clap::Parser;
use camp::cli::{run_add, run_list, run_serve, run_show, Cli, Commands};
use camp::config::AppConfig;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Serve(args) => {
            if let Some(port) = args.port {
                config.http_port = port;
            }
            run_serve(&config)?;
        }
        Commands::Add(args) => {
            let db = config.open_database()?;
            run_add(&db, args)?;
        }
        Commands::Show(args) => {
            let db = config.open_database()?;
            run_show(&db, args.id)?;
        }
        Commands::List(args) => {
            let db = config.open_database()?;
            run_list(&db, &args)?;
        }
    }

    Ok(())
}
