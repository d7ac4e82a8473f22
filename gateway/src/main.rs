use clap::Parser;
use gateway::config::Config;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Store-and-forward relay for sensor payloads")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Suppress all but errors
    #[arg(short, long)]
    quiet: bool,

    /// Print all information available
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Redirect all output to a file
    #[arg(short = 'f', long)]
    log_file: Option<PathBuf>,
}

fn init_logging(cli: &Cli) -> std::io::Result<()> {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("could not initialize logging: {e}");
        process::exit(1);
    }

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load configuration");
            process::exit(1);
        }
    };

    if let Err(e) = gateway::run(config).await {
        tracing::error!(error = %e, "gateway exited with error");
        process::exit(1);
    }
}
