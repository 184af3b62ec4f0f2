use ampscout::cli::{Cli, Commands};
use ampscout::output;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags.
    let default_level = if cli.verbose {
        "ampscout=debug"
    } else if cli.quiet {
        "ampscout=warn"
    } else {
        "ampscout=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;
    let quiet = cli.quiet;

    match &cli.command {
        Commands::Discover(cmd) => cmd.execute(cli.settings()?, verbose, quiet).await?,
        Commands::Measure(cmd) => cmd.execute(cli.settings()?, verbose, quiet).await?,
        Commands::History(cmd) => cmd.execute(quiet)?,
        Commands::Export(cmd) => cmd.execute(quiet)?,
    }

    Ok(())
}
