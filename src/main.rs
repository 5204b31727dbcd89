use anyhow::Result;
use clap::Parser;
use earscope::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    earscope::run(&cli, &mut stdout.lock())
}
