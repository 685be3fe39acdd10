use clap::Parser;
use clap_handler::Handler;

mod commands;

#[derive(Parser, Clone)]
#[clap(version, about)]
struct NagareArgs {
    /// Debug output
    #[clap(long, global = true, alias = "debug")]
    verbose: bool,

    #[clap(subcommand)]
    command: commands::NagareCommand,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = NagareArgs::parse();

    let level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    args.command.run().await
}
