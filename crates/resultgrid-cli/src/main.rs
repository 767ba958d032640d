use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod update;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = args::Args::parse();
    if let Err(err) = update::run(args).await {
        tracing::error!("{err}");
        std::process::exit(err.exit_code());
    }
}
