use clap::Parser;

use pixfold::app::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pixfold=info".parse()?),
        )
        .init();

    app::run(Cli::parse()).await
}
