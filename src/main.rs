mod app;
mod cli;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    jobrelay::observability::init_tracing();

    let cli = Cli::parse();
    app::run(cli).await?;

    Ok(())
}
