use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use wallet_census::{config::Config, count_wallets, source};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::read()?;

    // connection and cursor errors are fatal, before anything is fetched
    let source = source::connect(&config.source).await?;
    let count = count_wallets(source).await?;

    info!(wallets = count, "distinct wallet count");
    println!("{}", count);

    Ok(())
}

fn setup() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::from_default_env();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NEW)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
