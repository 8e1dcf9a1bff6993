use anyhow::Result;
use clap::Parser;
use telemetry_server::app::App;
use telemetry_server::config::ServerArgs;
use telemetry_server::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    logging::init();

    tracing::info!("starting telemetry server");

    let app = App::bootstrap(args).await?;
    app.run().await
}
