use anyhow::Result;
use clap::Parser;
use telemetry_agent::config::AgentArgs;
use telemetry_agent::logging;
use telemetry_agent::runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AgentArgs::parse();
    logging::init();

    tracing::info!("starting telemetry agent");

    let agent = Agent::bootstrap(args)?;
    agent.run().await
}
