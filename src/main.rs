use amqp_topic_bridge::{
    Config, HealthState, JsonLinesSink, LogFormat, RecordSink, init_logging, run_with_ctrl_c,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    init_logging(LogFormat::from_env());

    let config = Config::from_env().context("Failed to load configuration")?;
    let health_state = Arc::new(RwLock::new(HealthState::default()));
    let sink: Arc<dyn RecordSink> = Arc::new(JsonLinesSink::stdout());

    run_with_ctrl_c(config, health_state, sink).await
}
