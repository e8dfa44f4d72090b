//! Bridges an AMQP queue to a partitioned log: every delivery becomes a typed
//! record with a key, a value, a templated destination topic and a source
//! position made of the routing key and delivery tag.
//!
//! The conversion itself ([`SourceRecordBuilder`]) is synchronous, does no
//! I/O, and can be driven by any host. [`MessageBridge`] is the host shipped
//! with this crate: it consumes from RabbitMQ with lapin and writes records to
//! a [`RecordSink`].

pub mod bridge;
pub mod conf;
pub mod delivery;
pub mod error;
pub mod headers;
pub mod health;
pub mod logging;
pub mod message;
pub mod record;
pub mod schema;
pub mod sink;
pub mod topic;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

pub use crate::bridge::MessageBridge;
pub use crate::conf::{Config, FailurePolicy};
pub use crate::delivery::{Envelope, PropertyBag};
pub use crate::error::{ConvertError, TemplateError};
pub use crate::headers::HeaderValue;
pub use crate::health::{HealthState, HealthStatus, SharedHealthState, run_health_server};
pub use crate::logging::{LogFormat, init_logging};
pub use crate::message::{Message, MessageKey};
pub use crate::record::{
    Clock, FixedClock, RecordValue, SourceRecord, SourceRecordBuilder, SystemClock, ValueFormat,
};
pub use crate::sink::{JsonLinesSink, RecordSink};
pub use crate::topic::TopicTemplate;

/// Run the bridge with automatic reconnection and health status updates.
///
/// Returns only when a delivery fails under [`FailurePolicy::Halt`].
///
/// # Errors
/// Returns the conversion error that halted the bridge.
pub async fn run_with_recovery(
    config: Config,
    health_state: SharedHealthState,
    sink: Arc<dyn RecordSink>,
) -> Result<()> {
    const RECONNECT_DELAY: Duration = Duration::from_secs(5);

    loop {
        info!(event = "bridge_creating", "Creating message bridge");

        let bridge_result =
            MessageBridge::new(config.clone(), health_state.clone(), sink.clone()).await;

        match bridge_result {
            Ok(bridge) => {
                info!(
                    event = "bridge_created",
                    status = "success",
                    "Bridge created successfully, starting message processing"
                );

                match bridge.run().await {
                    Ok(()) => {
                        warn!(
                            event = "bridge_stopped",
                            reason = "normal",
                            "Bridge stopped normally (unexpected)"
                        );
                    }
                    Err(e) if is_halt(config.on_conversion_error, &e) => {
                        error!(
                            event = "bridge_halted",
                            error = %format!("{e:#}"),
                            "Halting on conversion failure"
                        );
                        return Err(e);
                    }
                    Err(e) => {
                        error!(
                            event = "bridge_error",
                            error = %format!("{e:#}"),
                            "Bridge encountered an error"
                        );
                    }
                }

                info!(
                    event = "bridge_reconnecting",
                    delay_secs = RECONNECT_DELAY.as_secs(),
                    "Connection lost or error occurred, will attempt to reconnect"
                );
            }
            Err(e) => {
                error!(
                    event = "bridge_creation_failed",
                    error = %format!("{e:#}"),
                    retry_delay_secs = RECONNECT_DELAY.as_secs(),
                    "Failed to create bridge"
                );

                // Mark as unhealthy if we can't create bridge
                health_state.write().await.set_status(HealthStatus::Unhealthy);
            }
        }

        time::sleep(RECONNECT_DELAY).await;
        info!(event = "reconnect_attempt", "Attempting to reconnect");
    }
}

/// A conversion error reaching the recovery loop means the halt policy fired;
/// reconnecting would only redeliver the same message.
fn is_halt(policy: FailurePolicy, error: &anyhow::Error) -> bool {
    policy == FailurePolicy::Halt
        && error.downcast_ref::<ConvertError>().is_some()
}

/// Run the bridge and a health server until the provided `shutdown` future completes.
///
/// # Errors
/// Returns an error if the health server fails to bind or serve requests, or if the
/// bridge halts on a conversion failure.
pub async fn run_bridge_until<S>(
    config: Config,
    health_state: SharedHealthState,
    shutdown: S,
    sink: Arc<dyn RecordSink>,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    info!(
        event = "application_starting",
        "Starting AMQP topic bridge with auto-recovery and health checks"
    );

    info!(
        event = "config_loaded",
        source_queue = %config.source_queue,
        consumer_tag = %config.consumer_tag,
        prefetch_count = config.prefetch_count,
        topic_template = %config.topic_template,
        value_format = %config.value_format,
        on_conversion_error = %config.on_conversion_error,
        health_port = config.health_port,
        "Configuration loaded"
    );

    let health_server = run_health_server(config.health_port, health_state.clone());
    let bridge = run_with_recovery(config, health_state, sink);

    tokio::pin!(health_server);
    tokio::pin!(bridge);
    tokio::pin!(shutdown);

    tokio::select! {
        result = &mut health_server => {
            error!(
                event = "health_server_failed",
                error = ?result,
                "Health server failed"
            );
            result.context("Health server failed")?;
        }
        result = &mut bridge => {
            error!(
                event = "bridge_failed",
                error = ?result,
                "Bridge failed"
            );
            result.context("Bridge failed")?;
        }
        () = &mut shutdown => {
            info!(
                event = "shutdown_signal",
                "Received shutdown signal, exiting gracefully"
            );
        }
    }

    info!(
        event = "application_stopped",
        "Application shutdown complete"
    );

    Ok(())
}

/// Convenience runner that waits for Ctrl-C and then shuts down gracefully.
///
/// # Errors
/// Propagates any errors from `run_bridge_until`.
pub async fn run_with_ctrl_c(
    config: Config,
    health_state: SharedHealthState,
    sink: Arc<dyn RecordSink>,
) -> Result<()> {
    let shutdown = async {
        // Convert Result<(), std::io::Error> into () for our runner
        let _ = tokio::signal::ctrl_c().await;
    };
    run_bridge_until(config, health_state, shutdown, sink).await
}
