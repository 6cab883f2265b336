//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before anything records.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally.
///
/// Renders nothing useful; used where no exporter is wanted (tests).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because the connection limit was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Sessions created total (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "sessions_created_total";
/// Live sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Inbound frames discarded as malformed (counter).
pub const FRAMES_DISCARDED_TOTAL: &str = "frames_discarded_total";
/// Inbound frames rejected by a full session queue (counter).
pub const SESSION_QUEUE_REJECTIONS_TOTAL: &str = "session_queue_rejections_total";
/// Clients dropped after a failed send (counter).
pub const CLIENT_SEND_FAILURES_TOTAL: &str = "client_send_failures_total";
