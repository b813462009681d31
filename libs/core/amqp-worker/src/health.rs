//! Broker connectivity probe for orchestration health checks.

use crate::broker::{BrokerConnector, BrokerSession};
use std::time::Duration;
use tracing::{error, info, warn};

/// Open and close one short-lived session.
///
/// Connection failures are retried up to `attempts` times, `delay` apart.
/// Errors no reconnect can fix (bad URL) fail at once.
pub async fn check_broker_connection<C: BrokerConnector>(
    connector: &C,
    attempts: u32,
    delay: Duration,
) -> bool {
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match connector.connect().await {
            Ok(mut session) => {
                if let Err(e) = session.close().await {
                    warn!(error = %e, "Health check session did not close cleanly");
                }
                info!(attempt, "Broker connection healthy");
                return true;
            }
            Err(e) if !e.is_connection_error() => {
                error!(error = %e, "Broker health check misconfigured");
                return false;
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Broker health check attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    error!(attempts, "Broker unreachable");
    false
}
