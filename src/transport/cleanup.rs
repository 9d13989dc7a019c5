//! DELETE of the chunks stored for a broadcast

use super::{BroadcastClient, TransportError};
use crate::config::SessionParams;
use reqwest::{Method, StatusCode};

/// Server answer to a cleanup, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub status: StatusCode,
    pub body: String,
}

impl BroadcastClient {
    /// Issue one DELETE and drain the response body.
    ///
    /// A non-2xx answer is logged and returned, not treated as an error;
    /// only transport failures are.
    pub async fn cleanup(&self, params: &SessionParams) -> Result<CleanupOutcome, TransportError> {
        let response = self.request(Method::DELETE, params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            tracing::info!("Cleanup of {}: {} {}", params.broadcast_id(), status, body);
        } else {
            tracing::warn!("Cleanup of {}: {} {}", params.broadcast_id(), status, body);
        }

        Ok(CleanupOutcome { status, body })
    }
}
