//! Timeout-bounded delivery of a single envelope to a single client.

use crate::envelope::Envelope;
use crate::observability::{events, fields};
use crate::transport::{Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "dispatcher";

/// Wraps the transport seam with the configured per-attempt timeout. A send
/// that neither succeeds nor fails within the window counts as a failure.
pub(crate) struct DeliveryDispatcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl DeliveryDispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub(crate) async fn deliver(
        &self,
        client_id: &str,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        debug!(
            event = events::DELIVER_ATTEMPT,
            component = COMPONENT,
            client_id,
            envelope_id = %envelope.id,
            kind = fields::format_envelope_kind(envelope),
            route_id = %fields::format_route(envelope),
            "attempting delivery"
        );
        let result = tokio::time::timeout(self.timeout, self.transport.send(client_id, envelope))
            .await
            .unwrap_or(Err(TransportError::Timeout));
        match &result {
            Ok(()) => {
                debug!(
                    event = events::DELIVER_OK,
                    component = COMPONENT,
                    client_id,
                    envelope_id = %envelope.id,
                    "delivered"
                );
            }
            Err(err) => {
                warn!(
                    event = events::DELIVER_FAILED,
                    component = COMPONENT,
                    client_id,
                    envelope_id = %envelope.id,
                    err = %err,
                    "delivery failed"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::DeliveryDispatcher;
    use crate::envelope::{ClientReport, Envelope, ReportKind};
    use crate::transport::{Transport, TransportError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _client_id: &str, _envelope: &Envelope) -> Result<(), TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(&self, _client_id: &str, _envelope: &Envelope) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn envelope() -> Envelope {
        Envelope::client_report(ClientReport {
            reporter_id: "svc".into(),
            vehicle_id: None,
            route_id: None,
            kind: ReportKind::Feedback,
            payload: HashMap::new(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn hung_sends_become_timeouts() {
        let dispatcher =
            DeliveryDispatcher::new(Arc::new(SlowTransport), Duration::from_millis(50));
        let result = dispatcher.deliver("c1", &envelope()).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn successful_sends_pass_through() {
        let dispatcher = DeliveryDispatcher::new(Arc::new(OkTransport), Duration::from_millis(50));
        assert!(dispatcher.deliver("c1", &envelope()).await.is_ok());
    }
}
