use std::time::Duration;

use relay_process::{CallbackStatus, StreamId};

/// Header carrying the caller-supplied callback token.
pub const TOKEN_HEADER: &str = "X-Agent-Token";

#[derive(Debug, Clone, serde::Serialize)]
pub struct CallbackEvent {
    pub stream_id: StreamId,
    pub status: CallbackStatus,
    pub details: String,
}

/// Fire-and-forget delivery of stream-state transitions to the controller.
///
/// Delivery runs on its own task with a bounded timeout and never blocks the
/// request that triggered it. Failures are logged and discarded; there is no
/// retry and no ordering guarantee.
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
}

impl CallbackNotifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn notify(
        &self,
        url: String,
        token: String,
        stream_id: StreamId,
        status: CallbackStatus,
        details: String,
    ) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let event = CallbackEvent {
                stream_id,
                status,
                details,
            };
            let sent = client
                .post(&url)
                .header(TOKEN_HEADER, token)
                .json(&event)
                .send()
                .await;
            match sent {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(stream_id = stream_id.0, ?status, %url, "callback delivered");
                }
                Ok(resp) => {
                    tracing::warn!(
                        stream_id = stream_id.0,
                        code = %resp.status(),
                        %url,
                        "callback endpoint rejected event"
                    );
                }
                Err(err) => {
                    tracing::warn!(stream_id = stream_id.0, %err, %url, "callback delivery failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape() {
        let event = CallbackEvent {
            stream_id: StreamId(42),
            status: CallbackStatus::Live,
            details: "stream started with pid 99".to_string(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "stream_id": 42,
                "status": "LIVE",
                "details": "stream started with pid 99",
            })
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_does_not_block_or_panic() {
        let notifier = CallbackNotifier::new(Duration::from_millis(200)).unwrap();
        notifier.notify(
            // Reserved port on localhost; connection is refused immediately.
            "http://127.0.0.1:1/callback".to_string(),
            "token".to_string(),
            StreamId(1),
            CallbackStatus::Error,
            "details".to_string(),
        );
        // notify returns before delivery resolves; give the task a moment so
        // its failure path runs under the test runtime.
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}
