// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! [`Sink`] posting value updates to an HTTP data-point endpoint.
//!
//! ```text
//! bridge thread ──try_send──► bounded queue ──► push worker ──POST──► endpoint
//! ```
//!
//! The sink never blocks the caller. The worker runs on the binary's
//! runtime and logs failed requests.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ua104_core::error::{SinkError, SinkResult};
use ua104_core::sink::{Sink, ValueUpdate};
use ua104_core::types::{IoAddress, Value};

use crate::error::{BinError, BinResult};

/// Updates buffered before the sink starts rejecting.
pub const PUSH_QUEUE_CAPACITY: usize = 1024;

/// Body of one push request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushPayload {
    /// Target information object address.
    pub ioa: IoAddress,
    /// Value as plain JSON.
    pub value: Value,
    /// IEC 104 quality bits.
    pub quality: u8,
    /// Source timestamp, RFC 3339.
    pub timestamp: String,
}

impl PushPayload {
    /// Builds the body for `update`.
    pub fn from_update(update: &ValueUpdate) -> Self {
        Self {
            ioa: update.target_address,
            value: update.value.clone(),
            quality: update.quality.bits(),
            timestamp: rfc3339(update.timestamp),
        }
    }
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Queues updates for the push worker.
#[derive(Debug, Clone)]
pub struct HttpPushSink {
    url: String,
    queue: mpsc::Sender<PushPayload>,
}

impl HttpPushSink {
    /// Starts the push worker on `handle` and returns the sink feeding it.
    ///
    /// The worker ends once every clone of the sink is dropped.
    pub fn spawn(handle: &Handle, url: impl Into<String>, timeout: Duration) -> BinResult<(Self, JoinHandle<()>)> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| BinError::init(format!("failed to create HTTP client: {}", e)))?;

        let (queue, rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        let worker = handle.spawn(push_worker(client, url.clone(), rx));
        Ok((Self { url, queue }, worker))
    }

    /// Returns the endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for HttpPushSink {
    fn name(&self) -> &str {
        "http-push"
    }

    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()> {
        self.queue
            .try_send(PushPayload::from_update(update))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SinkError::delivery("push queue is full"),
                mpsc::error::TrySendError::Closed(_) => SinkError::delivery("push worker has stopped"),
            })
    }
}

async fn push_worker(client: reqwest::Client, url: String, mut rx: mpsc::Receiver<PushPayload>) {
    while let Some(payload) = rx.recv().await {
        match client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(ioa = payload.ioa, status = %response.status(), "Pushed value");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(ioa = payload.ioa, %status, body = %body, "Push endpoint returned an error");
            }
            Err(e) if e.is_timeout() => warn!(ioa = payload.ioa, url = %url, "Push request timed out"),
            Err(e) => warn!(ioa = payload.ioa, url = %url, error = %e, "Push request failed"),
        }
    }
    debug!(url = %url, "Push worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use ua104_core::quality::QualityFlags;
    use ua104_core::types::{MappingId, ServerId};

    fn update(ioa: IoAddress, value: Value) -> ValueUpdate {
        ValueUpdate {
            server_id: ServerId::new("plant"),
            mapping_id: MappingId::new(1),
            node_id: "ns=2;s=Level".to_string(),
            target_address: ioa,
            value,
            quality: QualityFlags::GOOD,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 30).unwrap(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(PushPayload::from_update(&update(208, Value::Int(10021)))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ioa": 208,
                "value": 10021,
                "quality": 0,
                "timestamp": "2024-03-15T13:45:30.000Z"
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_posts_to_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/v1/datapoint-value", listener.local_addr().unwrap());

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !(String::from_utf8_lossy(&request).contains("\"timestamp\"") && request.ends_with(b"}")) {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        let (sink, worker) = HttpPushSink::spawn(&Handle::current(), url, Duration::from_secs(5)).unwrap();
        sink.on_value_changed(&update(208, Value::Float(1.5))).unwrap();
        drop(sink);

        tokio::time::timeout(Duration::from_secs(10), worker).await.unwrap().unwrap();
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/v1/datapoint-value"));
        assert!(request.contains("\"ioa\":208"));
        assert!(request.contains("\"value\":1.5"));
    }

    #[tokio::test]
    async fn test_full_queue_is_a_delivery_error() {
        let (queue, _rx) = mpsc::channel(1);
        let sink = HttpPushSink {
            url: "http://localhost:1/".to_string(),
            queue,
        };
        sink.on_value_changed(&update(1, Value::Bool(true))).unwrap();
        assert!(matches!(
            sink.on_value_changed(&update(1, Value::Bool(false))),
            Err(SinkError::Delivery(_))
        ));
    }
}
