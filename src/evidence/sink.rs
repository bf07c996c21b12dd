// src/evidence/sink.rs
//
// Fire-and-forget delivery of finalized evidence records.
//
// The frame loop only enqueues (try_send, never blocks). A tokio task owns
// the HTTP client and posts records one by one; whatever happens there is
// logged and counted, and never reaches back into the engine.

use super::episode::EvidenceRecord;
use crate::error::SinkError;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::SinkConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub trait EvidenceNotifier: Send {
    /// Hand a record off for delivery. Must not block.
    fn notify(&self, record: &EvidenceRecord) -> Result<(), SinkError>;
}

pub struct HttpEvidenceSink {
    tx: mpsc::Sender<EvidenceRecord>,
}

/// Handle on the background poster, used to flush at shutdown.
pub struct SinkWorker {
    handle: JoinHandle<()>,
    grace: Duration,
}

impl HttpEvidenceSink {
    pub fn spawn(
        config: &SinkConfig,
        metrics: PipelineMetrics,
        runtime: &tokio::runtime::Handle,
    ) -> Result<(Self, SinkWorker)> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = runtime.spawn(run_worker(client, config.url.clone(), rx, metrics));

        info!(
            "📡 Evidence sink: {} (timeout {}s, queue {})",
            config.url, config.timeout_secs, config.queue_capacity
        );

        Ok((
            Self { tx },
            SinkWorker {
                handle,
                grace: Duration::from_secs(config.shutdown_grace_secs),
            },
        ))
    }
}

impl EvidenceNotifier for HttpEvidenceSink {
    fn notify(&self, record: &EvidenceRecord) -> Result<(), SinkError> {
        self.tx.try_send(record.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(r) => SinkError::QueueFull(r.event_id),
            mpsc::error::TrySendError::Closed(r) => SinkError::Closed(r.event_id),
        })
    }
}

impl SinkWorker {
    /// Wait for queued records to go out. Call after every sender is dropped.
    pub async fn shutdown(self) {
        let SinkWorker { handle, grace } = self;
        let abort = handle.abort_handle();
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => debug!("Evidence sink worker finished"),
            Ok(Err(e)) => error!("Evidence sink worker failed: {}", e),
            Err(_) => {
                warn!(
                    "Evidence sink still busy after {:.0}s, abandoning pending records",
                    grace.as_secs_f64()
                );
                abort.abort();
            }
        }
    }
}

async fn run_worker(
    client: reqwest::Client,
    url: String,
    mut rx: mpsc::Receiver<EvidenceRecord>,
    metrics: PipelineMetrics,
) {
    while let Some(record) = rx.recv().await {
        match post_record(&client, &url, &record).await {
            Ok(()) => {
                metrics.inc(&metrics.sink_sent);
                info!("📡 Synced {} with evidence sink", record.event_id);
            }
            Err(e) => {
                metrics.inc(&metrics.sink_failed);
                warn!("📡 Failed to sync {}: {}", record.event_id, e);
            }
        }
    }
}

pub async fn post_record(
    client: &reqwest::Client,
    url: &str,
    record: &EvidenceRecord,
) -> Result<(), SinkError> {
    let response = client.post(url).json(record).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Err(SinkError::Rejected { status, body });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::episode::VehicleData;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn record() -> EvidenceRecord {
        EvidenceRecord {
            event_id: "e-1".to_string(),
            timestamp: 1_700_000_000.5,
            track_id: 42,
            vehicle_data: VehicleData {
                bbox: [1.0, 2.0, 3.0, 4.0],
                vector: [0.0, -40.0],
                centroid: [2.0, 3.0],
            },
            evidence_path: "/tmp/violation_e-1.mp4".to_string(),
            camera_id: "CAM-01".to_string(),
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// One-shot HTTP server answering with `status_line`; yields the request.
    async fn serve_once(status_line: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/violation", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (url, server)
    }

    #[tokio::test]
    async fn test_post_record_sends_json() {
        let (url, server) = serve_once("200 OK").await;
        let client = reqwest::Client::new();
        post_record(&client, &url, &record()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /violation"));
        assert!(request.contains("\"event_id\":\"e-1\""));
        assert!(request.contains("\"track_id\":42"));
        assert!(request.contains("\"box\":[1.0,2.0,3.0,4.0]"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected() {
        let (url, server) = serve_once("500 Internal Server Error").await;
        let client = reqwest::Client::new();
        let err = post_record(&client, &url, &record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected { status, .. } if status.as_u16() == 500));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/violation", listener.local_addr().unwrap());
        drop(listener);
        let client = reqwest::Client::new();
        let err = post_record(&client, &url, &record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }

    #[test]
    fn test_notify_never_blocks_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = HttpEvidenceSink { tx };
        sink.notify(&record()).unwrap();
        assert!(matches!(sink.notify(&record()), Err(SinkError::QueueFull(_))));
        assert_eq!(rx.try_recv().unwrap().event_id, "e-1");
        drop(rx);
        assert!(matches!(sink.notify(&record()), Err(SinkError::Closed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_delivers_then_shuts_down() {
        let (url, server) = serve_once("200 OK").await;
        let metrics = PipelineMetrics::new();
        let config = SinkConfig {
            url,
            ..Default::default()
        };
        let (sink, worker) =
            HttpEvidenceSink::spawn(&config, metrics.clone(), &tokio::runtime::Handle::current())
                .unwrap();

        sink.notify(&record()).unwrap();
        drop(sink);
        worker.shutdown().await;

        assert_eq!(metrics.summary().sink_sent, 1);
        assert!(server.await.unwrap().contains("CAM-01"));
    }
}
