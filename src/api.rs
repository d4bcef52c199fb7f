//! Health & Status API endpoints
//!
//! Provides HTTP endpoints for monitoring and status:
//! - GET /health - Simple health check
//! - GET /metrics - Prometheus metrics
//! - GET /status - Per-direction pending counts and current roots
//! - GET /transfer/<id> - Status of one transfer by hex id

use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use crate::metrics;
use crate::relayer::{DirectionStatus, Relayer};
use crate::types::TransferId;

/// Server start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Status response
#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    directions: Vec<DirectionStatus>,
}

#[derive(Serialize)]
struct TransferResponse {
    transfer_id: String,
    status: String,
    detail: Option<String>,
}

/// Start the API server (combines metrics and status endpoints)
pub async fn start_api_server(addr: SocketAddr, relayer: Arc<Relayer>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server started");

    let _ = START_TIME.set(Instant::now());
    metrics::UP.set(1.0);

    loop {
        let (mut socket, _) = listener.accept().await?;
        let relayer = relayer.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            if socket.readable().await.is_ok() {
                let _ = socket.try_read(&mut buf);
            }

            let request = String::from_utf8_lossy(&buf);

            if request.contains("GET /metrics") {
                // Prometheus metrics
                let encoder = TextEncoder::new();
                let metric_families = prometheus::gather();
                let mut buffer = Vec::new();
                let _ = encoder.encode(&metric_families, &mut buffer);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
                    buffer.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&buffer).await;
            } else if request.contains("GET /health") {
                let response =
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            } else if request.contains("GET /status") {
                let status = build_status_response(&relayer).await;
                let body = serde_json::to_string(&status).unwrap_or_else(|_| "{}".to_string());
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            } else if let Some(id) = parse_transfer_path(&request) {
                match build_transfer_response(&relayer, &id).await {
                    Some(transfer) => {
                        let body =
                            serde_json::to_string(&transfer).unwrap_or_else(|_| "{}".to_string());
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                    }
                    None => {
                        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
                        let _ = socket.write_all(response.as_bytes()).await;
                    }
                }
            } else {
                let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
    }
}

/// Extract the transfer id from a `GET /transfer/0x...` request line.
fn parse_transfer_path(request: &str) -> Option<TransferId> {
    let line = request.lines().next()?;
    let path = line.strip_prefix("GET /transfer/")?;
    let hex_id = path.split_whitespace().next()?;
    TransferId::from_hex(hex_id)
}

async fn build_status_response(relayer: &Relayer) -> StatusResponse {
    let uptime = START_TIME
        .get()
        .map(|t| t.elapsed().as_secs())
        .unwrap_or(0);

    StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: uptime,
        directions: relayer.status_snapshot().await,
    }
}

async fn build_transfer_response(relayer: &Relayer, id: &TransferId) -> Option<TransferResponse> {
    use crate::types::TransferStatus;

    let status = relayer.get_transfer_status(id).await?;
    let detail = match &status {
        TransferStatus::Failed(reason) => Some(reason.clone()),
        _ => None,
    };
    Some(TransferResponse {
        transfer_id: id.to_hex(),
        status: status.as_str().to_string(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transfer_path() {
        let id = TransferId([0x11; 32]);
        let request = format!("GET /transfer/{} HTTP/1.1\r\nHost: x\r\n\r\n", id.to_hex());
        assert_eq!(parse_transfer_path(&request), Some(id));
    }

    #[test]
    fn test_parse_transfer_path_rejects_garbage() {
        assert!(parse_transfer_path("GET /transfer/zzz HTTP/1.1\r\n").is_none());
        assert!(parse_transfer_path("GET /status HTTP/1.1\r\n").is_none());
    }
}
