// src/server/listener.rs
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Bind the health endpoint's TCP listener and log the resolved address.
pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Health endpoint listening on {}", listener.local_addr()?);
    Ok(listener)
}
