// src/server/builder.rs
use crate::server::listener::bind_tcp;
use anyhow::Result;
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Service;

/// Builder pattern so `main.rs` can inject the health handler.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Bind, then accept connections until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .ok_or_else(|| anyhow::anyhow!("handler must be set via with_handler()"))?;
        let listener = bind_tcp(self.addr).await?;
        serve_listener(listener, handler, shutdown).await
    }
}

/// Pause after a failed `accept()` so persistent errors (EMFILE) do not spin.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop over an already bound listener. One task per connection.
///
/// Stops accepting once `shutdown` resolves; connections already accepted
/// keep running on their own tasks.
pub async fn serve_listener<H, F>(listener: TcpListener, handler: H, shutdown: F) -> Result<()>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                tracing::info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(%err, "accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                let svc = handler.clone();

                tokio::spawn(async move {
                    let http = Http::new();
                    if let Err(err) = http.serve_connection(stream, svc).await {
                        tracing::warn!(%peer, %err, "connection error");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::server::HealthHandler;
    use std::sync::Arc;

    #[test]
    fn accept_backoff_is_short_but_nonzero() {
        assert!(ACCEPT_BACKOFF > Duration::ZERO);
        assert!(ACCEPT_BACKOFF <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn serve_listener_returns_on_shutdown() {
        let config = Arc::new(parse_config("database: {}\n", true).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let served = tokio::time::timeout(
            Duration::from_secs(2),
            serve_listener(listener, HealthHandler::new(config), async {}),
        )
        .await;

        assert!(matches!(served, Ok(Ok(()))));
    }
}
