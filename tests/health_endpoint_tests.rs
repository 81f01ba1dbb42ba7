// tests/health_endpoint_tests.rs
use healthgate::config::parse_config;
use healthgate::server::{serve_listener, HealthHandler, UNCACHEABLE};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Answers every `stats` command with a live pid, for any number of connections.
async fn live_memcached() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim_end() == "stats" {
                        let reply = "STAT pid 777\r\nSTAT uptime 3600\r\nEND\r\n";
                        if writer.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    addr
}

/// An address nothing listens on.
async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn search_cluster(status: &str) -> (mockito::ServerGuard, Vec<mockito::Mock>) {
    let mut server = mockito::Server::new_async().await;
    let mocks = vec![
        server.mock("GET", "/").with_status(200).create_async().await,
        server
            .mock("GET", "/_cluster/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"cluster_name":"it","status":"{status}"}}"#))
            .create_async()
            .await,
    ];
    (server, mocks)
}

struct Running {
    base: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn start(config_yaml: &str) -> Running {
    let config = Arc::new(parse_config(config_yaml, true).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    tokio::spawn(serve_listener(listener, HealthHandler::new(config), async move {
        let _ = stopped.await;
    }));

    Running {
        base: format!("http://{addr}"),
        stop: Some(stop),
    }
}

fn config(cache_servers: &[String], search_url: Option<&str>) -> String {
    let mut yaml = String::from(
        "database:\n  connections:\n    default:\n      url: \"mysql://db:3306/app\"\nprobes:\n  timeout_secs: 1\n",
    );
    if !cache_servers.is_empty() {
        yaml.push_str("cache:\n  servers:\n");
        for server in cache_servers {
            yaml.push_str(&format!("    \"{server}\": default\n"));
        }
    }
    if let Some(url) = search_url {
        yaml.push_str(&format!("search:\n  clusters:\n    - id: it\n      url: \"{url}\"\n"));
    }
    yaml
}

async fn get(url: &str) -> (u16, reqwest::header::HeaderMap, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.json::<Value>().await.unwrap();
    (status, headers, body)
}

fn assert_uncacheable(headers: &reqwest::header::HeaderMap) {
    assert_eq!(headers["cache-control"], UNCACHEABLE);
    assert!(!headers["cache-control"].to_str().unwrap().contains("public"));
}

#[tokio::test]
async fn all_dependencies_healthy() {
    let cache = live_memcached().await;
    let (search, _mocks) = search_cluster("green").await;
    let app = start(&config(&[cache.to_string()], Some(&search.url()))).await;

    let (status, headers, body) = get(&format!("{}/healthcheck", app.base)).await;

    assert_eq!(status, 200);
    assert_uncacheable(&headers);
    assert_eq!(body["status"], 1);
    assert_eq!(
        body["details"],
        json!({ "db": 1, "memcached": 1, "elasticsearch": 1 })
    );
}

#[tokio::test]
async fn unreachable_cache_node_fails_readiness() {
    let live = live_memcached().await;
    let dead = dead_address().await;
    let (search, _mocks) = search_cluster("green").await;
    let app = start(&config(
        &[live.to_string(), dead.to_string()],
        Some(&search.url()),
    ))
    .await;

    let (status, headers, body) = get(&format!("{}/healthcheck", app.base)).await;

    assert_eq!(status, 500);
    assert_uncacheable(&headers);
    assert_eq!(body["status"], 0);
    assert_eq!(
        body["details"],
        json!({ "db": 1, "memcached": 0, "elasticsearch": 1 })
    );
}

#[tokio::test]
async fn malformed_cache_entry_fails_readiness() {
    let app = start(&config(&["badentry".to_string()], None)).await;

    let (status, _, body) = get(&format!("{}/healthcheck", app.base)).await;

    assert_eq!(status, 500);
    assert_eq!(body["details"], json!({ "db": 1, "memcached": 0 }));
}

#[tokio::test]
async fn yellow_search_cluster_fails_readiness() {
    let (search, _mocks) = search_cluster("yellow").await;
    let app = start(&config(&[], Some(&search.url()))).await;

    let (status, _, body) = get(&format!("{}/healthcheck", app.base)).await;

    assert_eq!(status, 500);
    assert_eq!(body["status"], 0);
    assert_eq!(body["details"], json!({ "db": 1, "elasticsearch": 0 }));
}

#[tokio::test]
async fn liveness_is_ok_while_dependencies_are_down() {
    let dead = dead_address().await;
    let app = start(&config(&[dead.to_string()], None)).await;

    let (status, headers, body) = get(&format!("{}/status", app.base)).await;

    assert_eq!(status, 200);
    assert_uncacheable(&headers);
    assert_eq!(body["status"], 1);
    assert!(body["time"].as_i64().unwrap() > 0);
    assert!(body.get("details").is_none());
}
