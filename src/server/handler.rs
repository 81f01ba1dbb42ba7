// src/server/handler.rs
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::health::{liveness, HealthAggregator, HealthReport};

/// Directives that keep every health response out of private and shared caches.
pub const UNCACHEABLE: &str = "max-age=0, must-revalidate, no-store, private, s-maxage=0";

/// Serves the readiness and liveness endpoints.
#[derive(Clone)]
pub struct HealthHandler {
    config: Arc<Config>,
}

impl HealthHandler {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path();
        let server = &self.config.server;

        let readiness = path == server.readiness_path;
        if !readiness && path != server.liveness_path {
            return uncacheable(plain(StatusCode::NOT_FOUND, "Not Found"));
        }

        let head = match *req.method() {
            Method::GET => false,
            Method::HEAD => true,
            _ => {
                let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
                return uncacheable(response);
            }
        };

        let (report, status) = if readiness {
            // Fresh probe clients for every request.
            HealthAggregator::from_config(&self.config).evaluate().await
        } else {
            liveness()
        };

        json_response(&report, status, head)
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        );

        Box::pin(async move { Ok(handler.handle(req).await) }.instrument(span))
    }
}

fn json_response(report: &HealthReport, status: StatusCode, head: bool) -> Response<Body> {
    let body = match report.to_json() {
        Ok(body) => body,
        Err(e) => {
            error!(%e, "failed to serialize health report");
            return uncacheable(plain(StatusCode::INTERNAL_SERVER_ERROR, r#"{"status":0}"#));
        }
    };

    let mut response = Response::new(if head { Body::empty() } else { Body::from(body) });
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    uncacheable(response)
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

fn uncacheable(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(UNCACHEABLE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tower::ServiceExt;

    fn handler(yaml: &str) -> HealthHandler {
        HealthHandler::new(Arc::new(parse_config(yaml, true).unwrap()))
    }

    const HEALTHY: &str = r#"
database:
  connections:
    default:
      url: "mysql://db:3306/app"
"#;

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_uncacheable(response: &Response<Body>) {
        let cache_control = response.headers()[CACHE_CONTROL].to_str().unwrap();
        assert_eq!(cache_control, UNCACHEABLE);
        assert!(!cache_control.contains("public"));
        assert_eq!(response.headers()[PRAGMA], "no-cache");
    }

    #[tokio::test]
    async fn readiness_ok_when_database_configured() {
        let response = handler(HEALTHY).oneshot(get("/healthcheck")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_uncacheable(&response);

        let body = body_json(response).await;
        assert_eq!(body["status"], 1);
        assert_eq!(body["details"], serde_json::json!({ "db": 1 }));
        assert!(body["time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn readiness_fails_without_database() {
        let response = handler("database: {}\n").oneshot(get("/healthcheck")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_uncacheable(&response);

        let body = body_json(response).await;
        assert_eq!(body["status"], 0);
        assert_eq!(body["details"]["db"], 0);
    }

    #[tokio::test]
    async fn readiness_reports_malformed_database_descriptor() {
        let yaml = "database:\n  connections:\n    default:\n      url: \"not a url\"\n";
        let response = handler(yaml).oneshot(get("/healthcheck")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], 0);
        assert_eq!(body["details"], serde_json::json!({ "db": 0 }));
    }

    #[tokio::test]
    async fn readiness_fails_without_database_section() {
        let response = handler("probes:\n  timeout_secs: 1\n")
            .oneshot(get("/healthcheck"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["details"]["db"], 0);
    }

    #[tokio::test]
    async fn liveness_ignores_dependencies() {
        let response = handler("database: {}\n").oneshot(get("/status")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_uncacheable(&response);

        let body = body_json(response).await;
        assert_eq!(body["status"], 1);
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn head_has_headers_but_no_body() {
        let request = Request::head("/status").body(Body::empty()).unwrap();
        let response = handler(HEALTHY).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_uncacheable(&response);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = handler(HEALTHY).oneshot(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_uncacheable(&response);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let request = Request::post("/healthcheck").body(Body::empty()).unwrap();
        let response = handler(HEALTHY).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
        assert_uncacheable(&response);
    }
}
