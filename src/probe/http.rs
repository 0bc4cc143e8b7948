//! HTTP probe implementation.

use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use std::time::{Duration, Instant};

use super::ProbeError;

const USER_AGENT: &str = concat!("uptime-monitor/", env!("CARGO_PKG_VERSION"));

/// What a single probe observed.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub started_at: DateTime<Utc>,
    pub status: u16,
    pub elapsed_ms: u64,
    /// Full response body, captured only for JSON responses.
    pub details: Option<String>,
}

/// Build the HTTP client shared by all probes of one site.
pub fn build_probe_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .redirect(Policy::limited(10))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

/// Run an HTTP GET probe against `url`.
///
/// Latency is measured until the response headers arrive.
pub async fn run_http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<ProbeResponse, ProbeError> {
    let started_at = Utc::now();
    let start = Instant::now();

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    let details = if is_json(response.headers()) {
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Body(e.to_string())
            }
        })?;
        Some(body)
    } else {
        None
    };

    Ok(ProbeResponse {
        started_at,
        status,
        elapsed_ms,
        details,
    })
}

/// True if the content type essence is `application/json`.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Application/JSON"));
        assert!(is_json(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(is_json(&headers));
    }

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let client = build_probe_client(Duration::from_millis(100)).unwrap();
        let result = run_http_probe(&client, "http://256.256.256.256", Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_probe_captures_json_body() {
        let router = Router::new()
            .route("/json", get(|| async { Json(serde_json::json!({"status": "up"})) }))
            .route("/html", get(|| async { "<html></html>" }))
            .route("/down", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }));
        let base = serve(router).await;
        let client = build_probe_client(Duration::from_secs(5)).unwrap();

        let json = run_http_probe(&client, &format!("{}/json", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(json.status, 200);
        assert_eq!(json.details.as_deref(), Some(r#"{"status":"up"}"#));

        let html = run_http_probe(&client, &format!("{}/html", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(html.status, 200);
        assert!(html.details.is_none());

        let down = run_http_probe(&client, &format!("{}/down", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(down.status, 503);
    }

    #[tokio::test]
    async fn test_http_probe_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = serve(router).await;
        let timeout = Duration::from_millis(200);
        let client = build_probe_client(timeout).unwrap();

        let result = run_http_probe(&client, &format!("{}/slow", base), timeout).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }
}
