// reqwest implementation of `FplSource`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::wire::{RawBootstrap, RawElementSummary, RawEntry, RawEntryHistory, RawFixture, RawPicks};
use super::{FplSource, UpstreamError};
use crate::config::UpstreamConfig;

pub struct HttpFplSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpFplSource {
    /// Build a client with the configured per-request timeout and user agent.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Transport {
                url: config.base_url.clone(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: normalize_base(&config.base_url),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let url = self.url(path);
        debug!(%url, "GET");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                url: url.clone(),
                message: describe_transport(&e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound { url });
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| UpstreamError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

/// Ensure exactly one trailing slash so paths can be appended.
fn normalize_base(base: &str) -> String {
    format!("{}/", base.trim_end_matches('/'))
}

fn describe_transport(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

#[async_trait]
impl FplSource for HttpFplSource {
    async fn bootstrap(&self) -> Result<RawBootstrap, UpstreamError> {
        self.get_json("bootstrap-static/").await
    }

    async fn fixtures(&self, gameweek: u32) -> Result<Vec<RawFixture>, UpstreamError> {
        self.get_json(&format!("fixtures/?event={gameweek}")).await
    }

    async fn entry(&self, manager_id: u64) -> Result<RawEntry, UpstreamError> {
        self.get_json(&format!("entry/{manager_id}/")).await
    }

    async fn entry_history(&self, manager_id: u64) -> Result<RawEntryHistory, UpstreamError> {
        self.get_json(&format!("entry/{manager_id}/history/")).await
    }

    async fn entry_picks(
        &self,
        manager_id: u64,
        gameweek: u32,
    ) -> Result<RawPicks, UpstreamError> {
        self.get_json(&format!("entry/{manager_id}/event/{gameweek}/picks/"))
            .await
    }

    async fn element_summary(&self, player_id: u32) -> Result<RawElementSummary, UpstreamError> {
        self.get_json(&format!("element-summary/{player_id}/")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(base_url: String) -> UpstreamConfig {
        UpstreamConfig {
            base_url,
            timeout_secs: 2,
            user_agent: "squadcast-test".into(),
            fixture_window: 5,
            season_gameweeks: 38,
        }
    }

    /// Serve one canned HTTP response and return the request line it saw.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}/api"), handle)
    }

    /// Accept one connection and never answer it.
    async fn serve_silence() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        (format!("http://{addr}/api"), handle)
    }

    #[test]
    fn base_url_gets_single_trailing_slash() {
        assert_eq!(normalize_base("https://x/api"), "https://x/api/");
        assert_eq!(normalize_base("https://x/api//"), "https://x/api/");
    }

    #[tokio::test]
    async fn fixtures_request_hits_event_query() {
        let (base, server) = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: application/json\r\n",
            "Connection: close\r\n",
            "\r\n",
            "[{\"id\":1,\"event\":7,\"team_h\":1,\"team_a\":2}]",
        ))
        .await;
        let source = HttpFplSource::new(&config_for(base)).unwrap();

        let fixtures = source.fixtures(7).await.expect("should decode");
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].event, Some(7));

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /api/fixtures/?event=7 "), "{request_line}");
    }

    #[tokio::test]
    async fn not_found_is_distinguished() {
        let (base, server) = serve_once(concat!(
            "HTTP/1.1 404 Not Found\r\n",
            "Content-Length: 0\r\n",
            "Connection: close\r\n",
            "\r\n",
        ))
        .await;
        let source = HttpFplSource::new(&config_for(base)).unwrap();

        let err = source.entry(1).await.unwrap_err();
        assert!(matches!(err, UpstreamError::NotFound { .. }), "{err}");
        let _ = server.await;
    }

    #[tokio::test]
    async fn server_error_is_status() {
        let (base, server) = serve_once(concat!(
            "HTTP/1.1 503 Service Unavailable\r\n",
            "Content-Length: 0\r\n",
            "Connection: close\r\n",
            "\r\n",
        ))
        .await;
        let source = HttpFplSource::new(&config_for(base)).unwrap();

        match source.bootstrap().await.unwrap_err() {
            UpstreamError::Status { status, .. } => assert_eq!(status, 503),
            other => panic!("expected Status, got: {other}"),
        }
        let _ = server.await;
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpFplSource::new(&config_for(format!("http://{addr}/api"))).unwrap();
        let err = source.bootstrap().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport { .. }), "{err}");
    }

    #[tokio::test]
    async fn silent_server_times_out_as_transport_error() {
        let (base, server) = serve_silence().await;
        let mut config = config_for(base);
        config.timeout_secs = 1;
        let source = HttpFplSource::new(&config).unwrap();

        match source.bootstrap().await.unwrap_err() {
            UpstreamError::Transport { message, .. } => assert_eq!(message, "timed out"),
            other => panic!("expected Transport, got: {other}"),
        }
        server.abort();
    }
}
