// Chat-completions streaming client using reqwest-eventsource.
//
// Posts one user message to an OpenAI-compatible `/chat/completions` endpoint
// with `stream: true` and parses the Server-Sent Events into `LlmEvent`
// variants forwarded over an mpsc channel. The stream ends on `data: [DONE]`,
// or with an error once no chunk arrives within the read timeout.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use squadcast_core::config::Config;

/// Sentinel data line that terminates an OpenAI-style stream.
const DONE_SENTINEL: &str = "[DONE]";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted while a completion streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    Token {
        text: String,
    },
    Complete {
        full_text: String,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Low-level streaming client for one completion endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: u32,
    read_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        temperature: Option<f64>,
        max_tokens: u32,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            temperature,
            max_tokens,
            read_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn request_body(&self, prompt: &str) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
            "stream_options": { "include_usage": true },
            "max_completion_tokens": self.max_tokens,
        });
        if let (Some(t), Some(obj)) = (self.temperature, body.as_object_mut()) {
            obj.insert("temperature".into(), Value::from(t));
        }
        body
    }

    /// Send `prompt` and stream the reply as `LlmEvent`s over `tx`.
    ///
    /// Exactly one terminal event (`Complete` or `Error`) is sent unless the
    /// receiver goes away first. Returns when the stream is finished.
    pub async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<LlmEvent>) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "API key not configured".to_string(),
                })
                .await;
            return Ok(());
        }

        let request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt));

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: format!("Failed to create event source: {e}"),
                    })
                    .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut usage: Option<(u32, u32)> = None;

        loop {
            let next = match tokio::time::timeout(self.read_timeout, es.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        read_timeout_secs = self.read_timeout.as_secs(),
                        "Completion stream stalled"
                    );
                    es.close();
                    let _ = tx
                        .send(LlmEvent::Error {
                            message: "Network error: timed out waiting for the stream".to_string(),
                        })
                        .await;
                    return Ok(());
                }
            };
            let Some(event) = next else {
                break;
            };
            match event {
                Ok(Event::Open) => {
                    debug!(model = %self.model, "SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();
                    if is_done(data) {
                        es.close();
                        let (prompt_tokens, completion_tokens) = split_usage(usage);
                        info!(?prompt_tokens, ?completion_tokens, "Completion finished");
                        let _ = tx
                            .send(LlmEvent::Complete {
                                full_text,
                                prompt_tokens,
                                completion_tokens,
                            })
                            .await;
                        return Ok(());
                    }
                    if let Some(message) = parse_error_message(data) {
                        es.close();
                        let _ = tx.send(LlmEvent::Error { message }).await;
                        return Ok(());
                    }
                    if let Some(u) = parse_usage(data) {
                        usage = Some(u);
                    }
                    if let Some(text) = parse_delta_content(data) {
                        if text.is_empty() {
                            continue;
                        }
                        full_text.push_str(&text);
                        if tx.send(LlmEvent::Token { text }).await.is_err() {
                            // Receiver dropped.
                            es.close();
                            return Ok(());
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    es.close();
                    break;
                }
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    es.close();
                    let message = describe_stream_error(err).await;
                    let _ = tx.send(LlmEvent::Error { message }).await;
                    return Ok(());
                }
            }
        }

        // Connection closed without the sentinel.
        if full_text.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "Stream ended unexpectedly without any content".to_string(),
                })
                .await;
        } else {
            warn!("Stream closed before [DONE]; keeping received text");
            let (prompt_tokens, completion_tokens) = split_usage(usage);
            let _ = tx
                .send(LlmEvent::Complete {
                    full_text,
                    prompt_tokens,
                    completion_tokens,
                })
                .await;
        }
        Ok(())
    }
}

fn split_usage(usage: Option<(u32, u32)>) -> (Option<u32>, Option<u32>) {
    match usage {
        Some((p, c)) => (Some(p), Some(c)),
        None => (None, None),
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured completion client or a disabled placeholder.
pub enum LlmClient {
    Active(OpenAiClient),
    /// No API key configured.
    Disabled,
}

impl LlmClient {
    /// `Active` when an API key is present in credentials, else `Disabled`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let Some(key) = config.credentials.api_key() else {
            return Ok(LlmClient::Disabled);
        };
        let llm = &config.llm;
        let client = OpenAiClient::new(
            &llm.base_url,
            key.to_string(),
            llm.model.clone(),
            llm.temperature,
            llm.max_tokens,
            Duration::from_secs(llm.connect_timeout_secs),
            Duration::from_secs(llm.read_timeout_secs),
        )?;
        Ok(LlmClient::Active(client))
    }

    pub async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<LlmEvent>) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => client.stream_chat(prompt, tx).await,
            LlmClient::Disabled => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: "LLM not configured".to_string(),
                    })
                    .await;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

pub(crate) fn is_done(data: &str) -> bool {
    data.trim() == DONE_SENTINEL
}

/// Extract `choices[0].delta.content` from a chunk.
///
/// Expected shape: `{ "choices": [ { "delta": { "content": "..." } } ] }`
pub(crate) fn parse_delta_content(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract `(prompt_tokens, completion_tokens)` from the usage chunk.
///
/// Expected shape: `{ "choices": [], "usage": { "prompt_tokens": N, "completion_tokens": M } }`
pub(crate) fn parse_usage(data: &str) -> Option<(u32, u32)> {
    let v: Value = serde_json::from_str(data).ok()?;
    let usage = v.get("usage")?;
    let prompt = usage.get("prompt_tokens")?.as_u64()?;
    let completion = usage.get("completion_tokens")?.as_u64()?;
    Some((u32::try_from(prompt).ok()?, u32::try_from(completion).ok()?))
}

/// `error.message` from an error object, in a chunk or an error body.
pub(crate) fn parse_error_message(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

async fn describe_stream_error(err: reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            match parse_error_message(&body) {
                Some(detail) => format!("API returned status {status}: {detail}"),
                None => format!("API returned status {status}"),
            }
        }
        reqwest_eventsource::Error::Transport(e) => {
            if e.is_timeout() {
                "Network error: timed out".to_string()
            } else {
                format!("Network error: {e}")
            }
        }
        other => format!("Stream error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use squadcast_core::config::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn make_test_config(api_key: Option<String>) -> Config {
        Config {
            upstream: UpstreamConfig {
                base_url: "http://upstream.invalid/api/".into(),
                timeout_secs: 10,
                user_agent: "test".into(),
                fixture_window: 5,
                season_gameweeks: 38,
            },
            analysis: AnalysisConfig {
                top_k: 5,
                history_window: 5,
                lookahead: 5,
                chip_reset_gameweek: 20,
                assumed_free_transfers: 1,
                features: FeatureFlags::default(),
            },
            llm: LlmConfig {
                base_url: "http://llm.invalid/v1".into(),
                model: "gpt-test".into(),
                temperature: Some(0.3),
                max_tokens: 256,
                connect_timeout_secs: 5,
                read_timeout_secs: 30,
            },
            prompt: PromptConfig::default(),
            credentials: CredentialsConfig {
                openai_api_key: api_key,
            },
        }
    }

    fn client_for(base_url: &str, temperature: Option<f64>) -> OpenAiClient {
        OpenAiClient::new(
            base_url,
            "sk-test".into(),
            "gpt-test".into(),
            temperature,
            256,
            Duration::from_secs(2),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    /// Accept one connection, answer with `response`, and hand back the raw
    /// request the client sent.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            // Let the client read everything before the socket drops.
            tokio::time::sleep(Duration::from_millis(100)).await;
            request
        });
        (format!("http://{addr}/v1"), handle)
    }

    /// Read headers plus a `Content-Length` body.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn collect(mut rx: mpsc::Receiver<LlmEvent>) -> Vec<LlmEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    // -- SSE JSON parsing --

    #[test]
    fn parse_delta_content_text() {
        let data = r#"{"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_delta_content(data), Some("Hello".to_string()));
    }

    #[test]
    fn parse_delta_role_only_chunk_has_no_content() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta_content(data), None);
    }

    #[test]
    fn parse_delta_invalid_json() {
        assert_eq!(parse_delta_content("{broken"), None);
    }

    #[test]
    fn parse_usage_chunk() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":1200,"completion_tokens":640,"total_tokens":1840}}"#;
        assert_eq!(parse_usage(data), Some((1200, 640)));
        assert_eq!(parse_usage(r#"{"choices":[],"usage":null}"#), None);
    }

    #[test]
    fn parse_usage_rejects_counts_beyond_u32() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":4294967296,"completion_tokens":1}}"#;
        assert_eq!(parse_usage(data), None);
    }

    #[test]
    fn parse_error_object() {
        let data = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        assert_eq!(parse_error_message(data), Some("Invalid API key".to_string()));
        assert_eq!(parse_error_message(r#"{"choices":[]}"#), None);
    }

    #[test]
    fn done_sentinel() {
        assert!(is_done("[DONE]"));
        assert!(is_done(" [DONE]\n"));
        assert!(!is_done("{\"choices\":[]}"));
    }

    #[test]
    fn request_body_omits_absent_temperature() {
        let with = client_for("http://x/v1", Some(0.3)).request_body("hi");
        assert_eq!(with["temperature"], serde_json::json!(0.3));
        assert_eq!(with["max_completion_tokens"], serde_json::json!(256));
        assert_eq!(with["messages"][0]["content"], serde_json::json!("hi"));
        assert_eq!(with["stream"], serde_json::json!(true));

        let without = client_for("http://x/v1/", None).request_body("hi");
        assert!(without.get("temperature").is_none());
    }

    // -- LlmClient --

    #[test]
    fn from_config_selects_variant_by_api_key() {
        let active = LlmClient::from_config(&make_test_config(Some("sk-live".into()))).unwrap();
        assert!(matches!(active, LlmClient::Active(ref c) if c.model() == "gpt-test"));

        let missing = LlmClient::from_config(&make_test_config(None)).unwrap();
        assert!(matches!(missing, LlmClient::Disabled));

        let blank = LlmClient::from_config(&make_test_config(Some("  ".into()))).unwrap();
        assert!(matches!(blank, LlmClient::Disabled));
    }

    #[tokio::test]
    async fn disabled_client_sends_error_event() {
        let (tx, rx) = mpsc::channel(8);
        LlmClient::Disabled.stream_chat("prompt", tx).await.unwrap();
        assert_eq!(
            collect(rx).await,
            vec![LlmEvent::Error {
                message: "LLM not configured".to_string()
            }]
        );
    }

    // -- Mock SSE server --

    #[tokio::test]
    async fn mock_sse_server_full_flow() {
        let (base, server) = serve_once(concat!(
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: text/event-stream\r\n",
            "Cache-Control: no-cache\r\n",
            "\r\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Sell\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" Md03\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":30,\"completion_tokens\":2}}\n\n",
            "data: [DONE]\n\n",
        ))
        .await;

        let client = client_for(&base, Some(0.3));
        let (tx, rx) = mpsc::channel(32);
        client.stream_chat("advise me", tx).await.unwrap();
        let events = collect(rx).await;

        assert_eq!(
            events,
            vec![
                LlmEvent::Token { text: "Sell".into() },
                LlmEvent::Token { text: " Md03".into() },
                LlmEvent::Complete {
                    full_text: "Sell Md03".into(),
                    prompt_tokens: Some(30),
                    completion_tokens: Some(2),
                },
            ]
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "), "{request}");
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"advise me\""));
    }

    #[tokio::test]
    async fn mock_sse_server_error_status() {
        let (base, server) = serve_once(concat!(
            "HTTP/1.1 401 Unauthorized\r\n",
            "Content-Type: application/json\r\n",
            "Connection: close\r\n",
            "\r\n",
            "{\"error\":{\"message\":\"Invalid API key\",\"type\":\"invalid_request_error\"}}",
        ))
        .await;

        let client = client_for(&base, None);
        let (tx, rx) = mpsc::channel(8);
        client.stream_chat("advise me", tx).await.unwrap();
        let events = collect(rx).await;
        let _ = server.await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            LlmEvent::Error { message } => {
                assert!(message.contains("401"), "{message}");
                assert!(message.contains("Invalid API key"), "{message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{addr}/v1"), None);
        let (tx, rx) = mpsc::channel(8);
        client.stream_chat("advise me", tx).await.unwrap();
        let events = collect(rx).await;
        assert!(matches!(events.as_slice(), [LlmEvent::Error { .. }]), "{events:?}");
    }

    #[tokio::test]
    async fn stalled_stream_times_out_with_error_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = client_for(&format!("http://{addr}/v1"), None);
        let (tx, rx) = mpsc::channel(8);
        tokio::time::timeout(Duration::from_secs(5), client.stream_chat("advise me", tx))
            .await
            .expect("stream_chat should give up on its own")
            .unwrap();
        let events = collect(rx).await;
        server.abort();

        match events.as_slice() {
            [LlmEvent::Error { message }] => assert!(message.contains("timed out"), "{message}"),
            other => panic!("expected one Error, got {other:?}"),
        }
    }
}
