//! Integration tests for the slotwise-agent crate.
//!
//! The LLM client is pointed at a one-shot HTTP stub on a local port, so
//! request shape and response parsing are checked without a live provider.

use slotwise_agent::{
    AgentError, AppConfig, ChatRequest, LlmClient, LlmClientConfig, LlmProvider, Message,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answer one request with `status` and `body`; yields the raw request text.
async fn stub(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).to_string()
    });

    (base, handle)
}

fn extraction_request() -> ChatRequest {
    ChatRequest::deterministic(vec![
        Message::system("Return JSON with an `intent` field."),
        Message::user("30 minutes of stretching every morning"),
    ])
    .with_json_mode()
}

// ═══════════════════════════════════════════════════════════════════════
//  Providers
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn openai_compatible_round_trip() {
    let (base, request) = stub(
        "200 OK",
        r#"{"choices":[{"message":{"content":"{\"intent\":\"HABIT_SCHEDULE\"}"},"finish_reason":"stop"}],"usage":{"prompt_tokens":21,"completion_tokens":7}}"#,
    )
    .await;

    let client =
        LlmClient::new(LlmClientConfig::openai("sk-test", "gpt-4o-mini").with_base_url(base))
            .unwrap();
    let response = client.chat(&extraction_request()).await.unwrap();

    assert_eq!(response.text, r#"{"intent":"HABIT_SCHEDULE"}"#);
    assert_eq!(response.usage.input_tokens, 21);
    assert_eq!(response.usage.output_tokens, 7);

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /chat/completions"));
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    assert!(raw.contains("json_object"));
    assert!(raw.contains("gpt-4o-mini"));
}

#[tokio::test]
async fn anthropic_round_trip() {
    let (base, request) = stub(
        "200 OK",
        r#"{"content":[{"type":"text","text":"{\"intent\":\"TASK_SCHEDULE\"}"}],"stop_reason":"end_turn","usage":{"input_tokens":30,"output_tokens":9}}"#,
    )
    .await;

    let client = LlmClient::new(
        LlmClientConfig::anthropic("sk-ant-test", "claude-sonnet-4-20250514").with_base_url(base),
    )
    .unwrap();
    assert_eq!(client.provider(), LlmProvider::Anthropic);

    let response = client.chat(&extraction_request()).await.unwrap();
    assert_eq!(response.text, r#"{"intent":"TASK_SCHEDULE"}"#);
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));

    let raw = request.await.unwrap();
    assert!(raw.starts_with("POST /v1/messages"));
    assert!(raw.to_ascii_lowercase().contains("x-api-key: sk-ant-test"));
    assert!(raw.contains("Return JSON with an `intent` field."));
}

#[tokio::test]
async fn provider_error_status_is_reported() {
    let (base, _request) = stub(
        "429 Too Many Requests",
        r#"{"error":{"message":"slow down"}}"#,
    )
    .await;

    let client =
        LlmClient::new(LlmClientConfig::openai("sk-test", "gpt-4o-mini").with_base_url(base))
            .unwrap();
    let err = client.chat(&extraction_request()).await.unwrap_err();
    match err {
        AgentError::LlmRequestFailed { reason } => {
            assert!(reason.contains("429"), "{reason}");
            assert!(reason.contains("slow down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration to client
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn configured_client_uses_settings() {
    let mut config = AppConfig::from_toml_str(
        r#"
        [llm]
        provider = "openai"
        model = "gpt-4o-mini"
        base_url = "http://localhost:8000/v1"
        "#,
    )
    .unwrap();
    config.apply_env(|k| (k == "OPENAI_API_KEY").then(|| "sk-env".to_owned()));

    let client = LlmClient::new(config.llm.client_config().unwrap()).unwrap();
    assert_eq!(client.provider(), LlmProvider::OpenAI);
    assert_eq!(client.default_model(), "gpt-4o-mini");
}
