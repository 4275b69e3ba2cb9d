// ABOUTME: implements the model gateway against the google generative language generateContent api.
// ABOUTME: runs the model's function calls locally and feeds the answers back until a final object arrives.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{extract_json_object, GatewayError, GenerateRequest, ModelGateway, OutputContract};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }
}

pub struct GeminiGateway {
    client: Client,
    config: GeminiConfig,
}

impl GeminiGateway {
    pub fn new(config: GeminiConfig) -> Result<Self, GatewayError> {
        if config.api_key.trim().is_empty() {
            return Err(GatewayError::Configuration("api key must be non-empty".to_string()));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_URL)
            .trim_end_matches('/')
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url(), self.config.model)
    }

    async fn generate(&self, body: &GeminiRequest<'_>) -> Result<GeminiResponse, GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|err| GatewayError::Transport(format!("decode generateContent response: {err}")))
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn invoke(&self, request: GenerateRequest) -> Result<Value, GatewayError> {
        let prompt = with_output_instructions(&request.prompt, &request.output);
        let mut contents = vec![GeminiContent::user(prompt)];
        let mut rounds = 0u32;

        loop {
            let body = build_request(&contents, &request);
            let response = self.generate(&body).await?;
            let content = first_candidate(response)?;

            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|p| p.function_call.clone())
                .collect();

            if calls.is_empty() {
                let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
                return extract_json_object(&text).ok_or_else(|| {
                    GatewayError::OutputMissing(format!("no json object in model text for {}", request.output.name))
                });
            }

            if rounds >= self.config.max_tool_rounds {
                return Err(GatewayError::ToolRoundsExceeded(self.config.max_tool_rounds));
            }
            rounds += 1;

            let mut answers = Vec::with_capacity(calls.len());
            for call in calls {
                let tool = request
                    .find_tool(&call.name)
                    .ok_or_else(|| GatewayError::UnknownTool(call.name.clone()))?;
                let response = match tool.call(call.args) {
                    Ok(output) => serde_json::json!({ "output": output }),
                    Err(message) => serde_json::json!({ "error": message }),
                };
                tracing::debug!(tool = %call.name, round = rounds, response = %response, "answered model tool call");
                answers.push(GeminiPart::function_response(call.name, response));
            }

            contents.push(content);
            contents.push(GeminiContent {
                role: "function".to_string(),
                parts: answers,
            });
        }
    }
}

fn with_output_instructions(prompt: &str, output: &OutputContract) -> String {
    let schema = serde_json::to_string_pretty(&output.schema).unwrap_or_else(|_| output.schema.to_string());
    format!(
        "{prompt}\n\nOutput should be in JSON format and conform to the following schema:\n\n```\n{schema}\n```\n"
    )
}

fn build_request<'a>(contents: &'a [GeminiContent], request: &GenerateRequest) -> GeminiRequest<'a> {
    let mut tools = Vec::new();
    let mut generation_config = GenerationConfig::default();

    if request.tools.is_empty() {
        generation_config.response_mime_type = Some("application/json".to_string());
        generation_config.response_schema = Some(request.output.schema.clone());
    } else {
        tools.push(GeminiTools {
            function_declarations: request
                .tools
                .iter()
                .map(|t| {
                    let def = t.definition();
                    FunctionDeclaration {
                        name: def.name,
                        description: def.description,
                        parameters: def.input_schema,
                    }
                })
                .collect(),
        });
    }

    GeminiRequest {
        contents,
        tools,
        generation_config,
    }
}

fn first_candidate(response: GeminiResponse) -> Result<GeminiContent, GatewayError> {
    let block_reason = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
        .map(str::to_string);

    let candidate = match response.candidates.into_iter().next() {
        Some(c) => c,
        None => {
            let reason = block_reason.unwrap_or_else(|| "no candidates".to_string());
            return Err(GatewayError::OutputMissing(reason));
        }
    };

    match candidate.content {
        Some(mut content) if !content.parts.is_empty() => {
            if content.role.is_empty() {
                content.role = "model".to_string();
            }
            Ok(content)
        }
        _ => Err(GatewayError::OutputMissing(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

fn parse_error(status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => GatewayError::Authentication(message),
        429 => GatewayError::RateLimited(message),
        _ => GatewayError::Api { status, message },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: &'a [GeminiContent],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn user(text: String) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![GeminiPart {
                text: Some(text),
                function_call: None,
                function_response: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn function_response(name: String, response: Value) -> Self {
        Self {
            text: None,
            function_call: None,
            function_response: Some(FunctionResponse { name, response }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::gateway::{Tool, ToolDefinition};

    struct EchoTool;

    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                input_schema: serde_json::json!({"type":"object","properties":{"value":{"type":"string"}}}),
            }
        }

        fn call(&self, input: Value) -> Result<Value, String> {
            match input.get("value").and_then(|v| v.as_str()) {
                Some(v) => Ok(Value::String(v.to_string())),
                None => Err("missing value".to_string()),
            }
        }
    }

    fn contract() -> OutputContract {
        OutputContract {
            name: "Answer".to_string(),
            schema: serde_json::json!({"type":"object","properties":{"answer":{"type":"string"}}}),
        }
    }

    // Minimal http/1.1 responder: reads one full request per connection and
    // answers with the next canned body.
    async fn serve(bodies: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_server = seen.clone();

        tokio::spawn(async move {
            for (status, body) in bodies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request_body = read_http_body(&mut stream).await;
                if let Ok(v) = serde_json::from_slice::<Value>(&request_body) {
                    seen_server.lock().unwrap().push(v);
                }
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{addr}/v1beta"), seen)
    }

    async fn read_http_body(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return Vec::new();
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let body_start = header_end + 4;
                while data.len() < body_start + content_length {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                }
                return data[body_start..].to_vec();
            }
        }
    }

    fn text_response(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}]
        })
        .to_string()
    }

    fn call_response(name: &str, args: Value) -> String {
        serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]}}]
        })
        .to_string()
    }

    #[test]
    fn build_request_uses_json_mode_without_tools() {
        let contents = vec![GeminiContent::user("hi".to_string())];
        let request = GenerateRequest::new("hi", contract());
        let body = serde_json::to_value(build_request(&contents, &request)).unwrap();

        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "object");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn build_request_declares_tools_instead_of_json_mode() {
        let contents = vec![GeminiContent::user("hi".to_string())];
        let request = GenerateRequest::new("hi", contract()).with_tool(Arc::new(EchoTool));
        let body = serde_json::to_value(build_request(&contents, &request)).unwrap();

        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "echo");
    }

    #[test]
    fn prompt_carries_output_schema() {
        let prompt = with_output_instructions("convert this", &contract());
        assert!(prompt.starts_with("convert this"));
        assert!(prompt.contains("\"answer\""));
    }

    #[test]
    fn parse_error_maps_status_codes() {
        let body = r#"{"error":{"code":429,"message":"quota exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(parse_error(429, body), GatewayError::RateLimited(m) if m == "quota exhausted"));
        assert!(matches!(parse_error(403, "denied"), GatewayError::Authentication(_)));
        assert!(matches!(parse_error(500, "oops"), GatewayError::Api { status: 500, .. }));
    }

    #[test]
    fn first_candidate_reports_block_reason() {
        let response: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match first_candidate(response) {
            Err(GatewayError::OutputMissing(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_blank_api_key() {
        assert!(matches!(
            GeminiGateway::new(GeminiConfig::new("  ")),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn invoke_returns_final_object() {
        let (base_url, seen) = serve(vec![(200, text_response(r#"{"answer":"42"}"#))]).await;
        let gateway = GeminiGateway::new(GeminiConfig::new("test-key").base_url(base_url)).unwrap();

        let out = gateway.invoke(GenerateRequest::new("question", contract())).await.unwrap();
        assert_eq!(out["answer"], "42");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn invoke_runs_tool_calls_and_sends_answers_back() {
        let (base_url, seen) = serve(vec![
            (200, call_response("echo", serde_json::json!({"value": "ping"}))),
            (200, text_response("```json\n{\"answer\":\"pong\"}\n```")),
        ])
        .await;
        let gateway = GeminiGateway::new(GeminiConfig::new("test-key").base_url(base_url)).unwrap();

        let request = GenerateRequest::new("question", contract()).with_tool(Arc::new(EchoTool));
        let out = gateway.invoke(request).await.unwrap();
        assert_eq!(out["answer"], "pong");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let followup = &seen[1]["contents"];
        assert_eq!(followup[1]["role"], "model");
        assert_eq!(followup[2]["role"], "function");
        assert_eq!(followup[2]["parts"][0]["functionResponse"]["name"], "echo");
        assert_eq!(followup[2]["parts"][0]["functionResponse"]["response"]["output"], "ping");
    }

    #[tokio::test]
    async fn invoke_stops_after_max_tool_rounds() {
        let (base_url, _seen) = serve(vec![
            (200, call_response("echo", serde_json::json!({"value": "a"}))),
            (200, call_response("echo", serde_json::json!({"value": "b"}))),
        ])
        .await;
        let gateway = GeminiGateway::new(
            GeminiConfig::new("test-key").base_url(base_url).max_tool_rounds(1),
        )
        .unwrap();

        let request = GenerateRequest::new("question", contract()).with_tool(Arc::new(EchoTool));
        let err = gateway.invoke(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::ToolRoundsExceeded(1)));
    }

    #[tokio::test]
    async fn invoke_rejects_unknown_tool() {
        let (base_url, _seen) = serve(vec![(200, call_response("nope", serde_json::json!({})))]).await;
        let gateway = GeminiGateway::new(GeminiConfig::new("test-key").base_url(base_url)).unwrap();

        let err = gateway.invoke(GenerateRequest::new("question", contract())).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn invoke_maps_http_errors() {
        let body = r#"{"error":{"code":401,"message":"API key not valid","status":"UNAUTHENTICATED"}}"#;
        let (base_url, _seen) = serve(vec![(401, body.to_string())]).await;
        let gateway = GeminiGateway::new(GeminiConfig::new("bad-key").base_url(base_url)).unwrap();

        let err = gateway.invoke(GenerateRequest::new("question", contract())).await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(m) if m == "API key not valid"));
    }

    #[tokio::test]
    async fn invoke_reports_missing_object() {
        let (base_url, _seen) = serve(vec![(200, text_response("I cannot help with that."))]).await;
        let gateway = GeminiGateway::new(GeminiConfig::new("test-key").base_url(base_url)).unwrap();

        let err = gateway.invoke(GenerateRequest::new("question", contract())).await.unwrap_err();
        assert!(matches!(err, GatewayError::OutputMissing(_)));
    }
}
