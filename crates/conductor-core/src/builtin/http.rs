//! HTTP toolkit: fetch a URL on the model's behalf

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::capabilities::{BuiltinCall, BuiltinTool, CapabilityError, CapabilityResult};

/// Bodies beyond this are truncated
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// HTTP fetch input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HttpFetchInput {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body for POST requests
    #[serde(default)]
    pub body: Option<Value>,
}

impl HttpFetchInput {
    fn validate(&self) -> CapabilityResult<reqwest::Url> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| CapabilityError::InvalidInput(format!("bad url {:?}: {}", self.url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CapabilityError::InvalidInput(format!("unsupported scheme: {}", other))),
        }
    }
}

/// Fetches URLs with reqwest
pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, input: HttpFetchInput, url: reqwest::Url) -> CapabilityResult<Value> {
        let mut request = match input.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        }
        .timeout(REQUEST_TIMEOUT);

        for (key, value) in &input.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &input.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::Builtin(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let (bytes, truncated) = read_capped(response).await?;

        Ok(json!({
            "status": status,
            "contentType": content_type,
            "truncated": truncated,
            "body": body_value(&bytes, &content_type, truncated),
        }))
    }
}

/// Read at most `MAX_BODY_BYTES`, reporting whether more was left
async fn read_capped(mut response: reqwest::Response) -> CapabilityResult<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CapabilityError::Builtin(format!("reading body failed: {}", e)))?
    {
        let room = MAX_BODY_BYTES - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete JSON bodies are parsed, everything else is returned as text
fn body_value(bytes: &[u8], content_type: &str, truncated: bool) -> Value {
    if content_type.contains("json") && !truncated {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

#[async_trait]
impl BuiltinTool for HttpFetchTool {
    fn toolkit(&self) -> &str {
        "http"
    }

    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web URL with GET or POST and return the status and body"
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(HttpFetchInput)).unwrap_or_else(|_| json!({ "type": "object" }))
    }

    async fn call(&self, input: Value, call: BuiltinCall) -> CapabilityResult<Value> {
        let input: HttpFetchInput =
            serde_json::from_value(input).map_err(|e| CapabilityError::InvalidInput(e.to_string()))?;
        let url = input.validate()?;

        tokio::select! {
            biased;
            _ = call.cancel.cancelled() => Err(CapabilityError::Cancelled),
            result = self.fetch(input, url) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancellationToken;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response on a local port and return its URL
    async fn serve_once(content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
        format!("http://{}/data", addr)
    }

    fn local_tool() -> HttpFetchTool {
        HttpFetchTool::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    fn call(cancel: CancellationToken) -> BuiltinCall {
        BuiltinCall {
            call_id: "call-1".into(),
            cancel,
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_urls() {
        let tool = HttpFetchTool::new();
        let err = tool
            .call(json!({ "url": "ftp://example.com/file" }), call(CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(ref m) if m.contains("ftp")));

        let err = tool
            .call(json!({ "url": "not a url" }), call(CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = HttpFetchTool::new()
            .call(json!({ "url": "https://example.invalid/" }), call(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Cancelled));
    }

    #[test]
    fn test_body_value() {
        assert_eq!(body_value(br#"{"ok":true}"#, "application/json", false), json!({ "ok": true }));
        assert_eq!(body_value(b"hello", "text/plain", false), json!("hello"));
        assert_eq!(body_value(br#"{"ok":true}"#, "application/json", true), json!(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn test_small_json_body_is_parsed() {
        let url = serve_once("application/json", br#"{"rows":[1,2]}"#.to_vec()).await;
        let result = local_tool().call(json!({ "url": url }), call(CancellationToken::new())).await.unwrap();

        assert_eq!(result["status"], json!(200));
        assert_eq!(result["truncated"], json!(false));
        assert_eq!(result["body"], json!({ "rows": [1, 2] }));
    }

    #[tokio::test]
    async fn test_large_json_body_is_capped() {
        let mut body = b"{\"data\":\"".to_vec();
        body.extend(std::iter::repeat(b'x').take(MAX_BODY_BYTES * 2));
        body.extend_from_slice(b"\"}");
        let url = serve_once("application/json", body).await;

        let result = local_tool().call(json!({ "url": url }), call(CancellationToken::new())).await.unwrap();

        assert_eq!(result["truncated"], json!(true));
        let text = result["body"].as_str().unwrap();
        assert_eq!(text.len(), MAX_BODY_BYTES);
        assert!(text.starts_with("{\"data\":\"xxx"));
    }
}
