//! MCP connector using the official rmcp SDK
//!
//! Local configs spawn a child process speaking MCP over stdio. Remote
//! configs use the streamable HTTP transport and fall back once to the
//! legacy streaming endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
        RawContent, Tool,
    },
    service::{Peer, RunningService},
    transport::{
        streamable_http_client::StreamableHttpClientTransportConfig, ConfigureCommandExt,
        StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceError, ServiceExt,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::logging::Logger;
use crate::types::{LocalServerConfig, RemoteServerConfig, ServerConfig, ToolDescriptor};
use crate::{log_info, log_warn};
use super::error::{McpError, McpResult};
use super::transport::{Connector, McpSession};

fn client_info() -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "conductor-core".to_string(),
            title: Some("Conductor".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            website_url: None,
            icons: None,
        },
    }
}

/// Connector backed by rmcp transports
pub struct RmcpConnector {
    logger: Arc<dyn Logger>,
}

impl RmcpConnector {
    /// Create a new connector
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    async fn connect_stdio(&self, name: &str, local: &LocalServerConfig) -> McpResult<RmcpSession> {
        log_info!(self.logger, "[RmcpConnector] Spawning '{}' for server '{}'", local.command, name);

        let transport = TokioChildProcess::new(
            tokio::process::Command::new(&local.command).configure(|cmd| {
                cmd.args(&local.args).envs(local.env.iter());
                if let Some(ref cwd) = local.cwd {
                    cmd.current_dir(cwd);
                }
            }),
        )
        .map_err(|e| McpError::ConnectionFailed(format!("spawn {}: {}", local.command, e)))?;

        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| McpError::InitializationFailed(e.to_string()))?;

        Ok(RmcpSession::new(name, service, Arc::clone(&self.logger)))
    }

    async fn connect_http(
        &self,
        name: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> McpResult<RmcpSession> {
        log_info!(self.logger, "[RmcpConnector] Connecting to {} for server '{}'", url, name);

        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| McpError::InvalidConfig(format!("header {}: {}", key, e)))?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| McpError::InvalidConfig(format!("header {}: {}", key, e)))?;
            header_map.insert(header_name, header_value);
        }
        let http_client = reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| McpError::ConnectionFailed(format!("build HTTP client: {}", e)))?;

        let transport = StreamableHttpClientTransport::with_client(
            http_client,
            StreamableHttpClientTransportConfig::with_uri(url.to_string()),
        );

        let service = client_info()
            .serve(transport)
            .await
            .map_err(|e| McpError::InitializationFailed(e.to_string()))?;

        Ok(RmcpSession::new(name, service, Arc::clone(&self.logger)))
    }

    async fn connect_remote(&self, name: &str, remote: &RemoteServerConfig) -> McpResult<RmcpSession> {
        let primary = match self.connect_http(name, &remote.url, &remote.headers).await {
            Ok(session) => return Ok(session),
            Err(e) => e,
        };

        let fallback = remote.fallback_endpoint();
        log_warn!(
            self.logger,
            "[RmcpConnector] Streamable HTTP failed for '{}' ({}), trying {}",
            name, primary, fallback
        );
        self.connect_http(name, &fallback, &remote.headers)
            .await
            .map_err(|e| {
                McpError::ConnectionFailed(format!("{}; fallback {}: {}", primary, fallback, e))
            })
    }
}

#[async_trait]
impl Connector for RmcpConnector {
    async fn connect(&self, name: &str, config: &ServerConfig) -> McpResult<Arc<dyn McpSession>> {
        let session = match config {
            ServerConfig::Local(local) => self.connect_stdio(name, local).await?,
            ServerConfig::Remote(remote) => self.connect_remote(name, remote).await?,
        };
        if let Some(info) = session.server_info() {
            log_info!(
                self.logger,
                "[RmcpConnector] '{}' initialized ({} {})",
                name, info.name, info.version
            );
        }
        Ok(Arc::new(session))
    }
}

/// Live rmcp session
pub struct RmcpSession {
    server: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
    logger: Arc<dyn Logger>,
}

impl RmcpSession {
    fn new(server: &str, service: RunningService<RoleClient, ClientInfo>, logger: Arc<dyn Logger>) -> Self {
        Self {
            server: server.to_string(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            logger,
        }
    }

    /// Get server info
    pub fn server_info(&self) -> Option<Implementation> {
        self.peer.peer_info().map(|info| info.server_info.clone())
    }
}

fn map_service_error(error: ServiceError) -> McpError {
    match error {
        ServiceError::TransportClosed => McpError::TransportClosed,
        other => McpError::ToolCallFailed(other.to_string()),
    }
}

fn to_descriptor(tool: Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|s| s.to_string()).unwrap_or_default(),
        input_schema: serde_json::to_value(tool.input_schema.as_ref()).unwrap_or_default(),
    }
}

/// Reduce a call result to the value handed to callers
///
/// Structured content wins; otherwise text parts are used, parsed as JSON
/// when they hold JSON.
fn result_value(result: CallToolResult) -> McpResult<Value> {
    let texts: Vec<String> = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect();

    if result.is_error.unwrap_or(false) {
        return Err(McpError::ToolError(texts.join("\n")));
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let parse = |text: String| serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
    Ok(match texts.len() {
        0 => Value::Null,
        1 => texts.into_iter().next().map(parse).unwrap_or(Value::Null),
        _ => Value::Array(texts.into_iter().map(parse).collect()),
    })
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let result = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        log_info!(self.logger, "[RmcpSession] '{}' listed {} tools", self.server, result.tools.len());

        Ok(result.tools.into_iter().map(to_descriptor).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
        };

        let result = self.peer.call_tool(params).await.map_err(map_service_error)?;
        result_value(result)
    }

    async fn close(&self) {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            log_info!(self.logger, "[RmcpSession] Closing '{}'", self.server);
            if let Err(e) = service.cancel().await {
                log_warn!(self.logger, "[RmcpSession] Error closing '{}': {}", self.server, e);
            }
        }
    }
}
