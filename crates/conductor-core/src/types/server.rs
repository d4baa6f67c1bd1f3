//! Tool server configuration types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration of one named tool server
///
/// The shape decides the transport: a `command` means a local subprocess
/// speaking MCP over stdio, a `url` means a remote streamable HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerConfig {
    /// Local subprocess server
    Local(LocalServerConfig),
    /// Remote HTTP server
    Remote(RemoteServerConfig),
}

/// Local subprocess server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalServerConfig {
    /// Executable to spawn
    pub command: String,
    /// Command-line arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory for the child process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

/// Remote server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    /// Streamable HTTP endpoint
    pub url: String,
    /// Extra request headers (e.g. `Authorization`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Legacy streaming endpoint tried when the primary transport fails
    #[serde(
        rename = "fallbackUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fallback_url: Option<String>,
}

impl ServerConfig {
    /// Create a local subprocess config
    pub fn local(command: impl Into<String>) -> Self {
        ServerConfig::Local(LocalServerConfig {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        })
    }

    /// Create a remote config
    pub fn remote(url: impl Into<String>) -> Self {
        ServerConfig::Remote(RemoteServerConfig {
            url: url.into(),
            headers: BTreeMap::new(),
            fallback_url: None,
        })
    }

    /// Set command-line arguments (local configs only)
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let ServerConfig::Local(ref mut local) = self {
            local.args = args.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Add an environment override (local configs only)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ServerConfig::Local(ref mut local) = self {
            local.env.insert(key.into(), value.into());
        }
        self
    }

    /// Add a request header (remote configs only)
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ServerConfig::Remote(ref mut remote) = self {
            remote.headers.insert(key.into(), value.into());
        }
        self
    }

    /// Short transport label for logs and status output
    pub fn transport(&self) -> &'static str {
        match self {
            ServerConfig::Local(_) => "stdio",
            ServerConfig::Remote(_) => "http",
        }
    }

    /// Check the config has a usable shape
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ServerConfig::Local(local) if local.command.trim().is_empty() => {
                Err("local server config requires a non-empty command".to_string())
            }
            ServerConfig::Remote(remote) => {
                let url = remote.url.trim();
                if url.starts_with("http://") || url.starts_with("https://") {
                    Ok(())
                } else {
                    Err(format!("remote server url must be http(s): {:?}", remote.url))
                }
            }
            ServerConfig::Local(_) => Ok(()),
        }
    }
}

impl RemoteServerConfig {
    /// Endpoint for the legacy streaming fallback
    pub fn fallback_endpoint(&self) -> String {
        if let Some(ref url) = self.fallback_url {
            return url.clone();
        }
        let base = self.url.trim_end_matches('/');
        match base.strip_suffix("/mcp") {
            Some(root) => format!("{}/sse", root),
            None => format!("{}/sse", base),
        }
    }
}
