//! Sub-agent and tool-server definitions
//!
//! Both are handed to the agent process as JSON launch arguments
//! (`--agents`, `--mcp-config`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Prefix shared by every tool exposed through an external tool server
pub const MCP_TOOL_PREFIX: &str = "mcp__";

/// Name under which the agent exposes `tool` from tool server `server`
///
/// ```
/// use agentwire_protocol::agent::mcp_tool_name;
///
/// assert_eq!(mcp_tool_name("filesystem", "read_file"), "mcp__filesystem__read_file");
/// ```
pub fn mcp_tool_name(server: &str, tool: &str) -> String {
    format!("{MCP_TOOL_PREFIX}{server}__{tool}")
}

/// Split a namespaced tool name back into `(server, tool)`
pub fn parse_mcp_tool_name(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(MCP_TOOL_PREFIX)?.split_once("__")
}

/// Definition of a named sub-agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    /// When the main agent should delegate to this one
    pub description: String,

    /// System prompt for the sub-agent
    pub prompt: String,

    /// Tools the sub-agent may use; inherits the parent's when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    /// Model alias or id for the sub-agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentDefinition {
    /// Create a new agent definition
    pub fn new(description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            prompt: prompt.into(),
            tools: None,
            model: None,
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set allowed tools
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }
}

/// Launch descriptor for an external tool server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Server launched as a child process speaking over stdio
    Stdio {
        /// Executable
        command: String,
        /// Arguments
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Extra environment
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },

    /// Remote server over server-sent events
    Sse {
        /// Endpoint
        url: String,
        /// Extra request headers
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },

    /// Remote server over streamable HTTP
    Http {
        /// Endpoint
        url: String,
        /// Extra request headers
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl McpServerConfig {
    /// Stdio server from a command line
    pub fn stdio<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stdio {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        }
    }

    /// Stdio server with an explicit environment
    pub fn stdio_with_env<I, S>(
        command: impl Into<String>,
        args: I,
        env: HashMap<String, String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stdio {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env,
        }
    }

    /// Remote SSE server
    pub fn sse(url: impl Into<String>) -> Self {
        Self::Sse {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Remote HTTP server
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            headers: HashMap::new(),
        }
    }
}

/// Serialize tool servers into the `--mcp-config` document
pub fn mcp_config_json(servers: &BTreeMap<String, McpServerConfig>) -> serde_json::Value {
    serde_json::json!({ "mcpServers": servers })
}
