//! Common type definitions used across the protocol
//!
//! Token usage, permission modes and well-known model identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token usage reported on a turn's result
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Number of tokens in the input
    #[serde(default)]
    pub input_tokens: u64,

    /// Number of tokens in the output
    #[serde(default)]
    pub output_tokens: u64,

    /// Tokens read from the prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: u64,

    /// Tokens written to the prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl Usage {
    /// Create a new usage structure
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    /// Get total tokens (input + output)
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Add another usage record into this one
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
    }
}

/// How the agent asks for approval before running tools
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Prompt for each tool use
    #[default]
    Default,

    /// Auto-approve file edits, prompt for everything else
    AcceptEdits,

    /// Skip all permission prompts
    BypassPermissions,

    /// Skip all permission prompts; meant for sandboxed environments
    DangerouslySkipPermissions,
}

impl PermissionMode {
    /// The value passed to `--permission-mode` and to `set_permission_mode`
    /// control requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::DangerouslySkipPermissions => "dangerouslySkipPermissions",
        }
    }

    /// Command-line flags selecting this mode
    pub fn cli_args(&self) -> Vec<String> {
        match self {
            Self::DangerouslySkipPermissions => vec!["--dangerously-skip-permissions".into()],
            mode => vec!["--permission-mode".into(), mode.as_str().into()],
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" | "accept_edits" => Ok(Self::AcceptEdits),
            "bypassPermissions" | "bypass_permissions" => Ok(Self::BypassPermissions),
            "dangerouslySkipPermissions" | "dangerously_skip_permissions" => {
                Ok(Self::DangerouslySkipPermissions)
            }
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// Well-known model identifiers
pub mod models {
    /// Claude Haiku 4.5
    pub const CLAUDE_HAIKU_4_5_20251001: &str = "claude-haiku-4-5-20251001";

    /// Claude Sonnet 4.5
    pub const CLAUDE_SONNET_4_5_20250929: &str = "claude-sonnet-4-5-20250929";

    /// Claude Opus 4.1
    pub const CLAUDE_OPUS_4_1_20250805: &str = "claude-opus-4-1-20250805";

    /// Fastest model; the usual choice for scripts and tests
    pub const HAIKU: &str = CLAUDE_HAIKU_4_5_20251001;

    /// Balanced default
    pub const SONNET: &str = CLAUDE_SONNET_4_5_20250929;

    /// Most capable model
    pub const OPUS: &str = CLAUDE_OPUS_4_1_20250805;
}
