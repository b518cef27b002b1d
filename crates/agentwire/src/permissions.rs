//! Permission prompts for tool execution
//!
//! When a [`PermissionCallback`] is configured the agent is launched with
//! `--permission-prompt-tool stdio` and asks the client, via `can_use_tool`
//! control requests, whether each tool call that is not already allowed may
//! run. The callback fails safe: an error, panic or timeout answers `Deny`.

use agentwire_protocol::{PermissionRequest, PermissionResult};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by permission callbacks
pub type PermissionFuture = Pin<Box<dyn Future<Output = PermissionResult> + Send>>;

type PermissionHandler = Arc<dyn Fn(PermissionRequest) -> PermissionFuture + Send + Sync>;

/// Answers the agent's `can_use_tool` prompts
///
/// # Example
///
/// ```
/// use agentwire::PermissionCallback;
/// use agentwire_protocol::PermissionResult;
///
/// let callback = PermissionCallback::from_fn(|request| {
///     if request.tool_name == "Bash" {
///         PermissionResult::deny("shell access is disabled")
///     } else {
///         PermissionResult::allow()
///     }
/// });
/// # let _ = callback;
/// ```
#[derive(Clone)]
pub struct PermissionCallback {
    handler: PermissionHandler,
}

impl std::fmt::Debug for PermissionCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCallback").finish_non_exhaustive()
    }
}

impl PermissionCallback {
    /// Wrap an async callback
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(PermissionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PermissionResult> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |request| Box::pin(handler(request))),
        }
    }

    /// Wrap a synchronous callback
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(PermissionRequest) -> PermissionResult + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            handler: Arc::new(move |request| {
                let handler = Arc::clone(&handler);
                Box::pin(async move { handler(request) })
            }),
        }
    }

    /// Ask the callback, denying if it fails or takes longer than `timeout`
    pub async fn decide(&self, request: PermissionRequest, timeout: Duration) -> PermissionResult {
        let tool = request.tool_name.clone();
        let handler = Arc::clone(&self.handler);
        let call = AssertUnwindSafe(async move { handler(request).await }).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => {
                tracing::debug!(%tool, allowed = result.is_allowed(), "permission decided");
                result
            }
            Ok(Err(_)) => {
                tracing::warn!(%tool, "permission callback panicked; denying");
                PermissionResult::deny("permission callback panicked")
            }
            Err(_) => {
                tracing::warn!(%tool, ?timeout, "permission callback timed out; denying");
                PermissionResult::deny(format!("permission callback timed out after {timeout:?}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(tool: &str) -> PermissionRequest {
        PermissionRequest {
            tool_name: tool.into(),
            input: json!({"command": "ls"}),
            permission_suggestions: Vec::new(),
            blocked_path: None,
        }
    }

    #[tokio::test]
    async fn test_sync_callback() {
        let callback = PermissionCallback::from_fn(|req| {
            if req.tool_name == "Bash" {
                PermissionResult::deny("no shell")
            } else {
                PermissionResult::allow()
            }
        });
        let timeout = Duration::from_secs(1);
        assert!(callback.decide(request("Read"), timeout).await.is_allowed());
        assert_eq!(
            callback.decide(request("Bash"), timeout).await,
            PermissionResult::deny("no shell")
        );
    }

    #[tokio::test]
    async fn test_async_callback_can_rewrite_input() {
        let callback = PermissionCallback::new(|req: PermissionRequest| async move {
            let mut input = req.input;
            input["command"] = json!("ls -la");
            PermissionResult::Allow {
                updated_input: Some(input),
            }
        });
        let result = callback.decide(request("Bash"), Duration::from_secs(1)).await;
        assert_eq!(
            result,
            PermissionResult::Allow {
                updated_input: Some(json!({"command": "ls -la"}))
            }
        );
    }

    #[tokio::test]
    async fn test_panic_denies() {
        let callback = PermissionCallback::from_fn(|_| panic!("broken"));
        assert!(!callback
            .decide(request("Bash"), Duration::from_secs(1))
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_timeout_denies() {
        let callback = PermissionCallback::new(|_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            PermissionResult::allow()
        });
        let result = callback.decide(request("Bash"), Duration::from_millis(20)).await;
        assert!(matches!(result, PermissionResult::Deny { message, .. } if message.contains("timed out")));
    }
}
