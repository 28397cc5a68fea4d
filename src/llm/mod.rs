//! LLM Module
//!
//! The completion seam, its backends, and helpers for treating replies as
//! untrusted input.

mod provider;
pub mod json;

pub use json::{extract_json_array, extract_json_object};
pub use provider::{
    CompletionRequest, LLMProvider, OllamaProvider, OpenAICompatibleProvider, RateLimitedProvider,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::utils::{truncate_text, TruncationPolicy};

/// Run one completion under the request's timeout, aborting early on
/// cancellation. Transport failures come back classified, never panicking.
pub async fn complete_with_timeout(
    provider: &dyn LLMProvider,
    request: &CompletionRequest,
    cancel: &CancellationToken,
) -> PipelineResult<String> {
    debug!(
        "model call to {}: {}",
        request.model,
        truncate_text(&request.prompt, TruncationPolicy::Bytes(400))
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        outcome = tokio::time::timeout(request.timeout, provider.complete(request)) => match outcome {
            Err(_) => Err(PipelineError::Timeout(request.timeout)),
            Ok(Err(e)) => Err(PipelineError::Transport(format!("{:#}", e))),
            Ok(Ok(text)) => Ok(text),
        },
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Replays canned replies in order; `Err` entries simulate transport
    /// failures. Once exhausted, the last reply repeats.
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        last: Mutex<Option<std::result::Result<String, String>>>,
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        pub fn new(replies: Vec<std::result::Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub fn ok(replies: Vec<&str>) -> Self {
            Self::new(replies.into_iter().map(Ok).collect())
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().await.push(request.prompt.clone());
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            let next = self.replies.lock().await.pop_front();
            let reply = match next {
                Some(r) => {
                    *self.last.lock().await = Some(r.clone());
                    r
                }
                None => self
                    .last
                    .lock()
                    .await
                    .clone()
                    .unwrap_or_else(|| Err("no scripted reply".to_string())),
            };
            reply.map_err(|e| anyhow::anyhow!(e))
        }
    }
}
