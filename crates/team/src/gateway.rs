//! Gateway client.
//!
//! Wraps an [`LlmGateway`] with a per-call timeout and a bounded retry budget,
//! and turns whatever comes back into an [`ActionOutcome`] plus the usage of
//! every attempt. Retries happen inside one action invocation, so an action
//! still produces exactly one ledger entry.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    normalize_text, ActionOutcome, ExecutionConfig, GatewayError, LlmGateway, RetryPolicy,
    TokenUsage,
};
use tracing::{debug, warn};

/// Upper bound for a single back-off sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// What one action got out of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    /// Normalised completion, or `Failed` when every attempt failed.
    pub outcome: ActionOutcome,
    /// Usage summed over all attempts.
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// A shared gateway plus the call budget applied to it.
#[derive(Clone)]
pub struct GatewayClient {
    gateway: Arc<dyn LlmGateway>,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway", &self.gateway.describe())
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl GatewayClient {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        timeout: Duration,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            gateway,
            timeout,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(gateway: Arc<dyn LlmGateway>, execution: &ExecutionConfig) -> Self {
        Self::new(
            gateway,
            execution.call_timeout(),
            execution.max_attempts,
            execution.retry_backoff(),
        )
    }

    /// Asks the gateway, retrying retryable failures.
    ///
    /// Never fails: when the budget is exhausted, or the failure is not
    /// retryable, the reply is `Failed` with the usage consumed so far
    /// (`Unavailable` zero usage when nothing was reported).
    pub async fn ask(&self, prompt: &str) -> GatewayReply {
        let mut consumed: Option<TokenUsage> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.timeout, self.gateway.ask(prompt)).await {
                Ok(Ok(completion)) => {
                    let usage = completion
                        .usage
                        .unwrap_or_else(|| TokenUsage::estimated(prompt, &completion.text));
                    let usage = consumed.map(|c| c.combine(usage)).unwrap_or(usage);
                    debug!(
                        attempt,
                        input_tokens = usage.input_tokens.as_u64(),
                        output_tokens = usage.output_tokens.as_u64(),
                        "LLM call completed"
                    );
                    return GatewayReply {
                        outcome: normalize_text(&completion.text),
                        usage,
                        attempts: attempt,
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Timeout(self.timeout),
            };

            if let Some(usage) = error.consumed_usage() {
                consumed = Some(consumed.map(|c| c.combine(usage)).unwrap_or(usage));
            }

            let delay = match error.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < self.max_attempts => {
                    after.unwrap_or_else(|| self.backoff_for(attempt))
                }
                _ => {
                    warn!(
                        attempt,
                        gateway = %self.gateway.describe(),
                        error = %error,
                        "LLM call failed"
                    );
                    return GatewayReply {
                        outcome: ActionOutcome::Failed(error.to_string()),
                        usage: consumed.unwrap_or_else(TokenUsage::unavailable),
                        attempts: attempt,
                    };
                }
            };

            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "LLM call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Exponential back-off: `backoff * 2^(attempt - 1)`, capped.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}
