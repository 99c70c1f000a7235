//! Fixed worker pool draining the dispatch queue. Each worker claims one
//! request at a time, drives it through the retry state machine, and hands
//! finished replies to the router. Final failures are silent: logged, never
//! surfaced in the channel.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use banter_core::config::DispatchConfig;
use banter_core::domain::request::{Endpoint, PendingRequest, RequestState};
use banter_core::errors::GenerationError;

use crate::context::ContextStore;
use crate::llm::GenerationClient;
use crate::queue::DispatchReceiver;
use crate::router::ResponseRouter;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.backoff_base_ms,
            max_delay_ms: config.backoff_max_ms.max(config.backoff_base_ms),
        }
    }

    /// Exponential backoff with jitter. `attempt` counts completed tries,
    /// so the first retry waits roughly the base delay.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        let jitter = if delay_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=delay_ms / 4) };
        Duration::from_millis(delay_ms + jitter)
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a fixed number of workers over the shared claim side of the
    /// queue. The pool never grows or shrinks afterwards.
    pub fn spawn(
        worker_count: usize,
        receiver: DispatchReceiver,
        client: Arc<dyn GenerationClient>,
        router: Arc<ResponseRouter>,
        store: Arc<ContextStore>,
        policy: RetryPolicy,
        cooldown: Duration,
    ) -> Self {
        let mut handles = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let client = client.clone();
            let router = router.clone();
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                info!(worker_id, "dispatch worker started");
                while let Some(request) = receiver.recv().await {
                    if store.in_cooldown(&request.conversation, cooldown).await {
                        debug!(
                            request_id = %request.id,
                            conversation = %request.conversation.label(),
                            "dropping request claimed inside cooldown"
                        );
                        continue;
                    }
                    process_request(request, client.as_ref(), &router, policy).await;
                }
                info!(worker_id, "dispatch worker stopped, queue closed");
            }));
        }
        Self { handles }
    }

    pub fn handles(&self) -> &[JoinHandle<()>] {
        &self.handles
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Drive one request to a terminal state. The search fallback rebuilds the
/// request against the plain endpoint and consumes an attempt slot like any
/// other retry.
pub async fn process_request(
    mut request: PendingRequest,
    client: &dyn GenerationClient,
    router: &ResponseRouter,
    policy: RetryPolicy,
) {
    loop {
        if request.transition_to(RequestState::Claimed).is_err() {
            warn!(request_id = %request.id, state = request.state.as_str(), "unclaimable request");
            return;
        }
        request.attempt += 1;

        match client.generate(&request.payload, request.endpoint).await {
            Ok(reply) => {
                if request.transition_to(RequestState::Succeeded).is_err() {
                    return;
                }
                router.deliver(&request, &reply).await;
                return;
            }
            Err(error) => {
                let attempts_left = request.attempt < policy.max_attempts;
                match error {
                    GenerationError::SearchUnavailable(ref reason)
                        if request.endpoint == Endpoint::SearchCompletion && attempts_left =>
                    {
                        debug!(
                            request_id = %request.id,
                            reason,
                            "search endpoint unavailable, falling back to plain completion"
                        );
                        request.endpoint = Endpoint::Completion;
                        if request.transition_to(RequestState::Retrying).is_err() {
                            return;
                        }
                        // Fallback retries immediately; no backoff.
                    }
                    GenerationError::Transient(ref reason) if attempts_left => {
                        debug!(
                            request_id = %request.id,
                            attempt = request.attempt,
                            reason,
                            "transient failure, backing off before retry"
                        );
                        if request.transition_to(RequestState::Retrying).is_err() {
                            return;
                        }
                        tokio::time::sleep(policy.backoff(request.attempt)).await;
                    }
                    _ => {
                        let _ = request.transition_to(RequestState::FailedFinal);
                        warn!(
                            request_id = %request.id,
                            conversation = %request.conversation.label(),
                            attempt = request.attempt,
                            %error,
                            "request failed for good, staying silent"
                        );
                        return;
                    }
                }
            }
        }
    }
}
