//! Dispatcher - the dispatch loop.
//!
//! One worker runs `run_worker`:
//!
//! ```text
//! Idle ──pop(timeout)──> Processing ──decode→lookup→invoke→report──> Idle
//!   ^                                                                  |
//!   └──────────────── timeout: re-poll, nothing else ──────────────────┘
//! ```
//!
//! Every per-task failure ends the iteration, never the loop. Only repeated
//! queue errors end a worker.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::dead_letter::DeadLetter;
use super::isolation;
use super::retry::RetryPolicy;
use crate::config::{DispatcherConfig, FailurePolicy};
use crate::domain::{
    DispatchError, DispatchId, DispatchOutcome, DispatchRecord, QueueError, preview_payload,
    summarize_arguments,
};
use crate::observability::{DispatchCounts, DispatchStats};
use crate::ports::{OutcomeSink, RawPayload, TaskQueue};
use crate::typed::{CancelSignal, HandlerRegistry, InvocationContext, codec};

pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    registry: Arc<HandlerRegistry>,
    sink: Arc<dyn OutcomeSink>,
    config: DispatcherConfig,
    retry: RetryPolicy,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        registry: Arc<HandlerRegistry>,
        sink: Arc<dyn OutcomeSink>,
        config: DispatcherConfig,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            queue,
            registry,
            sink,
            config,
            retry,
            stats: DispatchStats::default(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    /// Run one iteration on an already-popped payload: decode, resolve,
    /// invoke, report. Never fails; every problem becomes the outcome.
    pub async fn dispatch_one(
        &self,
        worker_id: usize,
        payload: &[u8],
        cancel: CancelSignal,
    ) -> DispatchOutcome {
        let dispatch_id = DispatchId::generate();
        let outcome = self.execute(dispatch_id, worker_id, payload, cancel).await;

        self.stats.record_outcome(outcome.kind());
        let record = DispatchRecord::new(dispatch_id, worker_id, outcome);
        self.sink.record(&record);

        if !record.outcome.is_success() {
            self.apply_failure_policy(&record, payload).await;
        }
        record.outcome
    }

    async fn execute(
        &self,
        dispatch_id: DispatchId,
        worker_id: usize,
        payload: &[u8],
        cancel: CancelSignal,
    ) -> DispatchOutcome {
        let task = match codec::decode(payload) {
            Ok(task) => task,
            Err(error) => {
                return DispatchOutcome::DecodeFailure {
                    error,
                    payload_preview: preview_payload(payload),
                };
            }
        };

        let (function_name, arguments) = task.into_parts();
        debug!(worker_id, %dispatch_id, function_name = function_name.as_str(), "got task");

        let Some(handler) = self.registry.lookup(function_name.as_str()) else {
            return DispatchOutcome::HandlerNotFound { function_name };
        };

        let summary = summarize_arguments(&arguments);
        let ctx = InvocationContext {
            dispatch_id,
            worker_id,
            function_name: function_name.clone(),
            cancel,
        };

        let started = Instant::now();
        let result = isolation::invoke(handler, arguments, ctx).await;
        let duration = started.elapsed();

        match result {
            Ok(value) => DispatchOutcome::Success {
                function_name,
                value,
                duration,
            },
            Err(error) => DispatchOutcome::HandlerFailure {
                function_name,
                arguments: summary,
                error,
                duration,
            },
        }
    }

    async fn apply_failure_policy(&self, record: &DispatchRecord, payload: &[u8]) {
        let FailurePolicy::DeadLetter { queue } = &self.config.failure_policy else {
            return;
        };

        let letter = DeadLetter::from_record(record, payload);
        let bytes = match letter.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    dispatch_id = %record.dispatch_id,
                    error = %e,
                    "could not encode dead letter"
                );
                return;
            }
        };
        if let Err(e) = self.queue.push(queue, bytes).await {
            warn!(
                dispatch_id = %record.dispatch_id,
                dead_letter_queue = queue.as_str(),
                error = %e,
                "failed to push dead letter"
            );
        }
    }

    /// The dispatch loop for one worker. Returns `Ok(())` on shutdown, or
    /// `DispatchError::Infrastructure` once queue errors exhaust the retry
    /// budget.
    pub async fn run_worker(
        &self,
        worker_id: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DispatchError> {
        let queue_name = self.config.queue_name.as_str();
        let pop_timeout = self.config.pop_timeout();
        let cancel = CancelSignal::new(shutdown.clone());
        let mut consecutive_failures: u32 = 0;

        info!(worker_id, queue = queue_name, "worker started");

        loop {
            // shutdown は iteration の境目でだけ見る
            if *shutdown.borrow() {
                break;
            }

            let popped = if self.queue.pop_is_cancel_safe() {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    popped = self.queue.blocking_pop(queue_name, pop_timeout) => popped,
                }
            } else {
                self.queue.blocking_pop(queue_name, pop_timeout).await
            };

            match popped {
                Ok(None) => {
                    consecutive_failures = 0;
                    self.stats.record_idle_poll();
                    trace!(worker_id, "idle");
                }
                Ok(Some(payload)) => {
                    consecutive_failures = 0;
                    self.process(worker_id, payload, &cancel).await;
                }
                Err(err) => {
                    consecutive_failures += 1;
                    self.stats.record_queue_error();
                    if self.retry.is_exhausted(consecutive_failures) {
                        error!(
                            worker_id,
                            attempts = consecutive_failures,
                            error = %err,
                            "queue unusable, giving up"
                        );
                        return Err(DispatchError::Infrastructure {
                            worker_id,
                            attempts: consecutive_failures,
                            source: err,
                        });
                    }
                    if !self.back_off(worker_id, consecutive_failures, &err, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(worker_id, "worker stopped");
        Ok(())
    }

    async fn process(&self, worker_id: usize, payload: RawPayload, cancel: &CancelSignal) {
        // handler が返るまで次の pop はしない
        self.dispatch_one(worker_id, &payload, cancel.clone()).await;
    }

    /// Sleep before the next pop attempt. Returns `false` if shutdown was
    /// requested (or its sender dropped) while waiting.
    async fn back_off(
        &self,
        worker_id: usize,
        attempt: u32,
        err: &QueueError,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = self.retry.jittered_delay(attempt);
        warn!(
            worker_id,
            attempt,
            max_attempts = self.retry.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "queue error, backing off"
        );
        tokio::select! {
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerError, OutcomeKind};
    use crate::impls::{InMemoryTaskQueue, RecordingSink};
    use crate::typed::handler_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        queue: Arc<InMemoryTaskQueue>,
        sink: Arc<RecordingSink>,
        dispatcher: Dispatcher,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(config: DispatcherConfig) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .register_dyn(
                "echo",
                Arc::new(handler_fn({
                    let calls = calls.clone();
                    move |args, _| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move { Ok(args.into_iter().next().unwrap_or_default()) }
                    }
                })),
            )
            .unwrap();
        registry
            .register_dyn(
                "fail",
                Arc::new(handler_fn(|_, _| async { Err(HandlerError::failed("nope")) })),
            )
            .unwrap();

        let queue = Arc::new(InMemoryTaskQueue::new());
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(queue.clone(), Arc::new(registry), sink.clone(), config);
        Fixture {
            queue,
            sink,
            dispatcher,
            calls,
        }
    }

    #[tokio::test]
    async fn registered_handler_is_invoked_once_with_arguments() {
        let f = fixture(DispatcherConfig::default());
        let outcome = f
            .dispatcher
            .dispatch_one(0, br#"{"func":"echo","args":["hi", 2]}"#, CancelSignal::never())
            .await;

        assert!(matches!(
            &outcome,
            DispatchOutcome::Success { value, .. } if *value == json!("hi")
        ));
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.sink.kinds(), vec![OutcomeKind::Success]);
    }

    #[tokio::test]
    async fn unregistered_function_is_not_found_and_nothing_runs() {
        let f = fixture(DispatcherConfig::default());
        let outcome = f
            .dispatcher
            .dispatch_one(0, br#"{"func":"g"}"#, CancelSignal::never())
            .await;

        assert!(matches!(
            &outcome,
            DispatchOutcome::HandlerNotFound { function_name } if function_name.as_str() == "g"
        ));
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_failure() {
        let f = fixture(DispatcherConfig::default());
        let outcome = f
            .dispatcher
            .dispatch_one(0, b"not-json", CancelSignal::never())
            .await;
        assert_eq!(outcome.kind(), OutcomeKind::DecodeFailure);
        assert_eq!(f.dispatcher.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn handler_failure_carries_detail_and_arguments() {
        let f = fixture(DispatcherConfig::default());
        let outcome = f
            .dispatcher
            .dispatch_one(0, br#"{"func":"fail","args":[1,"x"]}"#, CancelSignal::never())
            .await;

        match outcome {
            DispatchOutcome::HandlerFailure {
                function_name,
                arguments,
                error,
                ..
            } => {
                assert_eq!(function_name.as_str(), "fail");
                assert_eq!(arguments, r#"[1,"x"]"#);
                assert_eq!(error, HandlerError::Failed("nope".into()));
            }
            other => panic!("expected HandlerFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drop_policy_pushes_nothing() {
        let f = fixture(DispatcherConfig::default());
        f.dispatcher
            .dispatch_one(0, br#"{"func":"missing"}"#, CancelSignal::never())
            .await;
        assert!(f.queue.is_empty("queue:dead").await);
        assert!(f.queue.is_empty("queue").await);
    }

    #[tokio::test]
    async fn dead_letter_policy_pushes_failed_tasks_only() {
        let f = fixture(DispatcherConfig {
            failure_policy: FailurePolicy::DeadLetter {
                queue: "queue:dead".into(),
            },
            ..DispatcherConfig::default()
        });

        f.dispatcher
            .dispatch_one(0, br#"{"func":"echo","args":[1]}"#, CancelSignal::never())
            .await;
        f.dispatcher
            .dispatch_one(0, br#"{"func":"missing"}"#, CancelSignal::never())
            .await;
        f.dispatcher
            .dispatch_one(0, b"{oops", CancelSignal::never())
            .await;

        let letters: Vec<DeadLetter> = f
            .queue
            .snapshot("queue:dead")
            .await
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].event, OutcomeKind::HandlerNotFound);
        assert_eq!(letters[0].payload, r#"{"func":"missing"}"#);
        assert_eq!(letters[1].event, OutcomeKind::DecodeFailure);
        assert_eq!(letters[1].payload, "{oops");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_re_polls_on_timeout_and_stops_on_shutdown() {
        let f = fixture(DispatcherConfig {
            pop_timeout_ms: 1_000,
            ..DispatcherConfig::default()
        });
        let dispatcher = Arc::new(f.dispatcher);
        let (tx, rx) = watch::channel(false);

        let worker = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run_worker(0, rx).await }
        });

        // Three full timeouts pass with an empty queue.
        tokio::time::sleep(std::time::Duration::from_millis(3_500)).await;
        assert_eq!(dispatcher.stats().idle_polls, 3);
        assert_eq!(dispatcher.stats().dispatched(), 0);

        tx.send(true).unwrap();
        worker.await.unwrap().unwrap();
    }
}
