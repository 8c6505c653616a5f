//! WorkerPool - runs `workers` dispatch loops against one dispatcher.
//!
//! Each worker holds at most one task, so W workers cap in-flight handlers at
//! W. Shutdown is a `watch` flag; a worker finishes its current task first.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use crate::domain::DispatchError;

/// Cloneable trigger for a pool's shutdown, e.g. for a signal handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        // receiver が全部落ちていても問題ない
        let _ = self.tx.send(true);
    }
}

pub struct WorkerPool {
    shutdown_tx: Arc<watch::Sender<bool>>,
    workers: JoinSet<Result<(), DispatchError>>,
}

impl WorkerPool {
    /// Spawn `dispatcher.config().workers` workers.
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let n = dispatcher.config().workers;

        let mut workers = JoinSet::new();
        for worker_id in 0..n {
            let dispatcher = Arc::clone(&dispatcher);
            let rx = shutdown_rx.clone();
            workers.spawn(async move { dispatcher.run_worker(worker_id, rx).await });
        }

        info!(workers = n, queue = dispatcher.config().queue_name.as_str(), "worker pool started");
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            workers,
        }
    }

    /// Stop taking new tasks. In-flight handlers run to completion.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Wait for every worker to stop.
    ///
    /// The first fatal worker error shuts the rest of the pool down and is
    /// returned once they have all stopped.
    pub async fn wait(mut self) -> Result<(), DispatchError> {
        let mut first_error: Option<DispatchError> = None;

        while let Some(joined) = self.workers.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => DispatchError::WorkerAborted {
                    detail: join_err.to_string(),
                },
            };
            error!(error = %err, "worker ended abnormally, stopping pool");
            let _ = self.shutdown_tx.send(true);
            first_error.get_or_insert(err);
        }

        info!("worker pool stopped");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Request shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) -> Result<(), DispatchError> {
        self.request_shutdown();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::impls::{InMemoryTaskQueue, RecordingSink};
    use crate::ports::TaskQueue;
    use crate::typed::{HandlerRegistry, handler_fn};
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher(
        queue: Arc<InMemoryTaskQueue>,
        sink: Arc<RecordingSink>,
        workers: usize,
    ) -> Arc<Dispatcher> {
        let mut registry = HandlerRegistry::new();
        registry
            .register_dyn("echo", Arc::new(handler_fn(|args, _| async move { Ok(json!(args)) })))
            .unwrap();
        let config = DispatcherConfig {
            workers,
            pop_timeout_ms: 50,
            ..DispatcherConfig::default()
        };
        Arc::new(Dispatcher::new(queue, Arc::new(registry), sink, config))
    }

    #[tokio::test]
    async fn drains_the_queue_then_shuts_down_cleanly() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let sink = Arc::new(RecordingSink::new());
        for i in 0..10 {
            let payload = format!(r#"{{"func":"echo","args":[{i}]}}"#);
            queue.push("queue", payload.into_bytes()).await.unwrap();
        }

        let pool = WorkerPool::spawn(dispatcher(queue.clone(), sink.clone(), 3));
        while sink.len() < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        pool.shutdown_and_join().await.unwrap();
        assert!(queue.is_empty("queue").await);
        assert_eq!(sink.len(), 10);
    }

    #[tokio::test]
    async fn shutdown_handle_stops_idle_workers() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let sink = Arc::new(RecordingSink::new());
        let pool = WorkerPool::spawn(dispatcher(queue, sink.clone(), 2));

        pool.shutdown_handle().request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), pool.wait())
            .await
            .expect("pool did not stop")
            .unwrap();
        assert!(sink.is_empty());
    }
}
