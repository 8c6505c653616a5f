//! DispatcherBuilder - wiring and start-up validation.
//!
//! Everything that can be checked before the first pop is checked in
//! `build()`: the config, the presence of a queue, and that every function
//! the deployment expects has a handler.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::dispatcher::Dispatcher;
use crate::config::{ConfigError, DispatcherConfig};
use crate::domain::HandlerError;
use crate::observability::TracingSink;
use crate::ports::{OutcomeSink, TaskQueue};
use crate::typed::{DynHandler, Handler, HandlerRegistry, InvocationContext, RegistryError};

/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .queue(Arc::new(RedisTaskQueue::connect(url).await?))
///     .register("send_email", SendEmail)?
///     .expect_functions(&["send_email"])
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    registry: HandlerRegistry,
    queue: Option<Arc<dyn TaskQueue>>,
    sink: Option<Arc<dyn OutcomeSink>>,
    config: DispatcherConfig,
    expected_functions: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task queue configured")]
    MissingQueue,

    #[error("missing functions: {0:?}. These functions were expected but not registered.")]
    MissingFunctions(Vec<String>),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            queue: None,
            sink: None,
            config: DispatcherConfig::default(),
            expected_functions: None,
        }
    }

    pub fn register<A, H>(mut self, name: &str, handler: H) -> Result<Self, RegistryError>
    where
        A: DeserializeOwned + Send + 'static,
        H: Handler<A> + 'static,
    {
        self.registry.register::<A, H>(name, handler)?;
        Ok(self)
    }

    pub fn register_dyn(
        mut self,
        name: &str,
        handler: Arc<dyn DynHandler>,
    ) -> Result<Self, RegistryError> {
        self.registry.register_dyn(name, handler)?;
        Ok(self)
    }

    pub fn register_fn<F, Fut>(mut self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(Vec<Value>, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.registry.register_fn(name, f)?;
        Ok(self)
    }

    /// Replace the registry wholesale.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Functions that must be registered for `build()` to succeed.
    pub fn expect_functions(mut self, names: &[&str]) -> Self {
        self.expected_functions = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_functions {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingFunctions(missing));
            }
        }

        let queue = self.queue.ok_or(BuildError::MissingQueue)?;
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn OutcomeSink>);

        Ok(Dispatcher::new(
            queue,
            Arc::new(self.registry),
            sink,
            self.config,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::impls::InMemoryTaskQueue;
    use serde_json::json;

    type Noop = std::future::Ready<Result<Value, HandlerError>>;

    fn noop() -> impl Fn(Vec<Value>, InvocationContext) -> Noop + Send + Sync + 'static {
        |_, _| std::future::ready(Ok(json!(null)))
    }

    #[test]
    fn build_succeeds_when_all_expected_functions_are_registered() {
        let dispatcher = DispatcherBuilder::new()
            .queue(Arc::new(InMemoryTaskQueue::new()))
            .register_fn("a", noop())
            .unwrap()
            .register_fn("b", noop())
            .unwrap()
            .expect_functions(&["a", "b"])
            .build()
            .unwrap();
        assert_eq!(dispatcher.registry().names(), vec!["a", "b"]);
    }

    #[test]
    fn build_reports_missing_functions() {
        let result = DispatcherBuilder::new()
            .queue(Arc::new(InMemoryTaskQueue::new()))
            .register_fn("a", noop())
            .unwrap()
            .expect_functions(&["a", "b", "c"])
            .build();

        match result {
            Err(BuildError::MissingFunctions(missing)) => assert_eq!(missing, vec!["b", "c"]),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected MissingFunctions"),
        }
    }

    #[test]
    fn build_requires_a_queue() {
        let result = DispatcherBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingQueue)));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = DispatcherBuilder::new()
            .queue(Arc::new(InMemoryTaskQueue::new()))
            .config(DispatcherConfig {
                failure_policy: FailurePolicy::DeadLetter {
                    queue: "queue".into(),
                },
                ..DispatcherConfig::default()
            })
            .build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }
}
