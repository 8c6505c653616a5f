//! HandlerRegistry - function name → handler.
//!
//! Built once during start-up (mutable), then frozen behind an `Arc` and read
//! concurrently by every worker without locking.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::InvocationContext;
use super::handler::{DynHandler, Handler, TypedHandler, handler_fn};
use crate::domain::{FunctionName, HandlerError, InvalidFunctionName};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for function '{0}' is already registered")]
    AlreadyRegistered(FunctionName),

    #[error("invalid function name: {0}")]
    InvalidName(#[from] InvalidFunctionName),
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<FunctionName, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler; `A` is the positional argument shape.
    pub fn register<A, H>(&mut self, name: &str, handler: H) -> Result<(), RegistryError>
    where
        A: DeserializeOwned + Send + 'static,
        H: Handler<A> + 'static,
    {
        self.register_dyn(name, Arc::new(TypedHandler::new(handler)))
    }

    /// Register an already type-erased handler (e.g. from [`super::handler_fn`]).
    pub fn register_dyn(
        &mut self,
        name: &str,
        handler: Arc<dyn DynHandler>,
    ) -> Result<(), RegistryError> {
        let name = FunctionName::parse(name)?;
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Register an async closure over the raw positional arguments.
    pub fn register_fn<F, Fut>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Vec<Value>, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register_dyn(name, Arc::new(handler_fn(f)))
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .keys()
            .map(|n| n.as_str().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
