//! Execution isolation: run one handler so that nothing it does escapes.
//!
//! The handler runs on its own tokio task. Its error, an argument binding
//! failure, or a panic all come back as `HandlerError`; the caller's loop
//! never unwinds. The task is tied to the caller: if the invoking future is
//! dropped (e.g. its worker is aborted), the handler task is aborted too.

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::domain::HandlerError;
use crate::typed::{DynHandler, InvocationContext};

/// Aborts the wrapped task when dropped. A no-op once the task has finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Invoke `handler` exactly once with `arguments`. No retry.
pub async fn invoke(
    handler: Arc<dyn DynHandler>,
    arguments: Vec<serde_json::Value>,
    ctx: InvocationContext,
) -> Result<serde_json::Value, HandlerError> {
    let mut task = AbortOnDrop(tokio::spawn(async move { handler.invoke(arguments, ctx).await }));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(HandlerError::Panicked(panic_message(err.into_panic()))),
        Err(err) => Err(HandlerError::failed(format!("handler task aborted: {err}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
