//! Demo handlers registered by `jobline run`.

use std::time::Duration;

use async_trait::async_trait;
use jobline_core::domain::HandlerError;
use jobline_core::typed::{Handler, InvocationContext};
use serde_json::{Value, json};
use tracing::info;

/// `echo(value)` returns its single argument.
pub struct Echo;

#[async_trait]
impl Handler<(Value,)> for Echo {
    async fn call(
        &self,
        (value,): (Value,),
        ctx: InvocationContext,
    ) -> Result<Value, HandlerError> {
        info!(dispatch_id = %ctx.dispatch_id, %value, "echo");
        Ok(value)
    }
}

/// `sleep(ms)` waits, giving up early if the pool is shutting down.
pub struct Sleep;

#[async_trait]
impl Handler<(u64,)> for Sleep {
    async fn call(&self, (ms,): (u64,), ctx: InvocationContext) -> Result<Value, HandlerError> {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
            _ = ctx.cancel.cancelled() => Err(HandlerError::Cancelled),
        }
    }
}
