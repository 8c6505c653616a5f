//! Handler traits.
//!
//! Two layers:
//! - `Handler<A>`: typed surface. `A` is bound from the positional argument
//!   array, so a tuple such as `(String, u64)` gives arity and type checks.
//! - `DynHandler`: object-safe surface stored in the registry. `TypedHandler`
//!   erases `A` by doing the binding itself.
//!
//! Closures can skip the typed layer through [`handler_fn`].

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::context::InvocationContext;
use crate::domain::HandlerError;

/// A typed task handler.
///
/// ```ignore
/// struct SendEmail;
///
/// #[async_trait]
/// impl Handler<(String, String)> for SendEmail {
///     async fn call(
///         &self,
///         (to, template): (String, String),
///         _ctx: InvocationContext,
///     ) -> Result<serde_json::Value, HandlerError> {
///         mailer::send(&to, &template).await.map_err(HandlerError::failed)?;
///         Ok(serde_json::Value::Null)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<A>: Send + Sync
where
    A: DeserializeOwned + Send + 'static,
{
    async fn call(
        &self,
        args: A,
        ctx: InvocationContext,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Object-safe handler, as stored in `HandlerRegistry`.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn invoke(
        &self,
        args: Vec<serde_json::Value>,
        ctx: InvocationContext,
    ) -> Result<serde_json::Value, HandlerError>;
}

pub struct TypedHandler<A, H> {
    handler: H,
    _marker: PhantomData<fn(A)>,
}

impl<A, H> TypedHandler<A, H>
where
    A: DeserializeOwned + Send + 'static,
    H: Handler<A>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, H> DynHandler for TypedHandler<A, H>
where
    A: DeserializeOwned + Send + 'static,
    H: Handler<A>,
{
    async fn invoke(
        &self,
        args: Vec<serde_json::Value>,
        ctx: InvocationContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let bound: A = serde_json::from_value(serde_json::Value::Array(args))
            .map_err(|e| HandlerError::Arguments(e.to_string()))?;
        self.handler.call(bound, ctx).await
    }
}

/// Adapter turning an async closure into a `DynHandler`.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` so it can be registered with `HandlerRegistry::register_fn`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<serde_json::Value>, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> DynHandler for FnHandler<F>
where
    F: Fn(Vec<serde_json::Value>, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    async fn invoke(
        &self,
        args: Vec<serde_json::Value>,
        ctx: InvocationContext,
    ) -> Result<serde_json::Value, HandlerError> {
        (self.f)(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DispatchId, FunctionName};
    use crate::typed::context::CancelSignal;
    use serde_json::json;

    struct Greet;

    #[async_trait]
    impl Handler<(String, u32)> for Greet {
        async fn call(
            &self,
            (name, times): (String, u32),
            _ctx: InvocationContext,
        ) -> Result<serde_json::Value, HandlerError> {
            Ok(json!(format!("hello {name}").repeat(times as usize)))
        }
    }

    fn ctx() -> InvocationContext {
        InvocationContext {
            dispatch_id: DispatchId::generate(),
            worker_id: 0,
            function_name: FunctionName::parse("greet").unwrap(),
            cancel: CancelSignal::never(),
        }
    }

    #[tokio::test]
    async fn typed_handler_binds_positional_arguments() {
        let handler = TypedHandler::new(Greet);
        let out = handler
            .invoke(vec![json!("bob"), json!(2)], ctx())
            .await
            .unwrap();
        assert_eq!(out, json!("hello bobhello bob"));
    }

    #[tokio::test]
    async fn arity_mismatch_is_an_argument_error() {
        let handler = TypedHandler::new(Greet);

        let too_few = handler.invoke(vec![json!("bob")], ctx()).await;
        assert!(matches!(too_few, Err(HandlerError::Arguments(_))));

        let too_many = handler
            .invoke(vec![json!("bob"), json!(1), json!(true)], ctx())
            .await;
        assert!(matches!(too_many, Err(HandlerError::Arguments(_))));
    }

    #[tokio::test]
    async fn type_mismatch_is_an_argument_error() {
        let handler = TypedHandler::new(Greet);
        let res = handler.invoke(vec![json!(1), json!("two")], ctx()).await;
        assert!(matches!(res, Err(HandlerError::Arguments(_))));
    }

    #[tokio::test]
    async fn closure_handler_receives_raw_arguments() {
        let handler = handler_fn(|args, _ctx| async move { Ok(json!(args.len())) });
        let out = handler.invoke(vec![json!(1), json!(2)], ctx()).await.unwrap();
        assert_eq!(out, json!(2));
    }
}
