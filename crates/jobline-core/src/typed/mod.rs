//! Typed - handler API and wire codec.
//!
//! # Two layers
//! - **Typed**: `Handler<A>` binds positional arguments into `A`.
//! - **Dyn**: `DynHandler`, object-safe, stored in `HandlerRegistry`.

pub mod codec;
pub mod context;
pub mod handler;
pub mod registry;

pub use self::context::{CancelSignal, InvocationContext};
pub use self::handler::{DynHandler, FnHandler, Handler, TypedHandler, handler_fn};
pub use self::registry::{HandlerRegistry, RegistryError};
