//! jobline-core
//!
//! Queue-backed job dispatcher: workers pop JSON task descriptors from a
//! shared queue, resolve the named function in a registry and run it in
//! isolation.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（FunctionName, TaskDescriptor, DispatchOutcome, errors）
//! - **ports**: 抽象化レイヤー（TaskQueue, OutcomeSink）
//! - **typed**: Handler API, HandlerRegistry, wire codec
//! - **app**: Dispatcher, WorkerPool, DispatcherBuilder
//! - **impls**: 実装（InMemoryTaskQueue, RedisTaskQueue, RecordingSink）
//! - **config**: TOML 設定
//! - **observability**: logging と outcome の tracing 出力

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{Dispatcher, DispatcherBuilder, WorkerPool};
pub use config::{DispatcherConfig, FailurePolicy};
