//! App - アプリケーション層
//!
//! ports を組み合わせて dispatch を実装する。
//!
//! # 主要コンポーネント
//! - **DispatcherBuilder**: wiring と起動時検証
//! - **Dispatcher**: dispatch loop (pop → decode → lookup → invoke → report)
//! - **WorkerPool**: W 本の worker と shutdown
//! - **isolation**: handler の panic / error を閉じ込める
//! - **RetryPolicy**: queue エラー時の backoff

pub mod builder;
pub mod dead_letter;
pub mod dispatcher;
pub mod isolation;
pub mod pool;
pub mod retry;

pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::dead_letter::DeadLetter;
pub use self::dispatcher::Dispatcher;
pub use self::pool::{ShutdownHandle, WorkerPool};
pub use self::retry::RetryPolicy;
