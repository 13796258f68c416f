//! # dog-tasks: bounded background task execution
//!
//! A small task manager for long-running work such as file transfers:
//!
//! - **Bounded concurrency**: a fixed number of execution slots, never exceeded
//! - **Fair admission**: tasks that find every slot busy start in submission order
//! - **Dense identifiers**: a monotonic counter hands out `1, 2, 3, ...`
//! - **Cooperative cancellation**: every task owns its own `CancellationToken`
//! - **Inspection**: state, progress and the error of failed tasks stay queryable
//!   until explicitly cleared
//!
//! ```rust
//! use dog_tasks::{Task, TaskManager, TaskState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = TaskManager::with_max_workers(3);
//!
//! let handle = manager
//!     .submit(Task::new("index photos", |ctx| async move {
//!         for step in 0..10 {
//!             if ctx.is_cancelled() {
//!                 return Err("stopped");
//!             }
//!             ctx.set_progress(step as f64 * 10.0);
//!         }
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! assert!(matches!(handle.wait().await, TaskState::Completed { .. }));
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod observability;
pub mod task;
pub mod types;

pub use config::TaskManagerConfig;
pub use error::{BoxError, TaskError, TaskResult};
pub use manager::{BoxStream, TaskManager};
pub use observability::TaskStats;
pub use task::{Task, TaskContext, TaskHandle};
pub use types::{TaskEvent, TaskId, TaskInfo, TaskState};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

pub use tokio_util::sync::CancellationToken;

/// Convenient imports
pub mod prelude {
    pub use crate::{
        CancellationToken, Task, TaskContext, TaskError, TaskHandle, TaskId, TaskManager,
        TaskManagerConfig, TaskResult, TaskState,
    };
}
