//! Domain value types

mod task;

pub use task::{BatchEntry, Task, TaskStatus};
