//! Пул воркеров фиксированной ширины поверх tokio
//!
//! # Features
//! - FIFO очередь задач с параметрами `(a, b)`
//! - Не больше `width` задач выполняется одновременно
//! - Ошибки и паники задач изолированы в воркере и уходят наблюдателю
//! - Shutdown: Running -> Draining -> Terminated, ожидание с таймаутом
//! - Синхронные (через blocking-потоки) и асинхронные действия

pub mod errors;
pub mod model;
pub mod pool;
pub mod task;

pub use errors::{BoxError, PoolError, TaskError, TaskFailure};
pub use model::{PoolMetrics, PoolState};
pub use pool::{Config, FailureObserver, Pool, WorkerPool, DEFAULT_WIDTH_MARGIN};
