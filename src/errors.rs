use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, PoolError>;

/// Ошибки уровня пула: возвращаются синхронно вызывающему коду
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("pool is closed for new submissions")]
    PoolClosed,

    #[error("worker pool must be created inside a tokio runtime")]
    NoRuntime,
}

/// Ошибка выполнения отдельной задачи. Никогда не покидает воркер,
/// видна только наблюдателю ошибок.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("action failed: {0}")]
    Failed(BoxError),

    #[error("action panicked: {0}")]
    Panicked(String),

    #[error("blocking action could not be joined: {0}")]
    JoinFailed(String),
}

impl TaskError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }

    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }
}

/// То, что получает наблюдатель: параметры задачи и причина сбоя
#[derive(Debug)]
pub struct TaskFailure {
    pub a: i64,
    pub b: i64,
    pub error: TaskError,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task ({}, {}) failed: {}", self.a, self.b, self.error)
    }
}
