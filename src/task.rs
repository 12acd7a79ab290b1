use super::errors::{BoxError, TaskError};
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
};
use futures::FutureExt;


pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

type BlockingAction = Box<dyn FnOnce(i64, i64) -> Result<(), BoxError> + Send + 'static>;
type AsyncAction = Box<dyn FnOnce(i64, i64) -> TaskFuture + Send + 'static>;

enum Action {
    Blocking(BlockingAction),
    Async(AsyncAction),
}

/// Единица работы: пара параметров, захваченная по значению, и действие.
/// После выполнения (успешного или нет) выбрасывается, результат не хранится.
pub struct WorkItem {
    a: i64,
    b: i64,
    action: Action,
}

impl WorkItem {
    pub fn blocking<F, E>(a: i64, b: i64, action: F) -> Self
    where
        F: FnOnce(i64, i64) -> Result<(), E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            a,
            b,
            action: Action::Blocking(Box::new(move |a, b| -> Result<(), BoxError> {
                action(a, b).map_err(Into::into)
            })),
        }
    }

    pub fn with_async<F, Fut, E>(a: i64, b: i64, action: F) -> Self
    where
        F: FnOnce(i64, i64) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            a,
            b,
            action: Action::Async(Box::new(move |a, b| -> TaskFuture {
                Box::pin(async move { action(a, b).await.map_err(Into::<BoxError>::into) })
            })),
        }
    }

    #[inline]
    pub fn params(&self) -> (i64, i64) {
        (self.a, self.b)
    }

    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self.action, Action::Blocking(_))
    }

    /// Выполняет действие. Ошибка и паника одинаково превращаются в `TaskError`
    /// и дальше этой границы не уходят.
    pub async fn run(self) -> Result<(), TaskError> {
        let WorkItem { a, b, action } = self;
        match action {
            Action::Blocking(f) => {
                let joined = tokio::task::spawn_blocking(move || {
                    std::panic::catch_unwind(AssertUnwindSafe(move || f(a, b)))
                })
                .await;

                match joined {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(e))) => Err(TaskError::Failed(e)),
                    Ok(Err(panic_info)) => Err(TaskError::from_panic(panic_info)),
                    Err(join_err) => Err(TaskError::JoinFailed(join_err.to_string())),
                }
            }
            Action::Async(f) => {
                // вызов f(a, b) тоже внутри catch_unwind: паника до первого await
                match AssertUnwindSafe(async move { f(a, b).await })
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(TaskError::Failed(e)),
                    Err(panic_info) => Err(TaskError::from_panic(panic_info)),
                }
            }
        }
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("a", &self.a)
            .field("b", &self.b)
            .field("blocking", &self.is_blocking())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_error_is_captured() {
        let item = WorkItem::blocking(1, 2, |a, b| {
            if a < b {
                return Err(format!("{a} < {b}"));
            }
            Ok(())
        });
        assert_eq!(item.params(), (1, 2));
        match item.run().await {
            Err(TaskError::Failed(e)) => assert_eq!(e.to_string(), "1 < 2"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn async_panic_before_first_await_is_captured() {
        let item = WorkItem::with_async(3, 4, |a, _b| {
            if a == 3 {
                panic!("boom at {}", a);
            }
            async { Ok::<(), BoxError>(()) }
        });
        let err = item.run().await.unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("boom at 3"));
    }
}
