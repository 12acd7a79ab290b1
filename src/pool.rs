use super::{
    errors::{BoxError, PoolError, Result, TaskFailure},
    model::{PoolMetrics, PoolState},
    task::WorkItem,
};
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::deque::{Injector, Steal};
use tokio::{
    sync::Notify,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};


/// Запас поверх числа ядер, чтобы коротко блокирующиеся задачи не голодали
pub const DEFAULT_WIDTH_MARGIN: usize = 2;

pub type FailureObserver = Arc<dyn Fn(&TaskFailure) + Send + Sync + 'static>;

/// Конфигурация пула
#[derive(Clone)]
pub struct Config {
    pub width: usize,
    pub on_failure: FailureObserver,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: num_cpus::get() + DEFAULT_WIDTH_MARGIN,
            on_failure: Arc::new(log_failure),
        }
    }
}

impl Config {
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            ..Default::default()
        }
    }

    /// Наблюдатель вызывается синхронно на воркере для каждой упавшей задачи
    pub fn on_failure<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.on_failure = Arc::new(observer);
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("width", &self.width)
            .finish_non_exhaustive()
    }
}

fn log_failure(failure: &TaskFailure) {
    warn!(a = failure.a, b = failure.b, error = %failure.error, "task failed");
}


// Состояние и число незавершенных задач в одном слове:
// два младших бита - флаги, остальное - счетчик.
const DRAINING: usize = 0b01;
const TERMINATED: usize = 0b10;
const FLAGS: usize = DRAINING | TERMINATED;
const COUNT_SHIFT: u32 = 2;
const ONE_TASK: usize = 1 << COUNT_SHIFT;

#[inline(always)]
fn outstanding_of(word: usize) -> usize {
    word >> COUNT_SHIFT
}

pub type Pool = Arc<WorkerPool>;

/// Пул фиксированной ширины: `width` воркеров разбирают общую FIFO очередь.
///
/// Пул держится в `Arc`, воркеры хранят свои копии до завершения, поэтому
/// для освобождения ресурсов нужно вызвать `shutdown`.
pub struct WorkerPool {
    inject: Injector<WorkItem>,
    notify: Notify,
    terminated: CancellationToken,
    lifecycle: AtomicUsize,
    width: usize,
    idle_workers: AtomicUsize,
    active_tasks: AtomicUsize,
    queued_tasks: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    on_failure: FailureObserver,
}

impl WorkerPool {
    pub fn new(width: usize) -> Result<Pool> {
        Self::with_config(Config::with_width(width))
    }

    pub fn with_config(config: Config) -> Result<Pool> {
        if config.width == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "width must be greater than zero".into(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let pool = Arc::new(WorkerPool {
            inject: Injector::new(),
            notify: Notify::new(),
            terminated: CancellationToken::new(),
            lifecycle: AtomicUsize::new(0),
            width: config.width,
            idle_workers: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            on_failure: config.on_failure,
        });

        // Запускаем воркеры
        for worker_id in 0..pool.width {
            let pool_clone = pool.clone();
            runtime.spawn(async move {
                pool_clone.worker_loop(worker_id).await;
            });
        }

        debug!(width = pool.width, "worker pool started");
        Ok(pool)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn state(&self) -> PoolState {
        let word = self.lifecycle.load(Ordering::Acquire);
        if word & TERMINATED != 0 {
            PoolState::Terminated
        } else if word & DRAINING != 0 {
            PoolState::Draining
        } else {
            PoolState::Running
        }
    }

    /// Ставит в очередь синхронное действие. Оно выполняется на
    /// blocking-потоке tokio, воркер ждет его завершения.
    pub fn submit<F, E>(&self, a: i64, b: i64, action: F) -> Result<()>
    where
        F: FnOnce(i64, i64) -> std::result::Result<(), E> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.push_item(WorkItem::blocking(a, b, action))
    }

    /// Ставит в очередь асинхронное действие, воркер выполняет его сам
    pub fn submit_async<F, Fut, E>(&self, a: i64, b: i64, action: F) -> Result<()>
    where
        F: FnOnce(i64, i64) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.push_item(WorkItem::with_async(a, b, action))
    }

    fn push_item(&self, item: WorkItem) -> Result<()> {
        // проверка состояния и учет задачи - одна атомарная операция
        self.lifecycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                if word & FLAGS != 0 {
                    None
                } else {
                    Some(word + ONE_TASK)
                }
            })
            .map_err(|_| PoolError::PoolClosed)?;

        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        let (a, b) = item.params();
        trace!(a, b, "task queued");
        self.inject.push(item);
        self.notify.notify_one();
        Ok(())
    }

    fn pop_item(&self) -> Option<WorkItem> {
        loop {
            match self.inject.steal() {
                Steal::Success(item) => {
                    self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    return Some(item);
                }
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    async fn worker_loop(&self, worker_id: usize) {
        trace!(worker_id, "worker started");

        loop {
            if let Some(item) = self.pop_item() {
                // передаем эстафету, пока этот воркер занят
                if !self.inject.is_empty() {
                    self.notify.notify_one();
                }
                self.execute(worker_id, item).await;
                continue;
            }

            self.idle_workers.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                _ = self.notify.notified() => {
                    self.idle_workers.fetch_sub(1, Ordering::Relaxed);
                }
                _ = self.terminated.cancelled() => {
                    self.idle_workers.fetch_sub(1, Ordering::Relaxed);
                    break;
                }
            }
        }

        trace!(worker_id, "worker stopped");
    }

    async fn execute(&self, worker_id: usize, item: WorkItem) {
        let (a, b) = item.params();
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
        let outcome = item.run().await;
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
                trace!(worker_id, a, b, "task completed");
            }
            Err(error) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                self.report_failure(worker_id, TaskFailure { a, b, error });
            }
        }

        self.finish_one();
    }

    fn report_failure(&self, worker_id: usize, failure: TaskFailure) {
        let observer = self.on_failure.as_ref();
        if std::panic::catch_unwind(AssertUnwindSafe(|| observer(&failure))).is_err() {
            error!(worker_id, a = failure.a, b = failure.b, "failure observer panicked");
        }
    }

    fn finish_one(&self) {
        let prev = self.lifecycle.fetch_sub(ONE_TASK, Ordering::AcqRel);
        if prev & DRAINING != 0 && outstanding_of(prev) == 1 {
            self.terminate();
        }
    }

    fn terminate(&self) {
        self.lifecycle.fetch_or(TERMINATED, Ordering::AcqRel);
        self.terminated.cancel();
        debug!("worker pool terminated");
    }

    /// Running -> Draining. Новые задачи отклоняются, принятые дорабатывают.
    /// Повторный вызов ничего не делает.
    pub fn shutdown(&self) {
        let prev = match self.lifecycle.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            if word & DRAINING != 0 {
                None
            } else {
                Some(word | DRAINING)
            }
        }) {
            Ok(prev) => prev,
            Err(_) => return,
        };

        debug!(outstanding = outstanding_of(prev), "worker pool draining");
        if outstanding_of(prev) == 0 {
            self.terminate();
        }
    }

    /// Ждет перехода в Terminated. Возвращает false по таймауту,
    /// незавершенные задачи при этом не отменяются.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let terminated = tokio::time::timeout(timeout, self.terminated.cancelled())
            .await
            .is_ok();
        if !terminated {
            warn!(
                outstanding = outstanding_of(self.lifecycle.load(Ordering::Acquire)),
                "termination wait timed out"
            );
        }
        terminated
    }

    pub async fn wait_terminated(&self) {
        self.terminated.cancelled().await;
    }

    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.await_termination(timeout).await
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        // завершенные читаем раньше принятых, чтобы outstanding не ушел в минус
        let completed_tasks = self.completed_tasks.load(Ordering::Acquire);
        let failed_tasks = self.failed_tasks.load(Ordering::Acquire);
        PoolMetrics {
            state: self.state(),
            width: self.width,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_submitted: self.total_submitted.load(Ordering::Acquire),
            completed_tasks,
            failed_tasks,
        }
    }
}
