/// Жизненный цикл пула: Running -> Draining -> Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    Running,
    Draining,
    Terminated,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolState::Running => write!(f, "running"),
            PoolState::Draining => write!(f, "draining"),
            PoolState::Terminated => write!(f, "terminated"),
        }
    }
}


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub state: PoolState,
    pub width: usize,
    pub active_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.width == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / self.width as f64
    }

    /// Задачи, которые приняты, но еще не завершены
    pub fn outstanding(&self) -> usize {
        self.total_submitted
            .saturating_sub(self.completed_tasks + self.failed_tasks)
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}
