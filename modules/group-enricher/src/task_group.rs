//! Spawned work whose results are collected in submission order once the
//! pending weight crosses a threshold.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::warn;

struct Pending<T> {
    handle: JoinHandle<T>,
    fallback: T,
}

pub struct TaskGroup<T> {
    pending: Vec<Pending<T>>,
    weight: usize,
    threshold: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: Vec::new(),
            weight: 0,
            threshold: threshold.max(1),
        }
    }

    /// Spawn `task` immediately. `fallback` stands in for its output if the
    /// task panics.
    pub fn submit<F>(&mut self, weight: usize, fallback: T, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.pending.push(Pending { handle, fallback });
        self.weight += weight;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total weight of the tasks submitted since the last flush.
    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn is_saturated(&self) -> bool {
        !self.pending.is_empty() && self.weight >= self.threshold
    }

    /// Await every pending task and return their outputs in submission order.
    pub async fn flush(&mut self) -> Vec<T> {
        let pending = std::mem::take(&mut self.pending);
        self.weight = 0;

        let (handles, fallbacks): (Vec<_>, Vec<_>) =
            pending.into_iter().map(|p| (p.handle, p.fallback)).unzip();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(fallbacks)
            .enumerate()
            .map(|(index, (joined, fallback))| match joined {
                Ok(output) => output,
                Err(e) => {
                    warn!(task = index, error = %e, "Task did not complete, using its fallback");
                    fallback
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn flush_preserves_submission_order() {
        let mut group = TaskGroup::new(100);
        for (i, delay) in [30u64, 10, 20].into_iter().enumerate() {
            group.submit(1, usize::MAX, async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                i
            });
        }

        assert_eq!(group.flush().await, vec![0, 1, 2]);
        assert!(group.is_empty());
        assert_eq!(group.weight(), 0);
    }

    #[tokio::test]
    async fn saturation_follows_weight() {
        let mut group = TaskGroup::new(10);
        group.submit(5, (), async {});
        assert!(!group.is_saturated());
        group.submit(5, (), async {});
        assert!(group.is_saturated());
        assert_eq!(group.len(), 2);

        group.flush().await;
        assert!(!group.is_saturated());
    }

    #[tokio::test]
    async fn panicking_task_yields_fallback() {
        let mut group = TaskGroup::new(10);
        group.submit(1, "fallback", async { "first" });
        group.submit(1, "fallback", async {
            if true {
                panic!("task blew up");
            }
            "second"
        });
        group.submit(1, "fallback", async { "third" });

        assert_eq!(group.flush().await, vec!["first", "fallback", "third"]);
    }

    #[tokio::test]
    async fn tasks_start_before_flush() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut group = TaskGroup::new(10);
        group.submit(1, (), async move {
            let _ = tx.send(());
        });

        // The task runs on its own; waiting on its signal does not need a flush.
        rx.await.unwrap();
        group.flush().await;
    }
}
