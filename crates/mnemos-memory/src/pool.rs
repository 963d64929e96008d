//! Bounded worker pool with backpressure and structured cancellation.
//!
//! Every public operation of a [`MemoryContext`][crate::context::MemoryContext]
//! runs through a [`WorkerPool`]. A semaphore caps how many operations are in
//! flight and [`WorkerPool::run`] waits for a slot. [`WorkerPool::shutdown`] fires a
//! cancellation token: queued and in-flight operations resolve to
//! [`MnemosError::Cancelled`] and their futures are dropped at the next await.
//! The stores only mutate after their last await, so a cancelled operation
//! leaves them untouched.

use std::future::Future;
use std::sync::Arc;

use mnemos_types::MnemosError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    capacity: usize,
}

impl WorkerPool {
    /// A pool allowing `capacity` concurrent operations (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            cancel: CancellationToken::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `op` once a slot is free.
    pub async fn run<F, T>(&self, op: F) -> Result<T, MnemosError>
    where
        F: Future<Output = Result<T, MnemosError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(MnemosError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| MnemosError::Cancelled)?,
        };
        self.guarded(op).await
    }

    async fn guarded<F, T>(&self, op: F) -> Result<T, MnemosError>
    where
        F: Future<Output = Result<T, MnemosError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MnemosError::Cancelled),
            result = op => result,
        }
    }

    /// Cancel everything in flight and refuse new work.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!(capacity = self.capacity, "worker pool shutting down");
        }
        self.cancel.cancel();
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn run_returns_the_operation_result() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.run(async { Ok(7) }).await, Ok(7));
        assert_eq!(
            pool.run(async { Err::<(), _>(MnemosError::InvalidInput("boom".into())) }).await,
            Err(MnemosError::InvalidInput("boom".into()))
        );
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn run_waits_instead_of_failing() {
        let pool = WorkerPool::new(1);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.run(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_and_refuses_new_work() {
        let pool = WorkerPool::new(2);
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let in_flight = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(async move {
                    let _ = started_tx.send(());
                    std::future::pending::<()>().await;
                    Ok(())
                })
                .await
            })
        };
        started_rx.await.unwrap();

        pool.shutdown();
        assert_eq!(in_flight.await.unwrap(), Err(MnemosError::Cancelled));
        assert_eq!(pool.run(async { Ok(()) }).await, Err(MnemosError::Cancelled));
    }
}
