use std::sync::Arc;

use proxbot_common::{Hypervisor, ProxbotError, Result};
use tokio::sync::Semaphore;
use tracing::error;

pub const DEFAULT_MAX_BLOCKING_CALLS: usize = 8;

/// Runs blocking hypervisor calls on the tokio blocking pool so command
/// handling never waits on network I/O.
///
/// At most `max_concurrent` calls are in flight. There is no retry, no
/// timeout and no ordering between calls; the callee's error comes back
/// unchanged.
#[derive(Clone)]
pub struct CallBridge {
    permits: Arc<Semaphore>,
}

impl CallBridge {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProxbotError::Internal("call bridge is closed".to_string()))?;

        // The permit moves into the worker so it is held until the call
        // returns, even if the caller stops waiting.
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Blocking hypervisor call did not complete");
                Err(ProxbotError::Internal(format!(
                    "hypervisor call did not complete: {e}"
                )))
            }
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for CallBridge {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCKING_CALLS)
    }
}

/// Shared hypervisor client paired with the bridge every call goes through.
#[derive(Clone)]
pub struct HypervisorHandle {
    client: Arc<dyn Hypervisor>,
    bridge: CallBridge,
}

impl HypervisorHandle {
    pub fn new(client: Arc<dyn Hypervisor>, bridge: CallBridge) -> Self {
        Self { client, bridge }
    }

    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Hypervisor) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let client = Arc::clone(&self.client);
        self.bridge.run(move || f(client.as_ref())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_callee_result() {
        let bridge = CallBridge::new(2);

        let ok = bridge.run(|| Ok(7)).await.unwrap();
        assert_eq!(ok, 7);

        let err = bridge
            .run::<(), _>(|| Err(ProxbotError::Http("connection refused".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxbotError::Http(msg) if msg == "connection refused"));
    }

    #[tokio::test]
    async fn test_panicking_call_becomes_internal_error() {
        let bridge = CallBridge::new(1);

        let err = bridge
            .run::<(), _>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxbotError::Internal(_)));

        // The permit is released after the panic.
        assert_eq!(bridge.available_permits(), 1);
        assert_eq!(bridge.run(|| Ok(1)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let bridge = CallBridge::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let bridge = bridge.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                bridge
                    .run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
