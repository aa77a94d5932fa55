use std::future::Future;
use tokio::task::JoinHandle;
use tracing::info;

/// Owner of a service's background jobs. Dropping or disposing it aborts
/// every job, in-flight requests included.
pub struct TaskGroup {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(job));
    }

    /// Jobs that have not finished or been aborted yet
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn dispose(mut self) {
        self.abort_all();
        info!("{} stopped", self.name);
    }

    fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispose_aborts_jobs() {
        let mut group = TaskGroup::new("test");
        group.spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        assert_eq!(group.running(), 1);
        group.dispose();
    }

    #[tokio::test]
    async fn test_drop_aborts_jobs() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);
        {
            let mut group = TaskGroup::new("test");
            group.spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            });
        }
        // The aborted job drops its sender, closing the channel
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }
}
