// SPDX-License-Identifier: MPL-2.0

use crate::armory::LootItem;
use crate::render::RenderError;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pending renders allowed to wait behind the one in flight
const QUEUE_CAPACITY: usize = 64;

type RenderResult = Result<Option<Vec<u8>>, RenderError>;

/// Whatever actually produces the image. Only ever driven by one worker.
#[async_trait]
pub trait RenderBackend: Send + 'static {
    /// Composite image of the items' tooltips, `None` when none could be fetched.
    async fn render(&mut self, items: &[LootItem], realm_id: u32) -> RenderResult;

    /// Release external resources before the worker exits.
    async fn shutdown(&mut self) {}
}

enum Command {
    Render {
        items: Vec<LootItem>,
        realm_id: u32,
        reply: oneshot::Sender<RenderResult>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the serial render worker. Clones share the same worker.
#[derive(Clone)]
pub struct RenderQueue {
    tx: mpsc::Sender<Command>,
}

impl RenderQueue {
    /// Start the worker on the current runtime.
    pub fn spawn<B: RenderBackend>(backend: B) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(backend, rx));
        (Self { tx }, worker)
    }

    /// Queue a render and wait for it. Jobs run one at a time, in submit order.
    pub async fn try_render(&self, items: Vec<LootItem>, realm_id: u32) -> RenderResult {
        if items.is_empty() {
            return Ok(None);
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Render {
                items,
                realm_id,
                reply,
            })
            .await
            .map_err(|_| RenderError::QueueClosed)?;

        rx.await.map_err(|_| RenderError::QueueClosed)?
    }

    /// Like [`try_render`](Self::try_render) but failures degrade to no image.
    pub async fn render(&self, items: Vec<LootItem>, realm_id: u32) -> Option<Vec<u8>> {
        match self.try_render(items, realm_id).await {
            Ok(image) => image,
            Err(e) => {
                warn!(realm_id, error = %e, "loot render failed, sending without image");
                None
            }
        }
    }

    /// Let queued jobs finish, then stop the worker and its backend.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_worker<B: RenderBackend>(mut backend: B, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Render {
                items,
                realm_id,
                reply,
            } => {
                // A panicking job must not take the lane down with it
                let result = AssertUnwindSafe(backend.render(&items, realm_id))
                    .catch_unwind()
                    .await
                    .unwrap_or(Err(RenderError::Panicked));

                if reply.send(result).is_err() {
                    debug!(realm_id, "render requester went away");
                }
            }
            Command::Shutdown(done) => {
                backend.shutdown().await;
                let _ = done.send(());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn item(entry: u32) -> LootItem {
        LootItem {
            entry,
            name: format!("item {entry}"),
        }
    }

    /// Records the wall-clock span of every session it runs.
    #[derive(Clone, Default)]
    struct SessionLog {
        spans: Arc<Mutex<Vec<(u32, Instant, Instant)>>>,
        shut_down: Arc<Mutex<bool>>,
    }

    struct SlowBackend {
        log: SessionLog,
    }

    #[async_trait]
    impl RenderBackend for SlowBackend {
        async fn render(&mut self, items: &[LootItem], _realm_id: u32) -> RenderResult {
            let start = Instant::now();
            tokio::time::sleep(Duration::from_millis(50)).await;
            let entry = items[0].entry;
            self.log
                .spans
                .lock()
                .unwrap()
                .push((entry, start, Instant::now()));

            match entry {
                2 => Err(RenderError::MissingTooltip("item 2".to_string())),
                4 => panic!("browser exploded"),
                _ => Ok(Some(vec![entry as u8])),
            }
        }

        async fn shutdown(&mut self) {
            *self.log.shut_down.lock().unwrap() = true;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_never_overlap() {
        let log = SessionLog::default();
        let (queue, _worker) = RenderQueue::spawn(SlowBackend { log: log.clone() });

        let (a, b, c) = tokio::join!(
            queue.render(vec![item(1)], 7),
            queue.render(vec![item(3)], 7),
            queue.render(vec![item(5)], 7),
        );
        assert_eq!(a, Some(vec![1]));
        assert_eq!(b, Some(vec![3]));
        assert_eq!(c, Some(vec![5]));

        let spans = log.spans.lock().unwrap().clone();
        assert_eq!(spans.len(), 3);
        let order: Vec<u32> = spans.iter().map(|(entry, _, _)| *entry).collect();
        assert_eq!(order, vec![1, 3, 5]);
        for pair in spans.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "sessions overlapped");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_poison_later_jobs() {
        let log = SessionLog::default();
        let (queue, _worker) = RenderQueue::spawn(SlowBackend { log: log.clone() });

        let failed = queue.try_render(vec![item(2)], 7).await;
        assert!(matches!(failed, Err(RenderError::MissingTooltip(_))));

        let panicked = queue.try_render(vec![item(4)], 7).await;
        assert!(matches!(panicked, Err(RenderError::Panicked)));

        assert_eq!(queue.render(vec![item(6)], 7).await, Some(vec![6]));
    }

    #[tokio::test]
    async fn test_empty_items_skip_the_queue() {
        let log = SessionLog::default();
        let (queue, _worker) = RenderQueue::spawn(SlowBackend { log: log.clone() });

        assert_eq!(queue.try_render(Vec::new(), 7).await.unwrap(), None);
        assert!(log.spans.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let log = SessionLog::default();
        let (queue, worker) = RenderQueue::spawn(SlowBackend { log: log.clone() });

        queue.shutdown().await;
        worker.await.unwrap();

        assert!(*log.shut_down.lock().unwrap());
        assert!(matches!(
            queue.try_render(vec![item(1)], 7).await,
            Err(RenderError::QueueClosed)
        ));
    }
}
