//! Enrichment queue: bounded channel, worker loop, and submission.
//!
//! Shutdown: [`EnrichmentQueue::shutdown`] stops intake, lets the loop work
//! through requests that were already accepted, and waits for in-flight jobs.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use picflow_core::Config;

use crate::context::EnrichmentHandler;

/// One asset waiting for enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub asset_id: Uuid,
    /// Storage key of the normalized original.
    pub file_key: String,
}

#[derive(Clone, Debug)]
pub struct EnrichmentQueueConfig {
    pub max_workers: usize,
    /// Requests held in the channel before `submit` starts refusing.
    pub capacity: usize,
}

impl Default for EnrichmentQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            capacity: 256,
        }
    }
}

impl From<&Config> for EnrichmentQueueConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.enrichment_max_workers,
            capacity: config.enrichment_queue_capacity,
        }
    }
}

pub struct EnrichmentQueue {
    request_tx: mpsc::Sender<EnrichmentRequest>,
    shutdown_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
}

impl EnrichmentQueue {
    /// Create the queue and spawn its worker loop on the current runtime.
    pub fn new(handler: Arc<dyn EnrichmentHandler>, config: EnrichmentQueueConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        let (request_tx, request_rx) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = tokio::spawn(Self::worker_loop(
            handler,
            max_workers,
            request_rx,
            shutdown_rx,
        ));

        Self {
            request_tx,
            shutdown_tx,
            worker,
        }
    }

    /// Hand a request to the worker without waiting. Returns false when the
    /// queue is full or shutting down; the request is dropped in that case.
    pub fn submit(&self, request: EnrichmentRequest) -> bool {
        let asset_id = request.asset_id;
        match self.request_tx.try_send(request) {
            Ok(()) => {
                tracing::debug!(asset_id = %asset_id, "Enrichment request queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(asset_id = %asset_id, "Enrichment queue full, dropping request");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(asset_id = %asset_id, "Enrichment queue closed, dropping request");
                false
            }
        }
    }

    /// Stop accepting requests, finish the accepted ones, and wait for the
    /// worker loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        drop(self.request_tx);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "Enrichment worker loop panicked");
        }
    }

    async fn worker_loop(
        handler: Arc<dyn EnrichmentHandler>,
        max_workers: usize,
        mut request_rx: mpsc::Receiver<EnrichmentRequest>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(max_workers, "Enrichment worker started");
        let semaphore = Arc::new(Semaphore::new(max_workers));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Enrichment worker shutting down");
                    request_rx.close();
                    while let Some(request) = request_rx.recv().await {
                        Self::dispatch(&handler, &semaphore, request).await;
                    }
                    break;
                }
                request = request_rx.recv() => match request {
                    Some(request) => Self::dispatch(&handler, &semaphore, request).await,
                    None => break,
                },
            }
        }

        // Wait for in-flight jobs.
        let _ = semaphore.acquire_many(max_workers as u32).await;
        tracing::info!("Enrichment worker stopped");
    }

    async fn dispatch(
        handler: &Arc<dyn EnrichmentHandler>,
        semaphore: &Arc<Semaphore>,
        request: EnrichmentRequest,
    ) {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(asset_id = %request.asset_id, "Worker semaphore closed");
                return;
            }
        };

        let handler = Arc::clone(handler);
        tokio::spawn(async move {
            let _permit = permit;
            handler.handle(request).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHandler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        handled: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl EnrichmentHandler for RecordingHandler {
        async fn handle(self: Arc<Self>, request: EnrichmentRequest) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.handled.lock().unwrap().push(request.asset_id);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn request() -> EnrichmentRequest {
        EnrichmentRequest {
            asset_id: Uuid::new_v4(),
            file_key: "originals/o/a.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_accepted_requests() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EnrichmentQueue::new(
            handler.clone(),
            EnrichmentQueueConfig {
                max_workers: 2,
                capacity: 16,
            },
        );

        let requests: Vec<_> = (0..6).map(|_| request()).collect();
        for r in &requests {
            assert!(queue.submit(r.clone()));
        }
        queue.shutdown().await;

        let handled = handler.handled.lock().unwrap().clone();
        assert_eq!(handled.len(), 6);
        for r in &requests {
            assert!(handled.contains(&r.asset_id));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_capped() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EnrichmentQueue::new(
            handler.clone(),
            EnrichmentQueueConfig {
                max_workers: 2,
                capacity: 16,
            },
        );

        for _ in 0..8 {
            queue.submit(request());
        }
        queue.shutdown().await;

        assert_eq!(handler.handled.lock().unwrap().len(), 8);
        assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_full_queue_refuses_without_blocking() {
        let handler = Arc::new(RecordingHandler::default());
        let queue = EnrichmentQueue::new(
            handler.clone(),
            EnrichmentQueueConfig {
                max_workers: 1,
                capacity: 1,
            },
        );

        let accepted = (0..10).filter(|_| queue.submit(request())).count();
        assert!(accepted >= 1);
        assert!(accepted < 10);

        queue.shutdown().await;
        assert_eq!(handler.handled.lock().unwrap().len(), accepted);
    }

    #[test]
    fn test_config_follows_application_settings() {
        let mut config = picflow_core::Config::from_lookup(|_| None).unwrap();
        config.enrichment_max_workers = 5;
        config.enrichment_queue_capacity = 9;

        let queue_config = EnrichmentQueueConfig::from(&config);
        assert_eq!(queue_config.max_workers, 5);
        assert_eq!(queue_config.capacity, 9);
    }
}
