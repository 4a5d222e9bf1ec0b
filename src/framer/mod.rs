// Frame extraction dispatcher
//
// Requests are queued through a tiny bounded channel, admitted in FIFO
// order and executed concurrently as long as the token pool has room.
// - Job: request parameters, reply slot and result type
// - Pool: the counting token pool bounding concurrent extractions

pub mod job;
pub mod pool;

use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use job::*;
pub use pool::*;

use crate::config::FramerConfig;
use crate::error::{Result, VidError};
use crate::media::FrameExtractor;

/// Bounded-concurrency dispatcher between the HTTP layer and the extractor
pub struct Framer {
    queue: mpsc::Sender<Job>,
    receiver: Mutex<Option<mpsc::Receiver<Job>>>,
    pool: TokenPool,
    extractor: Arc<dyn FrameExtractor>,
}

impl Framer {
    pub fn new(config: &FramerConfig, pool: TokenPool, extractor: Arc<dyn FrameExtractor>) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            queue,
            receiver: Mutex::new(Some(receiver)),
            pool,
            extractor,
        }
    }

    pub fn pool(&self) -> &TokenPool {
        &self.pool
    }

    /// Queue a frame extraction and return the channel its result arrives on.
    ///
    /// Waits while the queue is full. If `cancel` fires first, or the
    /// dispatcher has stopped, the returned channel is closed without a value.
    pub async fn submit(&self, cancel: &CancellationToken, request: FrameRequest) -> oneshot::Receiver<FrameResult> {
        let (job, receiver) = Job::new(request, cancel.clone());
        let id = job.id;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(job = %id, "Submission cancelled before the job was queued");
            }
            sent = self.queue.send(job) => {
                match sent {
                    Ok(()) => debug!(job = %id, "Job queued"),
                    Err(_) => warn!(job = %id, "Frame dispatcher is not accepting jobs"),
                }
            }
        }

        receiver
    }

    /// Dispatcher main loop.
    ///
    /// Runs until `shutdown` is cancelled, then waits for every extraction
    /// already started before returning. Can be called only once.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut queue = self
            .receiver
            .lock()
            .map_err(|_| VidError::AlreadyRunning)?
            .take()
            .ok_or(VidError::AlreadyRunning)?;

        let mut running = JoinSet::new();
        info!("Frame dispatcher started with {} extraction slots", self.pool.capacity());

        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    Self::reap(joined);
                    continue;
                }
            };

            if job.is_abandoned() {
                debug!(job = %job.id, "Dropping job abandoned while queued");
                continue;
            }

            let token = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = job.cancel.cancelled() => {
                    debug!(job = %job.id, "Dropping job cancelled while waiting for a slot");
                    continue;
                }
                token = self.pool.acquire() => match token {
                    Ok(token) => token,
                    Err(e) => {
                        error!("Extraction slot pool is closed: {}", e);
                        break;
                    }
                },
            };

            if job.is_abandoned() {
                debug!(job = %job.id, "Dropping job abandoned while waiting for a slot");
                continue;
            }

            debug!(job = %job.id, in_use = self.pool.in_use(), "Job admitted");

            let extractor = Arc::clone(&self.extractor);
            let shutdown = shutdown.clone();
            running.spawn(execute(job, token, extractor, shutdown));
        }

        // Stop accepting; anything still buffered is dropped, closing its reply
        queue.close();
        drop(queue);

        if !running.is_empty() {
            info!("Waiting for {} running extractions to finish", running.len());
        }
        while let Some(joined) = running.join_next().await {
            Self::reap(joined);
        }

        info!("Frame dispatcher stopped");
        Ok(())
    }

    fn reap(joined: std::result::Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Frame extraction task panicked: {}", e);
            } else {
                warn!("Frame extraction task aborted: {}", e);
            }
        }
    }
}

/// Run one admitted job. The token is held until the result is delivered.
async fn execute(job: Job, _token: Token, extractor: Arc<dyn FrameExtractor>, shutdown: CancellationToken) {
    let Job { id, request, reply, .. } = job;
    let started = Instant::now();

    let result = extractor.extract(&shutdown, &request).await;
    match &result {
        Ok(data) => debug!(
            job = %id,
            bytes = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Frame extracted"
        ),
        Err(e) => warn!(job = %id, path = %request.path.display(), "Frame extraction failed: {}", e),
    }

    if reply.send(result).is_err() {
        debug!(job = %id, "Result discarded, requester is gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockFrameExtractor;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::task::JoinHandle;
    use tokio_test::assert_ready_err;

    /// Extractor that records what runs and blocks until released
    struct GateExtractor {
        gate: Semaphore,
        started: Mutex<Vec<PathBuf>>,
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        hold: Option<Duration>,
    }

    impl GateExtractor {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                started: Mutex::new(Vec::new()),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                hold: None,
            }
        }

        /// Finish every job after `hold` instead of waiting for the gate
        fn timed(hold: Duration) -> Self {
            Self {
                hold: Some(hold),
                ..Self::new()
            }
        }

        fn release(&self, jobs: usize) {
            self.gate.add_permits(jobs);
        }

        fn started(&self) -> Vec<PathBuf> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FrameExtractor for GateExtractor {
        async fn extract(&self, cancel: &CancellationToken, request: &FrameRequest) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().push(request.path.clone());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(VidError::Cancelled),
                _ = async {
                    match self.hold {
                        Some(hold) => tokio::time::sleep(hold).await,
                        None => self.gate.acquire().await.unwrap().forget(),
                    }
                } => Ok(request.path.to_string_lossy().as_bytes().to_vec()),
            };

            self.current.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        async fn version_info(&self) -> Result<String> {
            Ok("gate".to_string())
        }
    }

    fn request(name: &str) -> FrameRequest {
        FrameRequest::new(name, 0, 0, 0, false)
    }

    fn framer_with(max_processes: usize, extractor: Arc<dyn FrameExtractor>) -> Arc<Framer> {
        let config = FramerConfig {
            max_processes,
            ..Default::default()
        };
        Arc::new(Framer::new(&config, TokenPool::new(max_processes), extractor))
    }

    fn start(framer: &Arc<Framer>, shutdown: &CancellationToken) -> JoinHandle<Result<()>> {
        let framer = Arc::clone(framer);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { framer.run(shutdown).await })
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_single_result_then_closed() {
        let extractor = Arc::new(GateExtractor::timed(Duration::from_millis(1)));
        let framer = framer_with(2, extractor.clone());
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let receiver = framer.submit(&CancellationToken::new(), request("a.mp4")).await;
        let data = receiver.await.unwrap().unwrap();
        assert_eq!(data, b"a.mp4");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_pool() {
        let extractor = Arc::new(GateExtractor::timed(Duration::from_millis(20)));
        let framer = framer_with(3, extractor.clone());
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let mut clients = JoinSet::new();
        for i in 0..20 {
            let framer = Arc::clone(&framer);
            clients.spawn(async move {
                let receiver = framer.submit(&CancellationToken::new(), request(&format!("{i}.mp4"))).await;
                receiver.await
            });
        }

        let mut delivered = 0;
        while let Some(joined) = clients.join_next().await {
            assert!(joined.unwrap().unwrap().is_ok());
            delivered += 1;
        }

        assert_eq!(delivered, 20);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 20);
        let peak = extractor.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded pool");
        // Tokens go back right after each result is sent
        wait_until(|| framer.pool().available() == 3).await;

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_second_job_waits_for_token() {
        let extractor = Arc::new(GateExtractor::new());
        let framer = framer_with(1, extractor.clone());
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let first = framer.submit(&CancellationToken::new(), request("a.mp4")).await;
        wait_until(|| extractor.started().len() == 1).await;

        let second = framer.submit(&CancellationToken::new(), request("b.mp4")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(extractor.started(), vec![PathBuf::from("a.mp4")]);
        assert_eq!(framer.pool().available(), 0);

        extractor.release(1);
        assert_eq!(first.await.unwrap().unwrap(), b"a.mp4");

        wait_until(|| extractor.started().len() == 2).await;
        extractor.release(1);
        assert_eq!(second.await.unwrap().unwrap(), b"b.mp4");
        assert_eq!(
            extractor.started(),
            vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]
        );
        assert_eq!(extractor.peak.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_submit_on_full_queue_is_closed() {
        let mut extractor = MockFrameExtractor::new();
        extractor.expect_extract().never();
        let framer = framer_with(1, Arc::new(extractor));

        // Not running: the first job occupies the only queue slot
        let _pending = framer.submit(&CancellationToken::new(), request("a.mp4")).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let receiver = framer.submit(&cancel, request("b.mp4")).await;
        let mut receiver = tokio_test::task::spawn(receiver);
        assert_ready_err!(receiver.poll());
    }

    #[tokio::test]
    async fn test_pre_cancelled_submit_is_closed() {
        let mut extractor = MockFrameExtractor::new();
        extractor.expect_extract().never();
        let framer = framer_with(1, Arc::new(extractor));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let receiver = framer.submit(&cancel, request("a.mp4")).await;
        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn test_job_cancelled_while_waiting_is_never_extracted() {
        let extractor = Arc::new(GateExtractor::new());
        let framer = framer_with(1, extractor.clone());
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let first = framer.submit(&CancellationToken::new(), request("a.mp4")).await;
        wait_until(|| extractor.started().len() == 1).await;

        let cancel = CancellationToken::new();
        let mut second = framer.submit(&cancel, request("b.mp4")).await;
        assert!(matches!(second.try_recv(), Err(oneshot::error::TryRecvError::Empty)));

        cancel.cancel();
        extractor.release(1);
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.is_err());
        assert_eq!(extractor.started(), vec![PathBuf::from("a.mp4")]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_engine_error_does_not_stop_dispatcher() {
        let mut extractor = MockFrameExtractor::new();
        extractor
            .expect_extract()
            .withf(|_, request| request.index == 1)
            .times(1)
            .returning(|_, _| Err(VidError::Media("decoder exploded".to_string())));
        extractor
            .expect_extract()
            .withf(|_, request| request.index == 2)
            .times(1)
            .returning(|_, _| Ok(vec![0xff, 0xd8]));

        let framer = framer_with(4, Arc::new(extractor));
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let cancel = CancellationToken::new();
        let failed = framer.submit(&cancel, FrameRequest::new("a.mp4", 1, 0, 0, false)).await;
        assert!(matches!(failed.await.unwrap(), Err(VidError::Media(_))));

        let ok = framer.submit(&cancel, FrameRequest::new("a.mp4", 2, 0, 0, false)).await;
        assert_eq!(ok.await.unwrap().unwrap(), vec![0xff, 0xd8]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_running_jobs() {
        let extractor = Arc::new(GateExtractor::new());
        let pool = TokenPool::new(2);
        let framer = Arc::new(Framer::new(&FramerConfig::default(), pool.clone(), extractor.clone()));
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let cancel = CancellationToken::new();
        let first = framer.submit(&cancel, request("a.mp4")).await;
        let second = framer.submit(&cancel, request("b.mp4")).await;
        wait_until(|| extractor.current.load(Ordering::SeqCst) == 2).await;

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        // Both results were delivered before run returned
        let mut first = first;
        let mut second = second;
        assert!(matches!(first.try_recv(), Ok(Err(VidError::Cancelled))));
        assert!(matches!(second.try_recv(), Ok(Err(VidError::Cancelled))));
        assert_eq!(pool.available(), 2);

        // A fresh dispatcher on the same pool still reaches full concurrency
        let next = Arc::new(GateExtractor::new());
        let framer = Arc::new(Framer::new(&FramerConfig::default(), pool.clone(), next.clone()));
        let shutdown = CancellationToken::new();
        let handle = start(&framer, &shutdown);

        let first = framer.submit(&cancel, request("c.mp4")).await;
        let second = framer.submit(&cancel, request("d.mp4")).await;
        wait_until(|| next.current.load(Ordering::SeqCst) == 2).await;
        assert_eq!(pool.available(), 0);

        next.release(2);
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_closed() {
        let extractor = Arc::new(GateExtractor::new());
        let framer = framer_with(1, extractor.clone());
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        framer.run(shutdown).await.unwrap();

        let receiver = framer.submit(&CancellationToken::new(), request("a.mp4")).await;
        assert!(receiver.await.is_err());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let framer = framer_with(1, Arc::new(GateExtractor::new()));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        framer.run(shutdown.clone()).await.unwrap();

        let err = framer.run(shutdown).await.unwrap_err();
        assert!(matches!(err, VidError::AlreadyRunning));
    }
}
