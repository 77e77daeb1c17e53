// ─── Download Manager ───
// Deduplicated, per-host limited and retrying fetches into local files.
//
// Every target path maps to at most one job. A job is a spawned task wrapped
// in a shared future, so concurrent callers asking for the same file await
// the same transfer. Finished jobs stay in the completed table and answer
// later identical requests without touching the network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::client::{host_of, Transport};
use super::error::FetchError;
use crate::core::config::CoreConfig;
use crate::core::integrity::{ChecksumCache, IntegrityAlgorithm};
use crate::core::status::StepStatus;

/// Local target of a fetch plus what its content is expected to hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileInfo {
    pub path: PathBuf,
    /// Lowercase hex digest.
    pub checksum: Option<String>,
    pub algorithm: IntegrityAlgorithm,
    /// Human-readable label for logs, e.g. `("client", "1.20.4")`.
    pub kind: String,
    pub id: String,
}

impl LocalFileInfo {
    pub fn new(path: impl Into<PathBuf>, algorithm: IntegrityAlgorithm) -> Self {
        Self {
            path: path.into(),
            checksum: None,
            algorithm,
            kind: "file".to_string(),
            id: String::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: Option<impl Into<String>>) -> Self {
        self.checksum = checksum.map(|c| c.into().to_ascii_lowercase());
        self
    }

    pub fn describe(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.kind = kind.into();
        self.id = id.into();
        self
    }

    fn expects_same(&self, checksum: &Option<String>, algorithm: IntegrityAlgorithm) -> bool {
        self.checksum == *checksum && self.algorithm == algorithm
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub target: LocalFileInfo,
    pub retry: bool,
    pub tolerate_missing_checksum: bool,
    /// Overrides `default_host_concurrency` for this request's host. Only the
    /// first request to a host sizes its pool; later values are ignored.
    pub host_limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, target: LocalFileInfo) -> Self {
        Self {
            url: url.into(),
            target,
            retry: true,
            tolerate_missing_checksum: false,
            host_limit: None,
        }
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn tolerate_missing_checksum(mut self) -> Self {
        self.tolerate_missing_checksum = true;
        self
    }

    pub fn host_limit(mut self, limit: usize) -> Self {
        self.host_limit = Some(limit.max(1));
        self
    }
}

pub type FetchOutcome = Result<StepStatus, FetchError>;
pub type FetchHandle = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlightJob {
    checksum: Option<String>,
    algorithm: IntegrityAlgorithm,
    handle: FetchHandle,
}

struct CompletedJob {
    checksum: Option<String>,
    algorithm: IntegrityAlgorithm,
}

#[derive(Default)]
struct JobTable {
    in_flight: HashMap<PathBuf, InFlightJob>,
    completed: HashMap<PathBuf, CompletedJob>,
}

#[derive(Debug, Default)]
struct DownloadStats {
    transfers: AtomicU64,
    up_to_date: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatsSnapshot {
    /// Transport calls, retries included.
    pub transfers: u64,
    pub up_to_date: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Retry loop states for one job.
enum Attempt {
    CheckLocal,
    Transfer { attempt: u32 },
    Backoff { attempt: u32, error: FetchError },
    Done(StepStatus),
}

pub struct DownloadManager {
    config: Arc<CoreConfig>,
    checksums: Arc<ChecksumCache>,
    transport: Arc<dyn Transport>,
    jobs: RwLock<JobTable>,
    /// One pool per origin; its size is fixed by the first request to reach it.
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    stats: DownloadStats,
}

impl DownloadManager {
    pub fn new(
        config: Arc<CoreConfig>,
        checksums: Arc<ChecksumCache>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            checksums,
            transport,
            jobs: RwLock::new(JobTable::default()),
            hosts: Mutex::new(HashMap::new()),
            stats: DownloadStats::default(),
        })
    }

    /// Start (or join) the job producing `request.target`.
    ///
    /// Must be called from within a tokio runtime. The returned handle can be
    /// cloned and awaited any number of times.
    pub fn fetch(self: &Arc<Self>, request: FetchRequest) -> FetchHandle {
        {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = self.lookup(&jobs, &request.target) {
                return handle;
            }
        }

        let path = request.target.path.clone();
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have registered the job between the two locks
        if let Some(handle) = self.lookup(&jobs, &request.target) {
            return handle;
        }
        // A memo left behind by a file that has since disappeared
        jobs.completed.remove(&path);

        let checksum = request.target.checksum.clone();
        let algorithm = request.target.algorithm;
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_job(request).await });
        let task_path = path.clone();
        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(FetchError::Aborted {
                    path: task_path,
                    message: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        // The job cannot retire itself before this insert: retiring needs the
        // write lock held here.
        jobs.in_flight.insert(
            path,
            InFlightJob {
                checksum,
                algorithm,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Answer `target` from the job table, if it already knows the path.
    ///
    /// A completed entry only counts while the file is still on disk.
    fn lookup(&self, jobs: &JobTable, target: &LocalFileInfo) -> Option<FetchHandle> {
        let path = &target.path;
        if let Some(done) = jobs.completed.get(path).filter(|_| path.is_file()) {
            if target.expects_same(&done.checksum, done.algorithm) {
                self.stats.up_to_date.fetch_add(1, Ordering::Relaxed);
                debug!("Already fetched {:?}", path);
                return Some(ready(Ok(StepStatus::UpToDate)));
            }
            return Some(ready(Err(conflict(target, &done.checksum))));
        }

        let job = jobs.in_flight.get(path)?;
        if target.expects_same(&job.checksum, job.algorithm) {
            debug!("Joining in-flight fetch of {:?}", path);
            return Some(job.handle.clone());
        }
        Some(ready(Err(conflict(target, &job.checksum))))
    }

    /// Drop the completed memo for `path` so the next fetch checks it again.
    fn forget_completed(&self, path: &Path) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
            .remove(path);
    }

    /// Fetch every request and merge the statuses. All jobs are awaited even
    /// when one fails; the first failure is returned.
    pub async fn fetch_all(
        self: &Arc<Self>,
        requests: impl IntoIterator<Item = FetchRequest>,
    ) -> FetchOutcome {
        let handles: Vec<FetchHandle> = requests.into_iter().map(|r| self.fetch(r)).collect();
        let outcomes = future::join_all(handles).await;

        let mut status = StepStatus::NotRun;
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(s) => status = status.merge(s),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(status),
        }
    }

    pub fn stats(&self) -> DownloadStatsSnapshot {
        DownloadStatsSnapshot {
            transfers: self.stats.transfers.load(Ordering::Relaxed),
            up_to_date: self.stats.up_to_date.load(Ordering::Relaxed),
            successes: self.stats.successes.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    pub fn checksums(&self) -> &ChecksumCache {
        &self.checksums
    }

    /// Whether `info.path` exists and can be trusted as is.
    ///
    /// A mismatching file is deleted (and reported invalid) when
    /// `remove_invalid_files` is set, otherwise kept with a warning.
    pub async fn checksum_check_file_is_valid_and_exists(
        &self,
        info: &LocalFileInfo,
        tolerate_missing_checksum: bool,
    ) -> Result<bool, FetchError> {
        match tokio::fs::metadata(&info.path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(false),
        }

        let Some(expected) = &info.checksum else {
            return Ok(!self.config.verify_checksums || tolerate_missing_checksum);
        };

        let actual = self
            .checksums
            .get_checksum(&info.path, info.algorithm)
            .await
            .map_err(|e| FetchError::io(&info.path, e))?;
        let Some(actual) = actual else {
            return Ok(true);
        };
        if actual == *expected {
            return Ok(true);
        }

        if self.config.remove_invalid_files {
            warn!(
                "Removing {} {} at {:?}: {} {} != expected {}",
                info.kind, info.id, info.path, info.algorithm, actual, expected
            );
            tokio::fs::remove_file(&info.path)
                .await
                .map_err(|e| FetchError::io(&info.path, e))?;
            self.checksums.invalidate(&info.path);
            self.forget_completed(&info.path);
            Ok(false)
        } else {
            warn!(
                "Keeping {} {} at {:?} despite {} mismatch ({} != {})",
                info.kind, info.id, info.path, info.algorithm, actual, expected
            );
            Ok(true)
        }
    }

    async fn run_job(self: Arc<Self>, request: FetchRequest) -> FetchOutcome {
        let outcome = self.perform(&request).await;

        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.in_flight.remove(&request.target.path);
        match &outcome {
            Ok(status) => {
                let counter = if *status == StepStatus::UpToDate {
                    &self.stats.up_to_date
                } else {
                    &self.stats.successes
                };
                counter.fetch_add(1, Ordering::Relaxed);
                jobs.completed.insert(
                    request.target.path.clone(),
                    CompletedJob {
                        checksum: request.target.checksum.clone(),
                        algorithm: request.target.algorithm,
                    },
                );
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Fetch of {} {} from {} failed: {}",
                    request.target.kind, request.target.id, request.url, e
                );
            }
        }
        outcome
    }

    async fn perform(&self, request: &FetchRequest) -> FetchOutcome {
        let mut state = Attempt::CheckLocal;
        loop {
            state = match state {
                Attempt::CheckLocal => {
                    let valid = self
                        .checksum_check_file_is_valid_and_exists(
                            &request.target,
                            request.tolerate_missing_checksum,
                        )
                        .await?;
                    if valid {
                        Attempt::Done(StepStatus::UpToDate)
                    } else {
                        Attempt::Transfer { attempt: 1 }
                    }
                }
                Attempt::Transfer { attempt } => match self.attempt_transfer(request).await {
                    Ok(()) => Attempt::Done(StepStatus::Success),
                    Err(error) if !request.retry || !error.is_retryable() => return Err(error),
                    Err(error) if attempt > self.config.max_retries => {
                        return Err(FetchError::RetriesExhausted {
                            url: request.url.clone(),
                            attempts: attempt,
                            last_error: error.to_string(),
                        });
                    }
                    Err(error) => Attempt::Backoff { attempt, error },
                },
                Attempt::Backoff { attempt, error } => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.config.max_retries + 1,
                        request.url,
                        error
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                    Attempt::Transfer {
                        attempt: attempt + 1,
                    }
                }
                Attempt::Done(status) => return Ok(status),
            };
        }
    }

    /// One transfer into a temp file, rename, then verification.
    async fn attempt_transfer(&self, request: &FetchRequest) -> Result<(), FetchError> {
        let target = &request.target;
        if let Some(parent) = target.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }
        let temp = temp_path(&target.path);

        let transferred = {
            let _permit = self.acquire_host_permit(request).await?;
            self.stats.transfers.fetch_add(1, Ordering::Relaxed);
            self.transport.transfer(&request.url, &temp).await
        };
        let bytes = match transferred {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&temp, &target.path)
            .await
            .map_err(|e| FetchError::io(&target.path, e))?;
        self.checksums.invalidate(&target.path);

        if let Some(expected) = &target.checksum {
            let actual = self
                .checksums
                .get_checksum(&target.path, target.algorithm)
                .await
                .map_err(|e| FetchError::io(&target.path, e))?;
            if let Some(actual) = actual {
                if actual != *expected {
                    let _ = tokio::fs::remove_file(&target.path).await;
                    self.checksums.invalidate(&target.path);
                    return Err(FetchError::ChecksumMismatch {
                        path: target.path.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
        }

        info!(
            "Fetched {} {} ({} bytes) -> {:?}",
            target.kind, target.id, bytes, target.path
        );
        Ok(())
    }

    async fn acquire_host_permit(
        &self,
        request: &FetchRequest,
    ) -> Result<OwnedSemaphorePermit, FetchError> {
        let limit = request
            .host_limit
            .unwrap_or(self.config.default_host_concurrency)
            .max(1);
        let semaphore = {
            let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                hosts
                    .entry(host_of(&request.url))
                    .or_insert_with(|| Arc::new(Semaphore::new(limit))),
            )
        };
        semaphore
            .acquire_owned()
            .await
            .map_err(|e| FetchError::Aborted {
                path: request.target.path.clone(),
                message: e.to_string(),
            })
    }
}

fn ready(outcome: FetchOutcome) -> FetchHandle {
    future::ready(outcome).boxed().shared()
}

fn conflict(target: &LocalFileInfo, existing: &Option<String>) -> FetchError {
    FetchError::ChecksumConflict {
        path: target.path.clone(),
        existing: existing.clone(),
        requested: target.checksum.clone(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::testing::{MockResponse, MockTransport};
    use std::time::Duration;

    const GOOD: &[u8] = b"good payload";

    fn sha1(bytes: &[u8]) -> String {
        IntegrityAlgorithm::Sha1.digest_bytes(bytes)
    }

    fn manager_with(
        transport: Arc<MockTransport>,
        edit: impl FnOnce(&mut CoreConfig) + Send + 'static,
    ) -> Arc<DownloadManager> {
        let config = CoreConfig::builder()
            .edit(|c| c.retry_backoff_ms = 1)
            .edit(edit)
            .build();
        let checksums = Arc::new(ChecksumCache::new(Arc::clone(&config)));
        DownloadManager::new(config, checksums, transport)
    }

    fn request(dir: &Path, name: &str, checksum: Option<String>) -> FetchRequest {
        FetchRequest::new(
            format!("https://mirror.test/{name}"),
            LocalFileInfo::new(dir.join(name), IntegrityAlgorithm::Sha1)
                .with_checksum(checksum)
                .describe("test", name),
        )
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).with_delay(Duration::from_millis(20)));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let first = manager.fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))));
        let second = manager.fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))));
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, Ok(StepStatus::Success));
        assert_eq!(b, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 1);

        let again = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        assert_eq!(again, Ok(StepStatus::UpToDate));
        assert_eq!(transport.calls(), 1);
        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), GOOD);
    }

    #[tokio::test]
    async fn mismatch_is_deleted_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).then(MockResponse::Body(b"bad".to_vec())));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let status = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        assert_eq!(status, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 2);
        assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), GOOD);
        assert_eq!(manager.stats().transfers, 2);
    }

    #[tokio::test]
    async fn mismatch_without_retry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(b"bad"));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let outcome = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))).without_retry())
            .await;
        assert!(matches!(outcome, Err(FetchError::ChecksumMismatch { .. })));
        assert_eq!(transport.calls(), 1);
        assert!(!dir.path().join("a.jar").exists());
        assert_eq!(manager.stats().failures, 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(b"bad"));
        let manager = manager_with(Arc::clone(&transport), |c| c.max_retries = 2);

        let outcome = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        match outcome {
            Err(FetchError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).then(MockResponse::Fail("reset")));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let status = manager.fetch(request(dir.path(), "a.jar", None)).await;
        assert_eq!(status, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).then(MockResponse::NotFound));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let outcome = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        assert!(matches!(outcome, Err(FetchError::NotFound { .. })));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn valid_local_file_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), GOOD).unwrap();
        let transport = Arc::new(MockTransport::new(GOOD));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let status = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD).to_uppercase())))
            .await;
        assert_eq!(status, Ok(StepStatus::UpToDate));
        assert_eq!(transport.calls(), 0);
        assert_eq!(manager.stats().up_to_date, 1);
    }

    #[tokio::test]
    async fn different_expectation_for_same_path_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).with_delay(Duration::from_millis(10)));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let running = manager.fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))));
        let clash = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(b"other"))))
            .await;
        assert!(matches!(clash, Err(FetchError::ChecksumConflict { .. })));
        assert_eq!(running.await, Ok(StepStatus::Success));

        let late = manager.fetch(request(dir.path(), "a.jar", None)).await;
        assert!(matches!(late, Err(FetchError::ChecksumConflict { .. })));
    }

    #[tokio::test]
    async fn removed_file_is_not_answered_from_memo() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD));
        let manager = manager_with(Arc::clone(&transport), |_| {});
        let target = dir.path().join("a.jar");

        let first = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        assert_eq!(first, Ok(StepStatus::Success));

        std::fs::write(&target, b"corrupted!").unwrap();
        let info = request(dir.path(), "a.jar", Some(sha1(GOOD))).target;
        assert!(!manager
            .checksum_check_file_is_valid_and_exists(&info, false)
            .await
            .unwrap());
        assert!(!target.exists());

        let second = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        assert_eq!(second, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 2);
        assert_eq!(std::fs::read(&target).unwrap(), GOOD);
    }

    #[tokio::test]
    async fn file_deleted_behind_the_manager_is_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        assert_eq!(
            manager.fetch(request(dir.path(), "a.jar", None)).await,
            Ok(StepStatus::Success)
        );
        std::fs::remove_file(dir.path().join("a.jar")).unwrap();

        assert_eq!(
            manager.fetch(request(dir.path(), "a.jar", None)).await,
            Ok(StepStatus::Success)
        );
        assert_eq!(transport.calls(), 2);
        assert!(dir.path().join("a.jar").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_between_attempts_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(b"bad"));
        let manager = manager_with(Arc::clone(&transport), |c| {
            c.max_retries = 2;
            c.retry_backoff_ms = 1_000;
        });

        let started = tokio::time::Instant::now();
        let outcome = manager
            .fetch(request(dir.path(), "a.jar", Some(sha1(GOOD))))
            .await;
        let waited = started.elapsed();

        assert!(matches!(outcome, Err(FetchError::RetriesExhausted { .. })));
        assert_eq!(transport.calls(), 3);
        // two sleeps of one second each
        assert!(waited >= Duration::from_secs(2), "waited {waited:?}");
        assert!(waited < Duration::from_secs(3), "waited {waited:?}");
    }

    #[tokio::test]
    async fn host_pool_is_sized_by_first_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).with_delay(Duration::from_millis(20)));
        let manager = manager_with(Arc::clone(&transport), |c| c.default_host_concurrency = 1);

        let first = manager
            .fetch(request(dir.path(), "first.jar", None).host_limit(1))
            .await;
        assert_eq!(first, Ok(StepStatus::Success));

        let status = manager
            .fetch_all(vec![
                request(dir.path(), "a.jar", None).host_limit(2),
                request(dir.path(), "b.jar", None).host_limit(3),
                request(dir.path(), "c.jar", None),
                request(dir.path(), "d.jar", None).host_limit(3),
            ])
            .await;
        assert_eq!(status, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 5);
        assert_eq!(transport.max_active(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_callers_share_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).with_delay(Duration::from_millis(20)));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let dir = dir.path().to_path_buf();
                tokio::spawn(async move {
                    manager
                        .fetch(request(&dir, "a.jar", Some(sha1(GOOD))))
                        .await
                })
            })
            .collect();
        for handle in handles {
            let status = handle.await.unwrap();
            assert!(
                matches!(status, Ok(StepStatus::Success | StepStatus::UpToDate)),
                "{status:?}"
            );
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn host_limit_caps_parallel_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).with_delay(Duration::from_millis(20)));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let requests =
            (0..6).map(|i| request(dir.path(), &format!("{i}.jar"), None).host_limit(2));
        let status = manager.fetch_all(requests).await;

        assert_eq!(status, Ok(StepStatus::Success));
        assert_eq!(transport.calls(), 6);
        assert!(transport.max_active() <= 2);
    }

    #[tokio::test]
    async fn fetch_all_reports_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD).then(MockResponse::NotFound));
        let manager = manager_with(Arc::clone(&transport), |_| {});

        let outcome = manager
            .fetch_all(vec![
                request(dir.path(), "a.jar", None).without_retry(),
                request(dir.path(), "b.jar", None),
            ])
            .await;
        assert!(outcome.is_err());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn local_validity_rules() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new(GOOD));
        let strict = manager_with(Arc::clone(&transport), |_| {});
        let lenient = manager_with(Arc::clone(&transport), |c| c.remove_invalid_files = false);
        let unverified = manager_with(Arc::clone(&transport), |c| c.verify_checksums = false);

        let path = dir.path().join("file.bin");
        let info = |checksum: Option<String>| {
            LocalFileInfo::new(&path, IntegrityAlgorithm::Sha1).with_checksum(checksum)
        };

        // missing
        assert!(!strict
            .checksum_check_file_is_valid_and_exists(&info(Some(sha1(GOOD))), true)
            .await
            .unwrap());

        std::fs::write(&path, GOOD).unwrap();
        // no expected checksum
        assert!(!strict
            .checksum_check_file_is_valid_and_exists(&info(None), false)
            .await
            .unwrap());
        assert!(strict
            .checksum_check_file_is_valid_and_exists(&info(None), true)
            .await
            .unwrap());
        assert!(unverified
            .checksum_check_file_is_valid_and_exists(&info(None), false)
            .await
            .unwrap());
        // match
        assert!(strict
            .checksum_check_file_is_valid_and_exists(&info(Some(sha1(GOOD))), false)
            .await
            .unwrap());
        // mismatch, kept
        assert!(lenient
            .checksum_check_file_is_valid_and_exists(&info(Some(sha1(b"other"))), false)
            .await
            .unwrap());
        assert!(path.exists());
        // mismatch, removed
        assert!(!strict
            .checksum_check_file_is_valid_and_exists(&info(Some(sha1(b"other"))), false)
            .await
            .unwrap());
        assert!(!path.exists());
    }
}
