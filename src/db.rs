//! The database controller and its lifecycle.
//!
//! [`VectorDatabase`] owns the vector collection and the search service
//! behind a single reader-writer lock, exposes thread-safe CRUD and search
//! operations, owns the persistence format (load/save), and runs a
//! background worker that periodically rebuilds stale indexes.
//!
//! # Thread Safety
//!
//! `VectorDatabase` is `Send + Sync` and can be shared across threads using
//! `Arc`. All mutations take the exclusive lock; reads and searches take
//! the shared lock. Index rebuilding operates on an owned snapshot outside
//! the lock, so the rebuilt index can be briefly stale relative to
//! concurrent writes; the next debounce cycle re-triggers a rebuild.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vicinity::{Vector, VectorDatabase};
//!
//! let db = Arc::new(VectorDatabase::new()?);
//! let db_clone = Arc::clone(&db);
//! std::thread::spawn(move || {
//!     db_clone.add_vector(Vector::new(vec![1.0, 2.0]));
//! });
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::EtlAdapter;
use crate::collection::VectorList;
use crate::config::Config;
use crate::error::{Result, StorageError, VicinityError};
use crate::index::{SearchAlgorithm, SpatialIndex};
use crate::search::{make_index, SearchService};
use crate::storage::{
    self, BACKUP_FILE_NAME, DATABASE_FILE_NAME,
};
use crate::types::{check_cancelled, CancellationToken, VectorId};
use crate::vector::Vector;

/// How long the disposer waits between worker-liveness polls.
const JOIN_POLL_STEP: Duration = Duration::from_millis(50);

/// Process-local dirty/outdated flags plus the last-mutation clock.
///
/// Written only from within the write-lock critical section (the
/// collection's modification callback fires under the lock); read
/// lock-free by the background worker as best-effort polling.
struct ChangeTracker {
    epoch: Instant,
    unsaved: AtomicBool,
    outdated: AtomicBool,
    last_modification_micros: AtomicU64,
}

impl ChangeTracker {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            unsaved: AtomicBool::new(false),
            outdated: AtomicBool::new(false),
            last_modification_micros: AtomicU64::new(0),
        }
    }

    fn mark_modified(&self) {
        let micros = self.epoch.elapsed().as_micros() as u64;
        self.last_modification_micros.store(micros, Ordering::Release);
        self.unsaved.store(true, Ordering::Release);
        self.outdated.store(true, Ordering::Release);
    }

    fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    fn has_outdated_index(&self) -> bool {
        self.outdated.load(Ordering::Acquire)
    }

    fn clear_unsaved(&self) {
        self.unsaved.store(false, Ordering::Release);
    }

    fn clear_outdated(&self) {
        self.outdated.store(false, Ordering::Release);
    }

    fn quiescent_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_micros() as u64;
        let last = self.last_modification_micros.load(Ordering::Acquire);
        Duration::from_micros(now.saturating_sub(last))
    }
}

/// The one composite structure the lock guards: the collection and the
/// search service with its built indexes.
struct DbInner {
    vectors: VectorList,
    search: SearchService,
}

struct WorkerHandle {
    thread: thread::JoinHandle<()>,
    shutdown: Sender<()>,
}

/// An embeddable database for storing and searching vectors.
pub struct VectorDatabase {
    inner: Arc<RwLock<DbInner>>,
    tracker: Arc<ChangeTracker>,
    rebuild_count: Arc<AtomicU64>,
    disposal: CancellationToken,
    worker: Option<WorkerHandle>,
    config: Config,
    disposed: bool,
}

impl std::fmt::Debug for VectorDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDatabase")
            .field("count", &self.count())
            .field("has_unsaved_changes", &self.has_unsaved_changes())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VectorDatabase {
    /// Creates an empty database with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Creates an empty database with the given configuration.
    ///
    /// Construction never partially fails: configuration validation is
    /// the only precondition.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().map_err(VicinityError::from)?;

        let tracker = Arc::new(ChangeTracker::new());

        let mut vectors = VectorList::new();
        let callback_tracker = Arc::clone(&tracker);
        vectors.set_modified_callback(Box::new(move || callback_tracker.mark_modified()));

        let search = SearchService::with_algorithms(&config.maintained_indexes);
        let inner = Arc::new(RwLock::new(DbInner { vectors, search }));

        let mut db = Self {
            inner,
            tracker,
            rebuild_count: Arc::new(AtomicU64::new(0)),
            disposal: CancellationToken::new(),
            worker: None,
            config,
            disposed: false,
        };

        if db.config.background_reindex {
            db.start_index_worker();
        }

        info!(
            maintained = ?db.config.maintained_indexes,
            background_reindex = db.config.background_reindex,
            "vector database created"
        );
        Ok(db)
    }

    fn read_inner(&self) -> Result<RwLockReadGuard<'_, DbInner>> {
        self.inner
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, DbInner>> {
        self.inner
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Thread-safe: adds a vector to the database.
    pub fn add_vector(&self, vector: Vector) -> Result<()> {
        self.write_inner()?.vectors.add(vector);
        Ok(())
    }

    /// Thread-safe: replaces the vector stored under `id`.
    ///
    /// Returns `false` if no vector with that id exists.
    pub fn update_vector(&self, id: VectorId, vector: Vector) -> Result<bool> {
        Ok(self.write_inner()?.vectors.update(id, vector))
    }

    /// Thread-safe: removes a vector by identity.
    ///
    /// Returns `false` if the vector was not present.
    pub fn remove_vector(&self, vector: &Vector) -> Result<bool> {
        Ok(self.write_inner()?.vectors.remove(vector))
    }

    /// Thread-safe: removes the vector stored under `id`.
    pub fn remove_vector_by_id(&self, id: VectorId) -> Result<bool> {
        Ok(self.write_inner()?.vectors.remove_by_id(id))
    }

    /// Thread-safe: fetches a vector by id.
    pub fn get_vector(&self, id: VectorId) -> Result<Option<Vector>> {
        Ok(self.read_inner()?.vectors.get_by_id(id).cloned())
    }

    /// Number of vectors in the database. Best-effort zero if the lock is
    /// poisoned.
    pub fn count(&self) -> usize {
        self.inner.read().map(|g| g.vectors.len()).unwrap_or(0)
    }

    /// True if the database holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// True if a vector with `id` is present.
    pub fn contains(&self, id: VectorId) -> bool {
        self.inner
            .read()
            .map(|g| g.vectors.contains(id))
            .unwrap_or(false)
    }

    /// Vectors carrying `tag` according to the current tag map.
    ///
    /// The map is rebuilt by load and by the background worker; call
    /// [`rebuild_tag_map`](Self::rebuild_tag_map) for an immediate refresh.
    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<Vector>> {
        Ok(self
            .read_inner()?
            .vectors
            .find_by_tag(tag)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Removes every vector and clears the tag map.
    pub fn clear(&self) -> Result<()> {
        self.write_inner()?.vectors.clear();
        Ok(())
    }

    // =========================================================================
    // State flags
    // =========================================================================

    /// True if mutations occurred since the last save.
    ///
    /// Callers polling this flag after a save can detect "my last save
    /// didn't actually persist".
    pub fn has_unsaved_changes(&self) -> bool {
        self.tracker.has_unsaved_changes()
    }

    /// True if mutations occurred since the last index rebuild.
    pub fn has_outdated_index(&self) -> bool {
        self.tracker.has_outdated_index()
    }

    /// Number of background/full index rebuilds performed so far.
    pub fn index_rebuild_count(&self) -> u64 {
        self.rebuild_count.load(Ordering::Acquire)
    }

    // =========================================================================
    // Embedding and search
    // =========================================================================

    /// Installs the embedding service used to resolve text queries.
    pub fn set_embedding_service(
        &self,
        embedding: Box<dyn crate::embedding::EmbeddingService>,
    ) -> Result<()> {
        self.write_inner()?.search.set_embedding_service(embedding);
        Ok(())
    }

    /// Replaces the distance calculator used by linear ranking.
    pub fn set_distance_metric(
        &self,
        metric: Box<dyn crate::vector::distance::DistanceMetric>,
    ) -> Result<()> {
        self.write_inner()?.search.set_distance_metric(metric);
        Ok(())
    }

    /// Generates a vector from text via the embedding service.
    pub fn generate_vector(&self, text: &str) -> Result<Vector> {
        self.read_inner()?.search.generate_vector(text)
    }

    /// Searches for the `k` nearest neighbors of a text query.
    ///
    /// The text is first converted into an embedding, then delegated to
    /// [`search`](Self::search). Execution failures degrade to an empty
    /// result set; validation and not-supported errors are re-raised.
    pub fn search_text(
        &self,
        text: &str,
        k: usize,
        algorithm: SearchAlgorithm,
        threshold: Option<f32>,
    ) -> Result<Vec<Vector>> {
        self.config.telemetry.counter("vicinity.db.search", 1);
        let outcome = self.read_inner().and_then(|inner| {
            inner
                .search
                .search_text(&inner.vectors, text, k, algorithm, threshold)
        });
        self.degrade_search_errors(outcome, algorithm)
    }

    /// Searches for the `k` nearest neighbors of a query vector.
    ///
    /// Execution failures (index inconsistency, embedding trouble) are
    /// logged and degrade to an empty result set so read paths stay
    /// resilient; validation and not-supported errors are re-raised so
    /// callers can distinguish "no results" from "malformed request".
    pub fn search(
        &self,
        query: &Vector,
        k: usize,
        algorithm: SearchAlgorithm,
        threshold: Option<f32>,
    ) -> Result<Vec<Vector>> {
        self.config.telemetry.counter("vicinity.db.search", 1);
        let outcome = self.read_inner().and_then(|inner| {
            inner
                .search
                .search(&inner.vectors, query, k, algorithm, threshold)
        });
        self.degrade_search_errors(outcome, algorithm)
    }

    /// Range search around a text query. Same degradation contract as
    /// [`search`](Self::search).
    pub fn range_search_text(
        &self,
        text: &str,
        radius: f32,
        algorithm: SearchAlgorithm,
    ) -> Result<Vec<Vector>> {
        self.config.telemetry.counter("vicinity.db.search", 1);
        let outcome = self.read_inner().and_then(|inner| {
            inner
                .search
                .range_search_text(&inner.vectors, text, radius, algorithm, None)
        });
        self.degrade_search_errors(outcome, algorithm)
    }

    /// Returns all vectors within `radius` of the query vector.
    ///
    /// Same degradation contract as [`search`](Self::search): a negative
    /// radius raises a validation error, an unmaintained algorithm raises
    /// not-supported, other failures return an empty set.
    pub fn range_search(
        &self,
        query: &Vector,
        radius: f32,
        algorithm: SearchAlgorithm,
    ) -> Result<Vec<Vector>> {
        self.config.telemetry.counter("vicinity.db.search", 1);
        let outcome = self.read_inner().and_then(|inner| {
            inner
                .search
                .range_search(&inner.vectors, query, radius, algorithm, None)
        });
        self.degrade_search_errors(outcome, algorithm)
    }

    fn degrade_search_errors(
        &self,
        outcome: Result<Vec<Vector>>,
        algorithm: SearchAlgorithm,
    ) -> Result<Vec<Vector>> {
        match outcome {
            Ok(results) => Ok(results),
            Err(err) if err.must_surface() => Err(err),
            Err(err) => {
                error!(error = %err, %algorithm, "search failed; returning empty result set");
                Ok(Vec::new())
            }
        }
    }

    // =========================================================================
    // Index maintenance
    // =========================================================================

    /// Rebuilds the tag map wholesale from the current vectors.
    #[instrument(skip(self))]
    pub fn rebuild_tag_map(&self) -> Result<()> {
        self.write_inner()?.vectors.rebuild_tag_map();
        Ok(())
    }

    /// Rebuilds every maintained index from a point-in-time snapshot.
    ///
    /// The build runs outside the lock; the finished indexes are
    /// installed under a brief write lock. The result may be stale
    /// relative to writes that land during the build; the background
    /// worker's next debounce cycle picks those up.
    #[instrument(skip(self, token))]
    pub fn rebuild_search_indexes(&self, token: Option<&CancellationToken>) -> Result<()> {
        Self::rebuild_indexes_outside_lock(&self.inner, token, &self.disposal)?;
        self.config.telemetry.counter("vicinity.db.index.rebuild", 1);
        self.rebuild_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Rebuilds exactly the named index from a current snapshot.
    #[instrument(skip(self))]
    pub fn rebuild_search_index(&self, algorithm: SearchAlgorithm) -> Result<()> {
        let snapshot = self.read_inner()?.vectors.snapshot();
        self.write_inner()?.search.build_index(algorithm, &snapshot)
    }

    fn rebuild_indexes_outside_lock(
        inner: &RwLock<DbInner>,
        token: Option<&CancellationToken>,
        linked: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(token, linked)?;

        let (snapshot, algorithms) = {
            let guard = inner.read().map_err(|_| StorageError::LockPoisoned)?;
            (guard.vectors.snapshot(), guard.search.maintained_algorithms())
        };

        let mut built: Vec<Box<dyn SpatialIndex>> = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            check_cancelled(token, linked)?;
            if let Some(mut index) = make_index(algorithm) {
                index.build(&snapshot);
                built.push(index);
            }
        }

        check_cancelled(token, linked)?;
        inner
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .search
            .install_indexes(built);
        Ok(())
    }

    // =========================================================================
    // Load / Save
    // =========================================================================

    /// Loads vectors (and indexes, for v1 files) from `<dir>/vectors.bin`.
    ///
    /// If the file is absent and `create_on_new` is false this fails with
    /// a file-not-found storage error; if absent and `create_on_new` is
    /// true it is a no-op (the first save creates the file).
    ///
    /// The current collection is cleared at the start of a load, so a
    /// load cancelled or failed after that point leaves the database
    /// empty or partially populated; the old in-memory state is not
    /// recoverable. The on-disk file is never modified by a failed load.
    #[instrument(skip(self, token), fields(dir = %dir.as_ref().display()))]
    pub fn load(
        &self,
        dir: impl AsRef<Path>,
        create_on_new: bool,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        self.config.telemetry.counter("vicinity.db.load", 1);
        let file_path = dir.as_ref().join(DATABASE_FILE_NAME);

        if !file_path.exists() {
            if !create_on_new {
                error!(path = %file_path.display(), "database file does not exist");
                return Err(StorageError::FileNotFound(file_path).into());
            }
            info!(path = %file_path.display(), "file absent; it will be created on first save");
            return Ok(());
        }

        check_cancelled(token, &self.disposal)?;

        // File I/O happens outside the lock; the write lock then covers
        // in-memory decompression and parsing only.
        let compressed = fs::read(&file_path)?;

        let outcome = {
            let mut inner = self.write_inner()?;
            let DbInner { vectors, search } = &mut *inner;
            vectors.clear();
            let mut decoder = GzDecoder::new(compressed.as_slice());
            storage::read_database(&mut decoder, vectors, search, token, &self.disposal)?
        };
        info!(
            vector_count = outcome.vector_count,
            path = %file_path.display(),
            "loaded vectors"
        );

        // Rebuild indexes outside the write lock to reduce lock contention.
        if outcome.indexes_dirty && !self.disposal.is_cancelled() {
            check_cancelled(token, &self.disposal)?;
            self.rebuild_search_indexes(token)?;
        }

        {
            let mut inner = self.write_inner()?;
            inner.vectors.rebuild_tag_map();
            self.tracker.clear_unsaved();
            self.tracker.clear_outdated();
        }
        self.config
            .telemetry
            .gauge("vicinity.db.vectors.count", self.count() as u64);
        Ok(())
    }

    /// Saves vectors and indexes to `<dir>/vectors.bin`.
    ///
    /// No-ops when there are no unsaved changes. A live file is renamed
    /// to `vectors.old.bin` before the new file is written; the backup is
    /// deleted only after a successful write, so the previous on-disk
    /// state survives any mid-stream failure.
    ///
    /// I/O and permission failures are recovered locally: they are
    /// logged, the save aborts, and the dirty flag stays set so a later
    /// save retries; the call still returns `Ok`. Cancellation is
    /// returned as an error.
    #[instrument(skip(self, token), fields(dir = %dir.as_ref().display()))]
    pub fn save(&self, dir: impl AsRef<Path>, token: Option<&CancellationToken>) -> Result<()> {
        self.config.telemetry.counter("vicinity.db.save", 1);

        if !self.tracker.has_unsaved_changes() {
            info!("database not modified since the last save");
            return Ok(());
        }

        match self.save_impl(dir.as_ref(), token) {
            Ok(()) => Ok(()),
            Err(err @ VicinityError::Cancelled) => Err(err),
            Err(err @ VicinityError::Storage(StorageError::LockPoisoned)) => Err(err),
            Err(err) => {
                error!(
                    error = %err,
                    "save failed; previous on-disk file and backup are intact, dirty flag stays set"
                );
                Ok(())
            }
        }
    }

    fn save_impl(&self, dir: &Path, token: Option<&CancellationToken>) -> Result<()> {
        let file_path = dir.join(DATABASE_FILE_NAME);
        let backup_path = dir.join(BACKUP_FILE_NAME);

        check_cancelled(token, &self.disposal)?;

        if !dir.exists() {
            fs::create_dir_all(dir)?;
            info!(dir = %dir.display(), "created target directory");
        }

        if file_path.exists() {
            if backup_path.exists() {
                fs::remove_file(&backup_path)?;
            }
            fs::rename(&file_path, &backup_path)?;
            debug!(backup = %backup_path.display(), "moved live file to backup");
        }

        {
            let inner = self.write_inner()?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            storage::write_database(
                &mut encoder,
                &inner.vectors,
                &inner.search,
                token,
                &self.disposal,
            )?;
            let buffer = encoder.finish()?;

            if let Some(allocator) = &self.config.sparse_allocator {
                allocator.allocate(&file_path, buffer.len() as u64)?;
            }
            fs::write(&file_path, &buffer)?;

            if let Some(allocator) = &self.config.sparse_allocator {
                if let Ok(used) = allocator.actual_bytes_used(&file_path) {
                    debug!(bytes_used = used, "sparse backing usage after save");
                }
            }

            // Cleared inside the lock so the flag transition is atomic
            // with the state that was serialized.
            self.tracker.clear_unsaved();
        }

        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        info!(path = %file_path.display(), "saved database and removed backup");
        Ok(())
    }

    // =========================================================================
    // Import / Export
    // =========================================================================

    /// Imports vectors through an ETL adapter under the write lock.
    #[instrument(skip(self, adapter, token), fields(content_type = ?adapter.content_type()))]
    pub fn import_data(
        &self,
        adapter: &dyn EtlAdapter,
        path: &Path,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        check_cancelled(token, &self.disposal)?;
        debug!(path = %path.display(), "importing vectors");
        {
            let mut inner = self.write_inner()?;
            adapter.import_data(path, &mut inner.vectors, token.unwrap_or(&self.disposal))?;
        }
        info!(path = %path.display(), "vectors imported");
        Ok(())
    }

    /// Exports vectors through an ETL adapter under the read lock.
    #[instrument(skip(self, adapter, token), fields(content_type = ?adapter.content_type()))]
    pub fn export_data(
        &self,
        adapter: &dyn EtlAdapter,
        path: &Path,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        check_cancelled(token, &self.disposal)?;
        {
            let inner = self.read_inner()?;
            debug!(count = inner.vectors.len(), path = %path.display(), "exporting vectors");
            adapter.export_data(&inner.vectors, path, token.unwrap_or(&self.disposal))?;
        }
        info!(path = %path.display(), "vectors exported");
        Ok(())
    }

    // =========================================================================
    // Background worker
    // =========================================================================

    fn start_index_worker(&mut self) {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let inner = Arc::clone(&self.inner);
        let tracker = Arc::clone(&self.tracker);
        let rebuild_count = Arc::clone(&self.rebuild_count);
        let telemetry = Arc::clone(&self.config.telemetry);
        let disposal = self.disposal.clone();
        let poll_interval = self.config.poll_interval;
        let quiescence = self.config.quiescence;

        let spawned = thread::Builder::new()
            .name("vicinity-reindex".into())
            .spawn(move || {
                index_worker_loop(
                    &inner,
                    &tracker,
                    &rebuild_count,
                    telemetry.as_ref(),
                    &disposal,
                    &shutdown_rx,
                    poll_interval,
                    quiescence,
                );
            });

        match spawned {
            Ok(thread) => {
                self.worker = Some(WorkerHandle {
                    thread,
                    shutdown: shutdown_tx,
                });
            }
            Err(err) => {
                // No background maintenance on platforms that cannot spawn
                // threads; explicit rebuild calls still work.
                warn!(error = %err, "could not start index maintenance thread");
            }
        }
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Closes the database: stops the background worker, detaches the
    /// modification callback, and releases the vector collection.
    ///
    /// The database is consumed; disposal also runs on drop and is
    /// idempotent.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        // Cancel first so the worker can exit promptly even mid-sleep and
        // any in-flight load/save aborts.
        self.disposal.cancel();
        info!("shutting down vector database");

        if let Some(worker) = self.worker.take() {
            // Waking the sleeping worker: a message or a disconnect both
            // break recv_timeout immediately.
            let _ = worker.shutdown.send(());
            drop(worker.shutdown);

            let mut waited = Duration::ZERO;
            while !worker.thread.is_finished() {
                thread::sleep(JOIN_POLL_STEP);
                waited += JOIN_POLL_STEP;
                if waited.as_millis() % 1000 == 0 {
                    warn!(?waited, "index maintenance thread is still running");
                }
            }
            if worker.thread.join().is_err() {
                error!("index maintenance thread panicked during shutdown");
            }
        }

        if let Ok(mut inner) = self.inner.write() {
            inner.vectors.clear_modified_callback();
            inner.vectors.clear();
        }
        info!("vector database shut down");
    }
}

impl Drop for VectorDatabase {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The background maintenance loop.
///
/// Sleeps on `recv_timeout` (which doubles as the cancellation wake-up),
/// then rebuilds the tag map and all indexes when the outdated flag is
/// set, the collection is non-empty, and the quiescence window has
/// elapsed since the last mutation.
#[allow(clippy::too_many_arguments)]
fn index_worker_loop(
    inner: &RwLock<DbInner>,
    tracker: &ChangeTracker,
    rebuild_count: &AtomicU64,
    telemetry: &dyn crate::adapters::TelemetrySink,
    disposal: &CancellationToken,
    shutdown: &Receiver<()>,
    poll_interval: Duration,
    quiescence: Duration,
) {
    info!("index maintenance thread started");

    loop {
        if disposal.is_cancelled() {
            break;
        }
        match shutdown.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if disposal.is_cancelled() {
            break;
        }

        if !tracker.has_outdated_index() || tracker.quiescent_for() < quiescence {
            continue;
        }
        let empty = match inner.read() {
            Ok(guard) => guard.vectors.is_empty(),
            Err(_) => break,
        };
        if empty {
            continue;
        }

        if let Ok(mut guard) = inner.write() {
            guard.vectors.rebuild_tag_map();
        } else {
            break;
        }

        match VectorDatabase::rebuild_indexes_outside_lock(inner, None, disposal) {
            Ok(()) => {
                tracker.clear_outdated();
                rebuild_count.fetch_add(1, Ordering::AcqRel);
                telemetry.counter("vicinity.db.index.rebuild", 1);
                debug!("background index rebuild completed");
            }
            Err(err) if err.is_cancelled() => break,
            Err(err) => {
                error!(error = %err, "background index rebuild failed");
            }
        }
    }

    info!("index maintenance thread stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vector;
    use std::time::Duration;

    fn quiet_config() -> Config {
        Config {
            background_reindex: false,
            ..Default::default()
        }
    }

    fn v(values: &[f32]) -> Vector {
        Vector::new(values.to_vec())
    }

    #[test]
    fn test_database_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VectorDatabase>();
    }

    #[test]
    fn test_crud_flags_and_count() {
        let db = VectorDatabase::with_config(quiet_config()).unwrap();
        assert!(!db.has_unsaved_changes());
        assert!(!db.has_outdated_index());

        let vector = v(&[1.0, 2.0]);
        let id = vector.id;
        db.add_vector(vector).unwrap();

        assert_eq!(db.count(), 1);
        assert!(db.has_unsaved_changes());
        assert!(db.has_outdated_index());
        assert!(db.contains(id));

        assert!(db.update_vector(id, v(&[3.0, 4.0])).unwrap());
        assert!(!db.update_vector(id, v(&[0.0])).unwrap(), "old id is gone after update");

        db.clear().unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_get_vector_returns_clone() {
        let db = VectorDatabase::with_config(quiet_config()).unwrap();
        let vector = v(&[1.0]);
        let id = vector.id;
        db.add_vector(vector).unwrap();

        let fetched = db.get_vector(id).unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert!(db.get_vector(VectorId::new()).unwrap().is_none());
    }

    #[test]
    fn test_search_validation_errors_surface() {
        let db = VectorDatabase::with_config(quiet_config()).unwrap();
        db.add_vector(v(&[1.0])).unwrap();

        let err = db
            .search(&v(&[0.0]), 0, SearchAlgorithm::Linear, None)
            .unwrap_err();
        assert!(err.is_validation());

        let err = db
            .range_search(&v(&[0.0]), -1.0, SearchAlgorithm::Linear)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_search_not_supported_surfaces() {
        let config = Config {
            maintained_indexes: vec![SearchAlgorithm::KdTree],
            ..quiet_config()
        };
        let db = VectorDatabase::with_config(config).unwrap();
        db.add_vector(v(&[1.0])).unwrap();

        let err = db
            .search(&v(&[0.0]), 1, SearchAlgorithm::BallTree, None)
            .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_search_embedding_failure_degrades_to_empty() {
        let db = VectorDatabase::with_config(quiet_config()).unwrap();
        db.add_vector(v(&[1.0])).unwrap();

        // No generating embedding service installed: text search cannot
        // embed, which is an execution error, not a validation error.
        let results = db
            .search_text("hello", 3, SearchAlgorithm::Linear, None)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rebuild_then_search() {
        let db = VectorDatabase::with_config(quiet_config()).unwrap();
        for i in 0..10 {
            db.add_vector(v(&[i as f32, 0.0])).unwrap();
        }
        db.rebuild_search_indexes(None).unwrap();
        assert_eq!(db.index_rebuild_count(), 1);

        let results = db
            .search(&v(&[0.0, 0.0]), 3, SearchAlgorithm::KdTree, None)
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_close_is_idempotent_via_drop() {
        let db = VectorDatabase::new().unwrap();
        db.add_vector(v(&[1.0])).unwrap();
        db.close().unwrap();
        // Drop after close must not hang or double-free the worker.
    }
}
