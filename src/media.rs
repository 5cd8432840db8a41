//! Background media offload
//!
//! Large embedded payloads (`image_*` / `video_*` fields carrying data URLs)
//! are detached from the synchronous insert path and handed to this pool.
//! Workers decode each payload to a blob file under `uploads/` and patch the
//! owning record so the field holds the blob filename.
//!
//! The patch path is best-effort and eventually consistent: a failure leaves
//! the field in its null placeholder state, is logged, and bumps the failure
//! counter. One field's failure never aborts its siblings, and nothing here
//! ever blocks or fails an insert.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::record::{extension_for_mime, index_string, DetachedMedia, Record};
use crate::shard::{index_key, primary_key, ShardId, ShardManager};

/// One queued offload: every media field detached from a single insert
#[derive(Debug)]
pub struct MediaJob {
    /// Shard the record was written to
    pub shard: ShardId,
    /// Owning record id
    pub record_id: String,
    /// The record exactly as the insert wrote it (media fields nulled);
    /// merged underneath the current record at patch time
    pub original: Record,
    /// Detached payloads to persist
    pub media: Vec<DetachedMedia>,
    /// Fields that carry a secondary-index entry needing maintenance
    pub index_fields: Vec<String>,
}

/// Worker pool persisting detached media payloads
pub struct MediaPool {
    sender: Mutex<Option<Sender<MediaJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl MediaPool {
    /// Spawn `worker_count` workers writing blobs under `uploads_dir`
    pub fn new(
        manager: Arc<ShardManager>,
        uploads_dir: PathBuf,
        worker_count: usize,
    ) -> Result<Self> {
        fs::create_dir_all(&uploads_dir)?;

        let completed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = unbounded::<MediaJob>();

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let state = WorkerState {
                manager: manager.clone(),
                uploads_dir: uploads_dir.clone(),
                completed: completed.clone(),
                failed: failed.clone(),
            };
            let receiver: Receiver<MediaJob> = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("dayvault-media-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        state.process(job);
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            completed,
            failed,
        })
    }

    /// Queue a job; never blocks.
    ///
    /// After shutdown the job is dropped: its fields stay in placeholder
    /// state and count as failures.
    pub fn submit(&self, job: MediaJob) {
        let field_count = job.media.len() as u64;
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    self.failed.fetch_add(field_count, Ordering::Relaxed);
                }
            }
            None => {
                warn!(fields = field_count, "media job submitted after shutdown, dropping");
                self.failed.fetch_add(field_count, Ordering::Relaxed);
            }
        }
    }

    /// Offload fields persisted successfully
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Offload fields that failed and were left in placeholder state
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Stop accepting jobs, drain the queue, and join every worker.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("media worker panicked");
            }
        }
    }
}

/// Everything one worker needs, cloned per thread
struct WorkerState {
    manager: Arc<ShardManager>,
    uploads_dir: PathBuf,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl WorkerState {
    fn process(&self, job: MediaJob) {
        for media in &job.media {
            match self.offload_field(&job, media) {
                Ok(filename) => {
                    debug!(
                        shard = %job.shard,
                        record_id = %job.record_id,
                        field = %media.field,
                        filename = %filename,
                        "media field offloaded"
                    );
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(
                        shard = %job.shard,
                        record_id = %job.record_id,
                        field = %media.field,
                        error = %e,
                        "media offload failed"
                    );
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Persist one payload and patch the owning record.
    ///
    /// The store lock is held across the read-merge-write so the patch never
    /// interleaves with another writer on the same shard.
    fn offload_field(&self, job: &MediaJob, media: &DetachedMedia) -> Result<String> {
        let bytes = BASE64
            .decode(media.data_b64.as_bytes())
            .map_err(|e| crate::VaultError::Validation(format!("bad media payload: {e}")))?;

        let filename = format!("{}.{}", Uuid::new_v4(), extension_for_mime(&media.mime));
        fs::write(self.uploads_dir.join(&filename), bytes)?;

        let store = self.manager.get_store(&job.shard)?;
        let mut store = store.lock();

        let record_key = primary_key(&job.record_id);
        let mut current = match store.get(&record_key) {
            Some(bytes) => serde_json::from_slice::<Record>(bytes)?,
            None => job.original.clone(),
        };

        // Whatever the field holds right now owns the stale index entry
        let stale_value = current.get(&media.field).and_then(index_string);

        current.merge_missing_from(&job.original);
        current.set(media.field.clone(), serde_json::Value::String(filename.clone()));

        store.put(&record_key, &serde_json::to_vec(&current)?)?;

        if job.index_fields.iter().any(|f| f == &media.field) {
            if let Some(stale) = stale_value {
                store.remove(&index_key(&media.field, &stale))?;
            }
            store.put(&index_key(&media.field, &filename), job.record_id.as_bytes())?;
        }

        Ok(filename)
    }
}
