//! Download side: resolve a manifest, pull every chunk it names through the
//! query backends and stitch the file back together in manifest order.
//!
//! Each chunk walks `Pending -> Downloading -> Completed | Failed`. A
//! [`DownloadJob`] keeps the bytes of completed chunks, so a retry only goes
//! after the failed ones.
use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use thiserror::Error;

use ccore::hash::{self, Digest};
use ccore::id::RecordId;
use cframe::record::decode_chunk;
use cframe::{ContentInfo, FrameError, Manifest};
use remote::Remote;

use crate::cache::ReconstructionCache;
use crate::envelope::StoreError;
use crate::ledger::RecordQuery;
pub use crate::progress::ChunkState;
use crate::progress::{Phase, Progress};
use crate::transmit::{DEFAULT_CONCURRENCY, ZSTD};

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunk {index} from {backend} is malformed: {source}")]
    MalformedFraming {
        index: u32,
        backend: String,
        source: FrameError,
    },
    #[error("chunk {index} from {backend} is truncated at offset {offset}: {declared} bytes declared, {available} available")]
    TruncatedByBackend {
        index: u32,
        backend: String,
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("chunk {index} from {backend} failed verification: expected {expected}, got {actual}")]
    IntegrityFailure {
        index: u32,
        backend: String,
        expected: Digest,
        actual: Digest,
    },
    #[error("chunk {index} unavailable from {backend}: {reason}")]
    BackendUnavailable {
        index: u32,
        backend: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("chunks {indices:?} could not be fetched")]
    InsufficientChunks { indices: Vec<u32> },
    #[error("manifest {id} could not be resolved: {reason}")]
    Manifest { id: RecordId, reason: String },
    #[error("failed to decompress reconstructed file: {0}")]
    Decompress(#[source] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exponential backoff between attempts on one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1 based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    pub concurrency: usize,
    pub verify: bool,
    pub retry: RetryPolicy,
    /// Per-chunk digests in manifest order, verification is skipped without
    /// them
    pub expected_digests: Option<Vec<Digest>>,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        ReconstructOptions {
            concurrency: DEFAULT_CONCURRENCY,
            verify: true,
            retry: RetryPolicy::default(),
            expected_digests: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconstructed {
    pub data: Vec<u8>,
    pub content_info: ContentInfo,
}

pub struct DownloadJob {
    main_id: RecordId,
    manifest: Manifest,
    options: ReconstructOptions,
    chunks: Vec<Option<Vec<u8>>>,
    states: Vec<ChunkState>,
    errors: BTreeMap<u32, ChunkError>,
}

impl DownloadJob {
    fn new(main_id: RecordId, manifest: Manifest, mut options: ReconstructOptions) -> Self {
        let total = manifest.chunk_refs.len();

        if let Some(expected) = &options.expected_digests {
            if expected.len() != total {
                warn!(
                    "Got {} digests for {} chunks of {}, not verifying",
                    expected.len(),
                    total,
                    main_id
                );
                options.expected_digests = None;
            }
        }

        DownloadJob {
            main_id,
            manifest,
            options,
            chunks: vec![None; total],
            states: vec![ChunkState::Pending; total],
            errors: BTreeMap::new(),
        }
    }

    pub fn main_id(&self) -> RecordId {
        self.main_id
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn states(&self) -> &[ChunkState] {
        &self.states
    }

    /// Last error of every chunk that is currently failed.
    pub fn errors(&self) -> &BTreeMap<u32, ChunkError> {
        &self.errors
    }

    pub fn failed(&self) -> Vec<u32> {
        self.indices_in(ChunkState::Failed)
    }

    pub fn is_complete(&self) -> bool {
        self.states.iter().all(|s| *s == ChunkState::Completed)
    }

    fn indices_in(&self, state: ChunkState) -> Vec<u32> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == state)
            .map(|(i, _)| i as u32)
            .collect()
    }

    fn expected(&self, index: u32) -> Option<Digest> {
        if !self.options.verify {
            return None;
        }
        self.options
            .expected_digests
            .as_ref()
            .map(|d| d[index as usize])
    }

    fn completed(&self) -> u32 {
        self.indices_in(ChunkState::Completed).len() as u32
    }

    fn insufficient(&self) -> Result<(), ReconstructError> {
        let indices = self.failed();
        if indices.is_empty() {
            Ok(())
        } else {
            Err(ReconstructError::InsufficientChunks { indices })
        }
    }

    /// Concatenate in manifest order, then undo any known compression.
    fn assemble(&self) -> Result<Vec<u8>, ReconstructError> {
        let mut joined = Vec::new();
        let mut missing = Vec::new();
        for (index, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                Some(bytes) => joined.extend_from_slice(bytes),
                None => missing.push(index as u32),
            }
        }
        if !missing.is_empty() {
            return Err(ReconstructError::InsufficientChunks { indices: missing });
        }

        match self.manifest.content_info.compression.as_deref() {
            None => Ok(joined),
            Some(ZSTD) => zstd::stream::decode_all(&joined[..]).map_err(ReconstructError::Decompress),
            Some(other) => {
                warn!(
                    "{} uses unknown compression {}, returning it as stored",
                    self.main_id, other
                );
                Ok(joined)
            }
        }
    }
}

pub struct ReconstructionEngine<R: Remote> {
    backends: Vec<Box<dyn RecordQuery>>,
    cache: ReconstructionCache<R>,
}

impl<R: Remote> ReconstructionEngine<R> {
    pub fn new(backends: Vec<Box<dyn RecordQuery>>, cache: ReconstructionCache<R>) -> Self {
        ReconstructionEngine { backends, cache }
    }

    pub fn cache(&self) -> &ReconstructionCache<R> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ReconstructionCache<R> {
        &mut self.cache
    }

    /// Fetch `main_id` and everything it names, cache hits skip the ledger.
    pub async fn reconstruct(
        &mut self,
        main_id: RecordId,
        options: ReconstructOptions,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Reconstructed, ReconstructError> {
        if let Some(entry) = self.cache.get(&main_id)? {
            info!("{} served from cache", main_id);
            progress(Progress::new(1, 1, Phase::Done));
            return Ok(Reconstructed {
                data: entry.data.clone(),
                content_info: entry.metadata.clone(),
            });
        }

        let mut job = self.open(main_id, options, progress).await?;
        self.run(&mut job, progress).await?;
        self.complete(&job, progress)
    }

    /// Resolve the manifest and set up a job with every chunk pending.
    pub async fn open(
        &self,
        main_id: RecordId,
        options: ReconstructOptions,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DownloadJob, ReconstructError> {
        progress(Progress::new(0, 1, Phase::Resolving));
        let manifest = self.resolve_manifest(main_id, &options.retry).await?;
        progress(Progress::new(1, 1, Phase::Resolving));

        info!(
            "{}: {} chunks, {}",
            main_id,
            manifest.chunk_refs.len(),
            manifest.content_info.mime_type
        );
        let job = DownloadJob::new(main_id, manifest, options);
        let total = job.states.len() as u32;
        for index in 0..total {
            progress(chunk_progress(0, total, index, ChunkState::Pending));
        }
        Ok(job)
    }

    /// Fetch every pending chunk of `job`.
    pub async fn run(
        &self,
        job: &mut DownloadJob,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(), ReconstructError> {
        let pending = job.indices_in(ChunkState::Pending);
        self.fetch(job, pending, progress).await;
        job.insufficient()
    }

    /// Fetch only the chunks that failed last time.
    pub async fn retry_failed_chunks(
        &self,
        job: &mut DownloadJob,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(), ReconstructError> {
        let failed = job.failed();
        info!("{}: retrying {} failed chunks", job.main_id, failed.len());

        self.fetch(job, failed, progress).await;
        job.insufficient()
    }

    /// Assemble a finished job and cache the result.
    pub fn complete(
        &mut self,
        job: &DownloadJob,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Reconstructed, ReconstructError> {
        job.insufficient()?;

        progress(Progress::new(0, 1, Phase::Assembling));
        let data = job.assemble()?;
        progress(Progress::new(1, 1, Phase::Assembling));

        let content_info = job.manifest.content_info.clone();
        if !self.cache.set(job.main_id, data.clone(), content_info.clone())? {
            debug!("{} is too large to cache", job.main_id);
        }

        info!("{}: reconstructed {} bytes", job.main_id, data.len());
        let total = job.states.len() as u32;
        progress(Progress::new(total, total, Phase::Done));
        Ok(Reconstructed { data, content_info })
    }

    async fn fetch(
        &self,
        job: &mut DownloadJob,
        indices: Vec<u32>,
        progress: &mut dyn FnMut(Progress),
    ) {
        let total = job.states.len() as u32;
        let concurrency = job.options.concurrency.max(1);
        let retry = job.options.retry;

        for batch in indices.chunks(concurrency) {
            let wanted: Vec<(u32, RecordId, Option<Digest>)> = batch
                .iter()
                .map(|&i| (i, job.manifest.chunk_refs[i as usize], job.expected(i)))
                .collect();

            for &i in batch {
                job.states[i as usize] = ChunkState::Downloading;
                progress(chunk_progress(job.completed(), total, i, ChunkState::Downloading));
            }

            let results = join_all(
                wanted
                    .iter()
                    .map(|(index, id, expected)| self.fetch_with_retry(*index, id, *expected, &retry)),
            )
            .await;

            for ((index, _, _), result) in wanted.into_iter().zip(results) {
                let slot = index as usize;
                match result {
                    Ok(bytes) => {
                        job.chunks[slot] = Some(bytes);
                        job.states[slot] = ChunkState::Completed;
                        job.errors.remove(&index);
                    }
                    Err(e) => {
                        job.states[slot] = ChunkState::Failed;
                        job.errors.insert(index, e);
                    }
                }
                progress(chunk_progress(job.completed(), total, index, job.states[slot]));
            }

            progress(Progress::new(job.completed(), total, Phase::Downloading));
        }
    }

    async fn fetch_with_retry(
        &self,
        index: u32,
        id: &RecordId,
        expected: Option<Digest>,
        retry: &RetryPolicy,
    ) -> Result<Vec<u8>, ChunkError> {
        let attempts = retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.fetch_once(index, id, expected).await {
                Ok(bytes) => {
                    debug!("Chunk {} ({}) fetched on attempt {}", index, id, attempt);
                    return Ok(bytes);
                }
                Err(e) if attempt < attempts => {
                    let delay = retry.delay(attempt);
                    warn!(
                        "Chunk {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        index, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Chunk {} failed after {} attempts: {}", index, attempts, e);
                    return Err(e);
                }
            }
        }
    }

    /// One pass over the backends in priority order.
    async fn fetch_once(
        &self,
        index: u32,
        id: &RecordId,
        expected: Option<Digest>,
    ) -> Result<Vec<u8>, ChunkError> {
        let mut last = ChunkError::BackendUnavailable {
            index,
            backend: "none".to_string(),
            reason: "no backends configured".to_string(),
        };

        for backend in &self.backends {
            let name = backend.name();
            match fetch_from(backend.as_ref(), index, id, expected).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if matches!(e, ChunkError::TruncatedByBackend { .. }) {
                        warn!("{}", e);
                    } else {
                        debug!("{}: {}", name, e);
                    }
                    last = e;
                }
            }
        }
        Err(last)
    }

    async fn resolve_manifest(
        &self,
        main_id: RecordId,
        retry: &RetryPolicy,
    ) -> Result<Manifest, ReconstructError> {
        let attempts = retry.max_attempts.max(1);
        let mut reasons = Vec::new();

        for attempt in 1..=attempts {
            for backend in &self.backends {
                let result = match backend.fetch_record(&main_id).await {
                    Ok(raw) => Manifest::decode(&raw).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };

                match result {
                    Ok(manifest) => return Ok(manifest),
                    Err(reason) => {
                        warn!("Manifest {} from {}: {}", main_id, backend.name(), reason);
                        reasons.push(format!("{}: {}", backend.name(), reason));
                    }
                }
            }

            if attempt < attempts && !self.backends.is_empty() {
                tokio::time::sleep(retry.delay(attempt)).await;
            }
        }

        if reasons.is_empty() {
            reasons.push("no backends configured".to_string());
        }
        Err(ReconstructError::Manifest {
            id: main_id,
            reason: reasons.join("; "),
        })
    }
}

fn chunk_progress(current: u32, total: u32, index: u32, state: ChunkState) -> Progress {
    Progress::new(current, total, Phase::Chunk { index, state })
}

async fn fetch_from(
    backend: &dyn RecordQuery,
    index: u32,
    id: &RecordId,
    expected: Option<Digest>,
) -> Result<Vec<u8>, ChunkError> {
    let name = backend.name();

    let raw = backend
        .fetch_record(id)
        .await
        .map_err(|e| ChunkError::BackendUnavailable {
            index,
            backend: name.to_string(),
            reason: e.to_string(),
        })?;

    let payload = decode_chunk(&raw).map_err(|e| match e {
        FrameError::Truncated {
            offset,
            declared,
            available,
        } => ChunkError::TruncatedByBackend {
            index,
            backend: name.to_string(),
            offset,
            declared,
            available,
        },
        source => ChunkError::MalformedFraming {
            index,
            backend: name.to_string(),
            source,
        },
    })?;

    if let Some(expected) = expected {
        let actual = hash::digest(payload);
        if actual != expected {
            return Err(ChunkError::IntegrityFailure {
                index,
                backend: name.to_string(),
                expected,
                actual,
            });
        }
    }
    Ok(payload.to_vec())
}
