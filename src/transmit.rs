//! Upload side: slice a file into chunk records, commit them, then commit the
//! manifest that orders them.
//!
//! Every state change is written to the [`SessionStore`] before moving on,
//! so a rerun for the same bytes only submits what is still missing.
use std::io;
use std::path::Path;

use futures::future::join_all;
use log::{debug, error, info, warn};
use thiserror::Error;

use ccore::hash::{self, Digest};
use ccore::id::RecordId;
use cframe::record::encode_chunk;
use cframe::{ContentInfo, FrameError, Manifest};
use remote::Remote;

use crate::chunk::{chunk_count, Chunker};
use crate::envelope::StoreError;
use crate::ledger::{LedgerError, LedgerSubmit};
use crate::progress::{Phase, Progress};
use crate::session::{ChunkCommit, SessionStatus, SessionStore, UploadSession};
use crate::sizing::{guess_mime, SizingError, SizingPolicy};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const ZSTD: &str = "zstd";
const COMPRESSION_LEVEL: i32 = 19;

#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("{completed} of {total} chunks committed, rerun to resume")]
    Incomplete { completed: u32, total: u32 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    InvalidChunkSize(#[from] SizingError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct TransmitOptions {
    pub policy: SizingPolicy,
    pub concurrency: usize,
    /// zstd the whole file before chunking
    pub compress: bool,
    /// Guessed from the file name when unset
    pub mime_type: Option<String>,
    pub charset: Option<String>,
}

impl Default for TransmitOptions {
    fn default() -> Self {
        TransmitOptions {
            policy: SizingPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            compress: false,
            mime_type: None,
            charset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmitted {
    pub main_id: RecordId,
    pub file_hash: Digest,
    pub total_chunks: u32,
    pub chunk_size: u32,
}

pub struct Transmitter<L: LedgerSubmit, R: Remote> {
    ledger: L,
    sessions: SessionStore<R>,
}

impl<L: LedgerSubmit, R: Remote> Transmitter<L, R> {
    pub fn new(ledger: L, sessions: SessionStore<R>) -> Self {
        Transmitter { ledger, sessions }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn sessions(&self) -> &SessionStore<R> {
        &self.sessions
    }

    /// Upload `data` under `file_name`, picking up any earlier session for
    /// the same bytes.
    pub async fn begin_or_resume(
        &self,
        file_name: &str,
        data: &[u8],
        opts: &TransmitOptions,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Transmitted, TransmitError> {
        progress(Progress::new(0, 1, Phase::Hashing));
        let file_hash = hash::digest(data);
        progress(Progress::new(1, 1, Phase::Hashing));

        let existing = self.sessions.get(&file_hash)?;
        if let Some(session) = &existing {
            if let (SessionStatus::Completed, Some(main_id)) =
                (session.status, session.main_record_id)
            {
                info!("{} already on the ledger as {}", file_name, main_id);
                progress(Progress::new(
                    session.total_chunks,
                    session.total_chunks,
                    Phase::Done,
                ));
                return Ok(transmitted(session, main_id));
            }
        }

        let (mut session, payload) = match existing {
            Some(session) => match self.resume_payload(&session, data)? {
                Some(payload) => {
                    info!(
                        "Resuming {} ({}/{} chunks committed)",
                        session.session_id,
                        session.committed.len(),
                        session.total_chunks
                    );
                    (session, payload)
                }
                None => self.fresh(file_name, file_hash, data, opts)?,
            },
            None => self.fresh(file_name, file_hash, data, opts)?,
        };

        session.status = SessionStatus::Uploading;
        self.sessions.save(&mut session)?;

        self.upload_chunks(&mut session, &payload, opts.concurrency, progress)
            .await?;

        if !session.all_chunks_committed() {
            let completed = session.committed.len() as u32;
            let total = session.total_chunks;
            error!(
                "{}: {} of {} chunks still pending",
                session.session_id,
                total - completed,
                total
            );

            session.status = SessionStatus::Failed;
            self.sessions.save(&mut session)?;
            return Err(TransmitError::Incomplete { completed, total });
        }

        let main_id = self
            .commit_manifest(&mut session, opts.charset.clone(), progress)
            .await?;
        Ok(transmitted(&session, main_id))
    }

    /// Mark an unfinished session as paused, false when there is nothing to
    /// pause.
    pub fn pause(&self, file_hash: &Digest) -> Result<bool, TransmitError> {
        match self.sessions.get(file_hash)? {
            Some(mut session) if session.is_resumable() => {
                session.status = SessionStatus::Paused;
                self.sessions.save(&mut session)?;
                info!("Paused {}", session.session_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn fresh(
        &self,
        file_name: &str,
        file_hash: Digest,
        data: &[u8],
        opts: &TransmitOptions,
    ) -> Result<(UploadSession, Vec<u8>), TransmitError> {
        let mime = match &opts.mime_type {
            Some(mime) => mime.clone(),
            None => guess_mime(Path::new(file_name)).to_string(),
        };
        let chunk_size = opts.policy.resolve(&mime, data.len() as u64)?;

        let (payload, compression) = if opts.compress {
            let packed = zstd::stream::encode_all(data, COMPRESSION_LEVEL)?;
            debug!("Compressed {} to {} bytes", data.len(), packed.len());
            (packed, Some(ZSTD.to_string()))
        } else {
            (data.to_vec(), None)
        };

        let total = chunk_count(payload.len() as u64, chunk_size);
        let mut session = UploadSession::new(
            file_hash,
            file_name,
            data.len() as u64,
            &mime,
            chunk_size as u32,
            compression,
            total,
            self.sessions.now(),
        );
        if session.compression.is_some() {
            session.payload_hash = hash::digest(&payload);
        }
        info!(
            "New session {} for {}: {} chunks of {} bytes",
            session.session_id, file_name, total, chunk_size
        );
        Ok((session, payload))
    }

    /// Rebuild the exact bytes a stored session was chunking, None when they
    /// no longer line up with it.
    fn resume_payload(
        &self,
        session: &UploadSession,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>, TransmitError> {
        let payload = match session.compression.as_deref() {
            None => data.to_vec(),
            Some(ZSTD) => zstd::stream::encode_all(data, COMPRESSION_LEVEL)?,
            Some(other) => {
                warn!("Session {} uses unknown compression {}", session.session_id, other);
                return Ok(None);
            }
        };

        if session.chunk_size == 0
            || chunk_count(payload.len() as u64, session.chunk_size as usize) != session.total_chunks
        {
            warn!(
                "Session {} no longer matches its file, starting over",
                session.session_id
            );
            return Ok(None);
        }

        // A different compressor build can give other bytes of the same length
        let payload_hash = hash::digest(&payload);
        if payload_hash != session.payload_hash {
            warn!(
                "Session {} chunked {}, these bytes give {}, starting over",
                session.session_id, session.payload_hash, payload_hash
            );
            return Ok(None);
        }
        Ok(Some(payload))
    }

    async fn upload_chunks(
        &self,
        session: &mut UploadSession,
        payload: &[u8],
        concurrency: usize,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(), TransmitError> {
        let total = session.total_chunks;
        let chunk_size = session.chunk_size as usize;

        let done = session.completed_chunks();
        progress(Progress::new(done.len() as u32, total, Phase::Uploading));

        let mut pending = Chunker::new(payload, chunk_size).filter(|chunk| match chunk {
            Ok((index, _)) => !done.contains(index),
            Err(_) => true,
        });

        loop {
            let mut records = Vec::with_capacity(concurrency.max(1));
            for chunk in pending.by_ref().take(concurrency.max(1)) {
                let (index, bytes) = chunk?;
                records.push((index, hash::digest(&bytes), encode_chunk(&bytes)?));
            }
            if records.is_empty() {
                break;
            }

            let ledger = &self.ledger;
            let results = join_all(records.iter().map(|(index, digest, record)| async move {
                (*index, *digest, ledger.submit(record).await)
            }))
            .await;

            for (index, digest, result) in results {
                match result {
                    Ok(id) => {
                        debug!("Chunk {}/{} committed as {}", index + 1, total, id);
                        session.mark_chunk(index, ChunkCommit { id, digest });
                        self.sessions.save(session)?;
                    }
                    Err(e) => warn!("Chunk {}/{} failed: {}", index + 1, total, e),
                }
            }

            progress(Progress::new(
                session.committed.len() as u32,
                total,
                Phase::Uploading,
            ));
        }
        Ok(())
    }

    async fn commit_manifest(
        &self,
        session: &mut UploadSession,
        charset: Option<String>,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<RecordId, TransmitError> {
        let total = session.total_chunks;
        progress(Progress::new(0, 1, Phase::Manifest));

        let refs = session.chunk_refs().unwrap_or_default();
        let manifest = Manifest::new(
            ContentInfo {
                mime_type: session.mime_type.clone(),
                charset,
                filename: Some(session.file_name.clone()),
                compression: session.compression.clone(),
            },
            refs,
        );
        let record = manifest.encode()?;

        match self.ledger.submit(&record).await {
            Ok(main_id) => {
                session.main_record_id = Some(main_id);
                session.status = SessionStatus::Completed;
                self.sessions.save(session)?;

                info!(
                    "{} committed as {} ({} chunks)",
                    session.file_name, main_id, total
                );
                progress(Progress::new(1, 1, Phase::Manifest));
                progress(Progress::new(total, total, Phase::Done));
                Ok(main_id)
            }
            Err(e) => {
                error!("Manifest for {} failed: {}", session.session_id, e);
                session.status = SessionStatus::Failed;
                self.sessions.save(session)?;
                Err(e.into())
            }
        }
    }
}

fn transmitted(session: &UploadSession, main_id: RecordId) -> Transmitted {
    Transmitted {
        main_id,
        file_hash: session.file_hash,
        total_chunks: session.total_chunks,
        chunk_size: session.chunk_size,
    }
}
