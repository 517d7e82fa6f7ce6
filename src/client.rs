use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};
use thiserror::Error;

use ccore::hash::{self, Digest};
use ccore::id::RecordId;
use remote::sql::SqlRemote;
use remote::{Remote, RemoteError};

use crate::cache::{CacheStats, ReconstructionCache};
use crate::config::{BackendType, Config, ConfigError};
use crate::envelope::StoreError;
use crate::ledger::http::HttpQuery;
use crate::ledger::store::StoreLedger;
use crate::ledger::{LedgerError, RecordQuery};
use crate::progress::Progress;
use crate::reconstruct::{ReconstructError, ReconstructOptions, Reconstructed, ReconstructionEngine};
use crate::session::{SessionStore, UploadSession};
use crate::sizing;
use crate::transmit::{TransmitError, TransmitOptions, Transmitted, Transmitter};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transmit(#[from] TransmitError),
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no session for {0}")]
    UnknownSession(Digest),
    #[error("file does not match session {expected}, it hashes to {actual}")]
    HashMismatch { expected: Digest, actual: Digest },
}

type Ledger<R> = Rc<StoreLedger<Rc<R>>>;

/// Everything wired together over one store: local ledger, sessions and
/// cache.
pub struct Chainfile<R: Remote + 'static> {
    config: Config,
    transmitter: Transmitter<Ledger<R>, Rc<R>>,
    engine: ReconstructionEngine<Rc<R>>,
}

impl Chainfile<SqlRemote> {
    pub fn open(config: Config) -> Result<Self, ClientError> {
        let remote = SqlRemote::new(config.database.as_deref())?;
        Chainfile::new(remote, config)
    }
}

impl<R: Remote + 'static> Chainfile<R> {
    pub fn new(remote: R, config: Config) -> Result<Self, ClientError> {
        let remote = Rc::new(remote);
        let ledger = Rc::new(
            StoreLedger::new("local", remote.clone())?.with_max_record(sizing::RECORD_CEILING),
        );

        let mut backends: Vec<Box<dyn RecordQuery>> = Vec::new();
        for backend in &config.backends {
            match (backend.backend_type, &backend.url) {
                (BackendType::Local, _) => backends.push(Box::new(ledger.clone())),
                (BackendType::Http, Some(url)) => {
                    backends.push(Box::new(HttpQuery::new(&backend.name, url, backend.format)?))
                }
                (BackendType::Http, None) => {
                    return Err(ConfigError::MissingUrl(backend.name.clone()).into())
                }
            }
        }

        let sessions =
            SessionStore::new(remote.clone()).with_max_sessions(config.sessions.max_sessions);
        let mut cache = ReconstructionCache::new(remote.clone())
            .with_limits(config.cache.max_size_bytes, config.max_age());
        cache.load()?;

        Ok(Chainfile {
            transmitter: Transmitter::new(ledger, sessions),
            engine: ReconstructionEngine::new(backends, cache),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn put_file(
        &self,
        path: &Path,
        opts: &TransmitOptions,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Transmitted, ClientError> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.put(&name, &data, opts, progress).await
    }

    pub async fn put(
        &self,
        name: &str,
        data: &[u8],
        opts: &TransmitOptions,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Transmitted, ClientError> {
        Ok(self
            .transmitter
            .begin_or_resume(name, data, opts, progress)
            .await?)
    }

    /// Reconstruct `main_id`, checking chunks against a local session when
    /// one uploaded it.
    pub async fn get(
        &mut self,
        main_id: RecordId,
        verify: bool,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Reconstructed, ClientError> {
        let expected_digests = if verify {
            self.list_sessions()?
                .into_iter()
                .find(|s| s.main_record_id == Some(main_id))
                .and_then(|s| s.chunk_digests())
        } else {
            None
        };
        if verify && expected_digests.is_none() {
            info!("No local digests for {}, chunks are not verified", main_id);
        }

        let options = ReconstructOptions {
            concurrency: self.config.concurrency,
            verify,
            retry: self.config.retry.policy(),
            expected_digests,
        };
        Ok(self.engine.reconstruct(main_id, options, progress).await?)
    }

    pub fn list_sessions(&self) -> Result<Vec<UploadSession>, ClientError> {
        Ok(self.transmitter.sessions().get_all()?)
    }

    /// Pick an unfinished session back up, `data` must be the same bytes.
    pub async fn resume_session(
        &self,
        file_hash: &Digest,
        data: &[u8],
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Transmitted, ClientError> {
        let session = self
            .transmitter
            .sessions()
            .get(file_hash)?
            .ok_or(ClientError::UnknownSession(*file_hash))?;

        let actual = hash::digest(data);
        if actual != *file_hash {
            return Err(ClientError::HashMismatch {
                expected: *file_hash,
                actual,
            });
        }

        let opts = TransmitOptions {
            concurrency: self.config.concurrency,
            mime_type: Some(session.mime_type.clone()),
            compress: session.compression.is_some(),
            ..TransmitOptions::default()
        };
        self.put(&session.file_name, data, &opts, progress).await
    }

    pub fn pause_session(&self, file_hash: &Digest) -> Result<bool, ClientError> {
        Ok(self.transmitter.pause(file_hash)?)
    }

    pub fn delete_session(&self, file_hash: &Digest) -> Result<(), ClientError> {
        if self.transmitter.sessions().get(file_hash)?.is_none() {
            warn!("No session for {}", file_hash);
        }
        Ok(self.transmitter.sessions().delete(file_hash)?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache().stats()
    }

    pub fn clear_cache(&mut self) -> Result<(), ClientError> {
        Ok(self.engine.cache_mut().clear()?)
    }
}
