use std::fmt;

/// Where one chunk of a download stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkState::Pending => write!(f, "pending"),
            ChunkState::Downloading => write!(f, "downloading"),
            ChunkState::Completed => write!(f, "completed"),
            ChunkState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hashing,
    Uploading,
    Manifest,
    Resolving,
    Downloading,
    /// Chunk `index` of a download moved to `state`
    Chunk { index: u32, state: ChunkState },
    Assembling,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Hashing => write!(f, "hashing"),
            Phase::Uploading => write!(f, "uploading"),
            Phase::Manifest => write!(f, "manifest"),
            Phase::Resolving => write!(f, "resolving"),
            Phase::Downloading => write!(f, "downloading"),
            Phase::Chunk { index, state } => write!(f, "chunk {} {}", index, state),
            Phase::Assembling => write!(f, "assembling"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// `current` out of `total` chunks are done for `phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub phase: Phase,
}

impl Progress {
    pub fn new(current: u32, total: u32, phase: Phase) -> Self {
        Progress {
            current,
            total,
            phase,
        }
    }

    /// The chunk index and state when this is a per-chunk update.
    pub fn chunk(&self) -> Option<(u32, ChunkState)> {
        match self.phase {
            Phase::Chunk { index, state } => Some((index, state)),
            _ => None,
        }
    }
}

/// Progress sink for callers that do not care.
pub fn ignore(_: Progress) {}
