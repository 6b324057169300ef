//! Selection of the conversion queue for a job.

use std::fmt;

use vocalis_core::config::QueueConfig;
use vocalis_entity::conversion::ConversionJob;

/// The three conversion queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Full-length, untransposed conversions.
    Main,
    /// Any transposed conversion, full or preview.
    Alt,
    /// Untransposed preview clips.
    Preview,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Alt => write!(f, "alt"),
            Self::Preview => write!(f, "preview"),
        }
    }
}

/// Maps jobs to logical queue names.
#[derive(Debug, Clone)]
pub struct QueueRouter {
    main: String,
    alt: String,
    preview: String,
}

impl QueueRouter {
    /// Build a router from the configured queue names.
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            main: config.main_queue.clone(),
            alt: config.alt_queue.clone(),
            preview: config.preview_queue.clone(),
        }
    }

    /// Pick the queue for `job`. Pitch wins over `use_preview`: a
    /// transposed preview goes to the alt queue.
    pub fn route(&self, job: &ConversionJob) -> QueueKind {
        if job.pitch_shift.is_transposed() {
            QueueKind::Alt
        } else if job.use_preview {
            QueueKind::Preview
        } else {
            QueueKind::Main
        }
    }

    /// Logical name of `kind`.
    pub fn queue_name(&self, kind: QueueKind) -> &str {
        match kind {
            QueueKind::Main => &self.main,
            QueueKind::Alt => &self.alt,
            QueueKind::Preview => &self.preview,
        }
    }
}
