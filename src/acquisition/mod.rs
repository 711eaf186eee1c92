//! Detection frame acquisition
//!
//! Camera capture, perspective warp and segmentation live outside this crate.
//! Workers only see their result: the hulls detected in one frame for one
//! approach, delivered through [`FrameSource`].

mod replay;
mod synthetic;

pub use replay::ReplaySource;
pub use synthetic::{SyntheticSettings, SyntheticSource};

use crate::types::{ApproachKind, Polygon};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to read frames from {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{path}:{line}: malformed frame: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame source {0} has no frames")]
    Empty(String),
}

/// Where an approach's detections come from.
///
/// Implementations handle pacing and decoding internally. A worker calls
/// [`next_detections`](FrameSource::next_detections) once per sense step.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Hulls detected in the next frame for `approach_id`.
    async fn next_detections(&mut self, approach_id: usize)
        -> Result<Vec<Polygon>, AcquisitionError>;

    /// Human-readable name for logging (e.g. "replay", "synthetic").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Source selection (config)
// ============================================================================

/// Frame source declared for one approach in the junction config.
///
/// ```toml
/// source = { type = "replay", path = "frames/north.jsonl" }
/// source = { type = "synthetic", seed = 7 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Replay { path: PathBuf },
    Synthetic {
        #[serde(default)]
        seed: u64,
        #[serde(flatten)]
        settings: SyntheticSettings,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic {
            seed: 0,
            settings: SyntheticSettings::default(),
        }
    }
}

impl SourceConfig {
    /// Open the declared source for an approach of the given kind.
    pub fn open(&self, kind: ApproachKind) -> Result<Box<dyn FrameSource>, AcquisitionError> {
        match self {
            SourceConfig::Replay { path } => Ok(Box::new(ReplaySource::open(path)?)),
            SourceConfig::Synthetic { seed, settings } => {
                Ok(Box::new(SyntheticSource::new(kind, settings.clone(), *seed)))
            }
        }
    }
}
