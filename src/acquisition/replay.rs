//! JSON-lines frame replay
//!
//! One frame per line, each a JSON array of polygons:
//! `[[[0,0],[10,0],[10,10],[0,10]], [[40,5],[52,5],[52,18],[40,18]]]`.
//! Blank lines are skipped. Playback loops when the end is reached.

use super::{AcquisitionError, FrameSource};
use crate::types::Polygon;
use async_trait::async_trait;
use std::path::Path;

pub struct ReplaySource {
    name: String,
    frames: Vec<Vec<Polygon>>,
    cursor: usize,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self, AcquisitionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Io(path.to_path_buf(), e))?;

        let mut frames = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Vec<Polygon> =
                serde_json::from_str(line).map_err(|source| AcquisitionError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })?;
            frames.push(frame);
        }

        if frames.is_empty() {
            return Err(AcquisitionError::Empty(path.display().to_string()));
        }

        tracing::info!(path = %path.display(), frames = frames.len(), "Loaded replay frames");
        Ok(Self {
            name: format!("replay:{}", path.display()),
            frames,
            cursor: 0,
        })
    }

    /// In-memory replay, mostly for scripted runs.
    pub fn from_frames(frames: Vec<Vec<Polygon>>) -> Self {
        Self {
            name: "replay:memory".to_string(),
            frames,
            cursor: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_detections(&mut self, _approach_id: usize) -> Result<Vec<Polygon>, AcquisitionError> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn replays_file_frames_in_a_loop() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[[0,0],[10,0],[10,10],[0,10]]]").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "[]").unwrap();

        let mut src = ReplaySource::open(file.path()).unwrap();
        assert_eq!(src.frame_count(), 2);
        assert_eq!(src.next_detections(0).await.unwrap().len(), 1);
        assert!(src.next_detections(0).await.unwrap().is_empty());
        assert_eq!(src.next_detections(0).await.unwrap().len(), 1);
    }

    #[test]
    fn reports_line_of_malformed_frame() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[]").unwrap();
        writeln!(file, "not json").unwrap();

        match ReplaySource::open(file.path()) {
            Err(AcquisitionError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other.map(|s| s.frame_count())),
        }
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            ReplaySource::open(file.path()),
            Err(AcquisitionError::Empty(_))
        ));
    }
}
