//! In-memory audio for sample channels
//!
//! Decoding is somebody else's job: a [`WaveLoader`] turns a path into a
//! [`Wave`] and the engine only stores and plays the result.

use std::path::{Path, PathBuf};

use crate::types::{Frame, StereoBuffer, StereoSample, WaveId};

/// Decoded stereo audio
#[derive(Debug, Clone)]
pub struct Wave {
    pub id: WaveId,
    pub path: PathBuf,
    pub sample_rate: u32,
    buffer: StereoBuffer,
}

impl Wave {
    pub fn new(id: WaveId, path: impl Into<PathBuf>, sample_rate: u32, buffer: StereoBuffer) -> Self {
        Self {
            id,
            path: path.into(),
            sample_rate,
            buffer,
        }
    }

    /// Length in frames
    #[inline]
    pub fn len(&self) -> Frame {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn frame(&self, index: Frame) -> StereoSample {
        if index < self.buffer.len() {
            self.buffer[index]
        } else {
            StereoSample::silence()
        }
    }

    pub fn buffer(&self) -> &StereoBuffer {
        &self.buffer
    }

    /// File name without directories, used for display and missing reports
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Layer `take` over `base`; the result is as long as the longer of the two
pub fn overdub(base: &StereoBuffer, take: &StereoBuffer) -> StereoBuffer {
    let mut mixed = StereoBuffer::silence(base.len().max(take.len()));
    for (i, frame) in mixed.iter_mut().enumerate() {
        if i < base.len() {
            *frame += base[i];
        }
        if i < take.len() {
            *frame += take[i];
        }
    }
    mixed
}

/// Decodes audio files into waves
pub trait WaveLoader {
    /// Load the file at `path`; `None` when missing or undecodable
    fn load(&mut self, id: WaveId, path: &Path) -> Option<Wave>;
}

impl<F> WaveLoader for F
where
    F: FnMut(WaveId, &Path) -> Option<Wave>,
{
    fn load(&mut self, id: WaveId, path: &Path) -> Option<Wave> {
        self(id, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_is_silent() {
        let wave = Wave::new(
            WaveId(1),
            "/tmp/kick.wav",
            44100,
            StereoBuffer::from_interleaved(&[0.5, 0.5, 1.0, 1.0]),
        );
        assert_eq!(wave.len(), 2);
        assert_eq!(wave.frame(1).left, 1.0);
        assert_eq!(wave.frame(2), StereoSample::silence());
        assert_eq!(wave.basename(), "kick.wav");
    }

    #[test]
    fn test_overdub_sums_and_extends() {
        let base = StereoBuffer::from_interleaved(&[0.25, 0.25, 0.5, 0.5]);
        let take = StereoBuffer::from_interleaved(&[0.25, 0.0, 0.25, 0.0, 0.75, 0.75]);
        let mixed = overdub(&base, &take);
        assert_eq!(mixed.len(), 3);
        assert_eq!(mixed[0], StereoSample::new(0.5, 0.25));
        assert_eq!(mixed[1], StereoSample::new(0.75, 0.5));
        assert_eq!(mixed[2], StereoSample::new(0.75, 0.75));
    }
}
