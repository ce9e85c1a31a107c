//! Common types for Loopgrid
//!
//! This module contains the fundamental audio and identity types used
//! throughout the engine: stereo buffers, frame positions, and the stable
//! ids that tie versioned values to their shared real-time state.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Default sample rate (the driver may run at anything else)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Maximum block size to pre-allocate for real-time safety
///
/// Covers all common driver configurations (64 ... 4096). Every per-channel
/// scratch buffer is allocated with this capacity so the audio callback
/// only ever changes the working length.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default block size used before the driver reports its own
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// Tempo range, in beats per minute
pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 999.0;
pub const DEFAULT_BPM: f32 = 120.0;

/// Time signature limits
pub const MAX_BEATS: u32 = 32;
pub const DEFAULT_BEATS: u32 = 4;
pub const DEFAULT_BARS: u32 = 1;

/// Quantizer subdivisions per beat (0 = off)
pub const MAX_QUANTIZE: u32 = 8;
pub const DEFAULT_QUANTIZE: u32 = 0;

pub const DEFAULT_VOLUME: f32 = 1.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const DEFAULT_PAN: f32 = 0.5;
pub const DEFAULT_PITCH: f32 = 1.0;
pub const MIN_PITCH: f32 = 0.1;
pub const MAX_PITCH: f32 = 4.0;
pub const MAX_VELOCITY: u8 = 127;

/// Input level (dBFS) that starts a signal-triggered input take
pub const DEFAULT_REC_TRIGGER_LEVEL: f32 = -10.0;
pub const MIN_REC_TRIGGER_LEVEL: f32 = -60.0;

/// Audio sample type
pub type Sample = f32;

/// A position or length on the frame grid
pub type Frame = usize;

/// Stable channel identifier
///
/// The id outlives every Document version: all copies of a channel carry the
/// same id and point at the same shared real-time state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Master output channel (always present)
    pub const MASTER_OUT: ChannelId = ChannelId(1);
    /// Master input channel (always present)
    pub const MASTER_IN: ChannelId = ChannelId(2);
    /// Sample preview channel (always present)
    pub const PREVIEW: ChannelId = ChannelId(3);
    /// First id handed out to user channels
    pub const FIRST_USER: u32 = 4;
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable wave identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveId(pub u32);

/// Stable plugin identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub u32);

/// Monotonic id generator for the control thread
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    pub fn new(first: u32) -> Self {
        Self { next: first }
    }

    /// Hand out the next id
    pub fn generate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Make sure ids loaded from a project are never handed out again
    pub fn reserve(&mut self, id: u32) {
        if id >= self.next {
            self.next = id + 1;
        }
    }
}

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Linear interpolation towards `other`
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// Per-side gains for a pan position (0.0 = left, 0.5 = center, 1.0 = right)
///
/// The center keeps both sides at unity; moving away attenuates the opposite
/// side linearly.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(0.0, 1.0);
    if pan <= 0.5 {
        (1.0, pan * 2.0)
    } else {
        ((1.0 - pan) * 2.0, 1.0)
    }
}

/// Number of frames in one beat at the given tempo
pub fn beat_to_frames(beats: f32, sample_rate: u32, bpm: f32) -> Frame {
    (beats as f64 * (60.0 / bpm as f64) * sample_rate as f64) as Frame
}

/// Tempo implied by a beat length in frames
pub fn frames_to_bpm(frames_in_beat: Frame, sample_rate: u32) -> f32 {
    if frames_in_beat == 0 {
        return 0.0;
    }
    (60.0 / (frames_in_beat as f64 / sample_rate as f64)) as f32
}

/// A buffer of stereo samples
///
/// This is the primary audio buffer type: channel scratch buffers, the
/// driver's input and output, and decoded waves all use it.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new empty buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never allocates as long as `new_len <= capacity`; newly exposed
    /// elements are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let new_len = new_len.min(self.samples.capacity());
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Get a zero-copy mutable view of samples as interleaved f32
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    /// Add another buffer into this one with per-side gains
    ///
    /// Sums over the shorter of the two lengths.
    pub fn add_scaled(&mut self, other: &StereoBuffer, left_gain: Sample, right_gain: Sample) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            dst.left += src.left * left_gain;
            dst.right += src.right * right_gain;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Copy from another buffer without growing past capacity
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        let len = other.samples.len().min(self.samples.capacity());
        self.set_len_from_capacity(len);
        self.samples[..len].copy_from_slice(&other.samples[..len]);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
