//! Playback sources
//!
//! Everything the transport plays from is decoded to RAM first. A
//! [`SourceBuffer`] is immutable once built; edits produce a fresh
//! buffer which is swapped in whole, so the callback thread never sees
//! sample data change underneath it. Buffers are reference counted via
//! [`basedrop::Shared`] and reclaimed off the audio thread by the
//! collector in [`crate::engine::gc`].

use std::path::{Path, PathBuf};

use basedrop::Shared;

use crate::engine::gc_handle;
use crate::types::{AudioBuffer, Sample};

/// Immutable decoded audio plus the rate it was decoded at.
pub struct SourceBuffer {
    data: AudioBuffer,
    sample_rate: u32,
}

impl SourceBuffer {
    pub fn new(data: AudioBuffer, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.data.frames() as u64
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.data.channels()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn channel(&self, channel: usize) -> &[Sample] {
        self.data.channel(channel)
    }

    pub fn audio(&self) -> &AudioBuffer {
        &self.data
    }

    /// Copy `frames` samples starting at `src_pos` into `out` at
    /// `dst_offset`, channel for channel. The request must lie within
    /// both buffers; the pull loop in the engine guarantees that.
    pub fn read_into(
        &self,
        out: &mut AudioBuffer,
        dst_offset: usize,
        src_pos: u64,
        frames: usize,
    ) {
        let start = src_pos as usize;
        debug_assert!(start + frames <= self.data.frames());
        debug_assert!(dst_offset + frames <= out.frames());
        let channels = out.channels().min(self.data.channels());
        for c in 0..channels {
            let src = &self.data.channel(c)[start..start + frames];
            out.channel_mut(c)[dst_offset..dst_offset + frames].copy_from_slice(src);
        }
    }

    /// Wrap in a `Shared` handle tied to the engine collector.
    pub fn into_shared(self) -> Shared<SourceBuffer> {
        Shared::new(&gc_handle(), self)
    }
}

/// What the transport is currently playing.
///
/// A closed set on purpose: a file loaded from disk or the editor's
/// in-memory working buffer. Both are plain RAM playback; the variant
/// records provenance for logging and the UI title bar.
pub enum ActiveSource {
    /// A file decoded from disk, untouched since load.
    File {
        buffer: Shared<SourceBuffer>,
        path: PathBuf,
    },
    /// The editor's working buffer, typically re-sent after each edit.
    Memory { buffer: Shared<SourceBuffer> },
}

impl ActiveSource {
    pub fn file(path: impl Into<PathBuf>, buffer: Shared<SourceBuffer>) -> Self {
        ActiveSource::File {
            buffer,
            path: path.into(),
        }
    }

    pub fn memory(buffer: Shared<SourceBuffer>) -> Self {
        ActiveSource::Memory { buffer }
    }

    pub fn buffer(&self) -> &SourceBuffer {
        match self {
            ActiveSource::File { buffer, .. } => buffer,
            ActiveSource::Memory { buffer } => buffer,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ActiveSource::File { path, .. } => Some(path),
            ActiveSource::Memory { .. } => None,
        }
    }

    /// Short description for log lines.
    pub fn label(&self) -> String {
        match self {
            ActiveSource::File { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ActiveSource::Memory { .. } => "working buffer".to_string(),
        }
    }
}
