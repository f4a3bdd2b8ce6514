//! Background file loader
//!
//! Decodes and rate-converts files off the UI thread. Designed for
//! message-driven UIs: queue loads with [`MediaLoader::load`], receive
//! [`LoadResult`] messages through [`MediaLoader::result_receiver`],
//! no polling needed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use lathe_engine::source::{ActiveSource, SourceBuffer};

use crate::decode::decode_file;
use crate::error::MediaResult;
use crate::resample::resample;

/// A fully loaded file, ready to hand to the engine.
pub struct LoadedAudio {
    /// Engine-ready source at the device rate.
    pub source: ActiveSource,
    /// Rate the buffer was converted to.
    pub sample_rate: u32,
    /// Rate the file was recorded at.
    pub file_sample_rate: u32,
    /// Bit depth of the file, when the container declares one.
    pub bits_per_sample: Option<u32>,
    pub frames: u64,
    pub channels: usize,
}

/// Result of a queued load
pub struct LoadResult {
    pub path: PathBuf,
    pub result: Result<LoadedAudio, String>,
}

/// Clonable receiver wrapper for use in UI subscriptions
pub type LoadResultReceiver = Arc<Mutex<Receiver<LoadResult>>>;

/// Background media loader
///
/// Spawns a worker thread that decodes files and converts them to the
/// engine's sample rate, one request at a time in queue order.
pub struct MediaLoader {
    request_tx: Sender<PathBuf>,
    result_rx: LoadResultReceiver,
    sample_rate: Arc<AtomicU32>,
    _handle: JoinHandle<()>,
}

impl MediaLoader {
    /// Spawn the loader for a given engine sample rate.
    pub fn new(sample_rate: u32) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<PathBuf>();
        let (result_tx, result_rx) = mpsc::channel::<LoadResult>();

        let rate = Arc::new(AtomicU32::new(sample_rate));
        let rate_clone = rate.clone();

        let handle = thread::Builder::new()
            .name("media-loader".to_string())
            .spawn(move || {
                loader_thread(request_rx, result_tx, rate_clone);
            })
            .expect("Failed to spawn media loader thread");

        log::info!("MediaLoader spawned, target rate {} Hz", sample_rate);

        Self {
            request_tx,
            result_rx: Arc::new(Mutex::new(result_rx)),
            sample_rate: rate,
            _handle: handle,
        }
    }

    /// Clonable handle to the result channel for subscriptions.
    pub fn result_receiver(&self) -> LoadResultReceiver {
        self.result_rx.clone()
    }

    /// Retarget future loads, e.g. after the output device changes.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::SeqCst);
    }

    /// Queue a file for loading (non-blocking).
    pub fn load(&self, path: PathBuf) -> Result<(), String> {
        self.request_tx
            .send(path)
            .map_err(|e| format!("Loader thread disconnected: {}", e))
    }

    /// Try to receive a single result (non-blocking).
    pub fn try_recv(&self) -> Option<LoadResult> {
        self.result_rx.lock().ok().and_then(|rx| rx.try_recv().ok())
    }
}

fn loader_thread(rx: Receiver<PathBuf>, tx: Sender<LoadResult>, sample_rate: Arc<AtomicU32>) {
    log::info!("Media loader thread started");

    while let Ok(path) = rx.recv() {
        let rate = sample_rate.load(Ordering::SeqCst);
        let result = handle_load(&path, rate).map_err(|e| e.to_string());
        if tx.send(LoadResult { path, result }).is_err() {
            break;
        }
    }

    log::info!("Media loader thread exiting");
}

fn handle_load(path: &Path, target_rate: u32) -> MediaResult<LoadedAudio> {
    let start = std::time::Instant::now();

    let decoded = decode_file(path)?;
    let bits_per_sample = decoded.bits_per_sample;
    let buffer = decoded.buffer;
    let file_sample_rate = buffer.sample_rate();
    let channels = buffer.channels();

    let source = if file_sample_rate == target_rate {
        buffer
    } else {
        let converted = resample(buffer.audio(), file_sample_rate, target_rate)?;
        SourceBuffer::new(converted, target_rate)
    };

    let frames = source.frames();
    log::info!(
        "Loaded {:?} in {:.1?}: {} frames at {} Hz",
        path,
        start.elapsed(),
        frames,
        target_rate
    );

    Ok(LoadedAudio {
        source: ActiveSource::file(path.to_path_buf(), source.into_shared()),
        sample_rate: target_rate,
        file_sample_rate,
        bits_per_sample,
        frames,
        channels,
    })
}
