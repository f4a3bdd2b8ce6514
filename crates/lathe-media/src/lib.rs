//! Media I/O for the Lathe audio editor
//!
//! File decoding, WAV export, sample rate conversion and the
//! background loader that feeds decoded material to the engine.

pub mod decode;
pub mod encode;
pub mod error;
pub mod loader;
pub mod resample;

pub use decode::{decode_file, DecodedAudio};
pub use encode::{write_wav, WavFormat};
pub use error::{MediaError, MediaResult};
pub use loader::{LoadResult, LoadResultReceiver, LoadedAudio, MediaLoader};
pub use resample::resample;
