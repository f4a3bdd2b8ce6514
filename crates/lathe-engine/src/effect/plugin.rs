//! Plugin chain stage
//!
//! The one open seam in the otherwise fixed effect chain: external
//! processors implement [`PluginProcessor`] and run in series at the
//! chain position the stage order assigns. The engine reports summed
//! plugin latency for display but does not compensate for it; preview
//! is a monitoring path, not a mixdown path.
//!
//! Chains are installed as [`basedrop::Owned`] values so replacing or
//! clearing one on the callback thread defers the actual deallocation
//! to the collector thread.

use basedrop::Owned;

use crate::types::AudioBuffer;

/// An external audio processor the preview chain can host.
///
/// `process` runs on the audio callback thread and must not allocate,
/// lock or block. Anything expensive belongs in `prepare`, which the
/// controller calls before the chain is handed to the engine.
pub trait PluginProcessor: Send {
    /// Display name for the UI chain list.
    fn name(&self) -> &str;

    /// Called off the audio thread before installation and again from
    /// the engine when the device rate changes.
    fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        let _ = (sample_rate, max_block);
    }

    /// Process one block in place.
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Samples of delay this processor introduces.
    fn latency_samples(&self) -> u32 {
        0
    }

    /// Drop any tails or internal history.
    fn reset(&mut self) {}
}

pub type PluginChain = Vec<Box<dyn PluginProcessor>>;

#[derive(Default)]
pub struct PluginStage {
    chain: Option<Owned<PluginChain>>,
}

impl PluginStage {
    pub fn new() -> Self {
        Self { chain: None }
    }

    /// Install a prepared chain, retiring the previous one.
    pub fn install(&mut self, chain: Owned<PluginChain>) {
        self.chain = Some(chain);
    }

    /// Remove the chain, deferring its drop to the collector.
    pub fn clear(&mut self) {
        self.chain = None;
    }

    pub fn is_empty(&self) -> bool {
        self.chain.as_ref().map_or(true, |c| c.is_empty())
    }

    /// Re-run `prepare` on every hosted processor. Used when the device
    /// rate changes underneath an installed chain.
    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        if let Some(chain) = &mut self.chain {
            for plugin in chain.iter_mut() {
                plugin.prepare(sample_rate, max_block);
            }
        }
    }

    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        if let Some(chain) = &mut self.chain {
            for plugin in chain.iter_mut() {
                plugin.process(buffer);
            }
        }
    }

    /// Summed latency of the hosted processors.
    pub fn latency_samples(&self) -> u32 {
        self.chain
            .as_ref()
            .map_or(0, |c| c.iter().map(|p| p.latency_samples()).sum())
    }

    pub fn reset(&mut self) {
        if let Some(chain) = &mut self.chain {
            for plugin in chain.iter_mut() {
                plugin.reset();
            }
        }
    }
}
