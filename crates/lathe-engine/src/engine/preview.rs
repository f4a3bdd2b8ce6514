//! Preview routing: shared flags and the effect chain router
//!
//! [`PreviewShared`] is the atomic state both threads touch directly:
//! the UI flips bypass, stage enables and solo/mute without queueing a
//! command, and the callback reads them at block granularity. The
//! [`PreviewRouter`] owns the stage rack on the callback side and runs
//! the enabled stages in the configured order.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use basedrop::{Owned, Shared};

use crate::effect::{ChainParams, PluginChain, StageKind, StageOrder, StageRack, STAGE_SLOTS};
use crate::source::SourceBuffer;
use crate::types::{AudioBuffer, PreviewMode, MAX_CHANNELS};

/// Lock-free preview state shared between the UI and the callback.
///
/// Writers are split by field: the UI owns bypass, enables, solo/mute
/// and the selection offset; the engine owns the mode and latency
/// mirrors, written while handling commands.
#[derive(Debug, Default)]
pub struct PreviewShared {
    mode: AtomicU8,
    bypass: AtomicBool,
    stage_enabled: [AtomicBool; STAGE_SLOTS],
    solo: [AtomicBool; MAX_CHANNELS],
    mute: [AtomicBool; MAX_CHANNELS],
    selection_offset: AtomicU64,
    plugin_latency: AtomicU32,
}

impl PreviewShared {
    #[inline]
    pub fn mode(&self) -> PreviewMode {
        PreviewMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub(crate) fn sync_mode(&self, mode: PreviewMode) {
        self.mode.store(mode.as_u8(), Ordering::Relaxed);
    }

    #[inline]
    pub fn bypass(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    /// Bypass the whole chain while keeping mode and enables intact.
    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
    }

    #[inline]
    pub fn stage_enabled(&self, kind: StageKind) -> bool {
        self.stage_enabled[kind.index()].load(Ordering::Relaxed)
    }

    pub fn set_stage_enabled(&self, kind: StageKind, enabled: bool) {
        self.stage_enabled[kind.index()].store(enabled, Ordering::Relaxed);
    }

    /// Disable every stage at once, the way a closing preview dialog
    /// does. Mode and parameters are untouched.
    pub fn disable_all_stages(&self) {
        for flag in &self.stage_enabled {
            flag.store(false, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn solo(&self, channel: usize) -> bool {
        self.solo[channel].load(Ordering::Relaxed)
    }

    pub fn set_solo(&self, channel: usize, solo: bool) {
        if channel < MAX_CHANNELS {
            self.solo[channel].store(solo, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn mute(&self, channel: usize) -> bool {
        self.mute[channel].load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, channel: usize, mute: bool) {
        if channel < MAX_CHANNELS {
            self.mute[channel].store(mute, Ordering::Relaxed);
        }
    }

    /// True if any of the first `channels` channels is soloed.
    pub fn any_solo(&self, channels: usize) -> bool {
        self.solo[..channels.min(MAX_CHANNELS)]
            .iter()
            .any(|flag| flag.load(Ordering::Relaxed))
    }

    /// Offset of the previewed selection within the full material, for
    /// mapping engine position back to file position in the UI.
    #[inline]
    pub fn selection_offset(&self) -> u64 {
        self.selection_offset.load(Ordering::Relaxed)
    }

    pub fn set_selection_offset(&self, offset: u64) {
        self.selection_offset.store(offset, Ordering::Relaxed);
    }

    /// Summed latency of the installed plugin chain, display only.
    #[inline]
    pub fn plugin_latency(&self) -> u32 {
        self.plugin_latency.load(Ordering::Relaxed)
    }

    pub(crate) fn sync_plugin_latency(&self, latency: u32) {
        self.plugin_latency.store(latency, Ordering::Relaxed);
    }
}

/// Callback-side owner of the effect chain.
pub struct PreviewRouter {
    mode: PreviewMode,
    order: StageOrder,
    rack: StageRack,
    offline: Option<Shared<SourceBuffer>>,
    shared: Arc<PreviewShared>,
}

impl PreviewRouter {
    pub fn new() -> Self {
        Self {
            mode: PreviewMode::Disabled,
            order: StageOrder::default(),
            rack: StageRack::new(),
            offline: None,
            shared: Arc::new(PreviewShared::default()),
        }
    }

    pub fn shared(&self) -> Arc<PreviewShared> {
        Arc::clone(&self.shared)
    }

    pub fn param_cells(&self) -> ChainParams {
        self.rack.param_cells()
    }

    #[inline]
    pub fn mode(&self) -> PreviewMode {
        self.mode
    }

    /// Switch routing mode. Entering a preview mode from `Disabled`
    /// resets all stage state so a fresh preview never replays filter
    /// tails from the previous one.
    pub fn set_mode(&mut self, mode: PreviewMode) {
        if self.mode == PreviewMode::Disabled && mode != PreviewMode::Disabled {
            self.rack.reset_all();
        }
        self.mode = mode;
        self.shared.sync_mode(mode);
    }

    pub fn set_order(&mut self, order: StageOrder) {
        self.order = order;
    }

    pub fn order(&self) -> StageOrder {
        self.order
    }

    pub fn set_offline(&mut self, buffer: Option<Shared<SourceBuffer>>) {
        self.offline = buffer;
    }

    pub fn offline(&self) -> Option<&SourceBuffer> {
        self.offline.as_deref()
    }

    pub fn offline_frames(&self) -> u64 {
        self.offline.as_ref().map_or(0, |b| b.frames())
    }

    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        self.rack.prepare(sample_rate, max_block);
    }

    pub fn apply_pending(&mut self) {
        self.rack.apply_pending();
    }

    /// Run the enabled stages in order over the block. Honors the
    /// bypass flag; mode gating is the engine's call.
    pub fn process_chain(&mut self, buffer: &mut AudioBuffer) {
        if self.shared.bypass() {
            return;
        }
        let order = self.order;
        for &kind in order.as_slice() {
            if self.shared.stage_enabled(kind) {
                self.rack.process_stage(kind, buffer);
            }
        }
    }

    /// Reset runtime state on every stage, keeping parameters.
    pub fn reset_stages(&mut self) {
        self.rack.reset_all();
    }

    pub fn install_plugins(&mut self, chain: Owned<PluginChain>) {
        self.rack.plugins.install(chain);
        self.shared.sync_plugin_latency(self.rack.plugins.latency_samples());
    }

    pub fn clear_plugins(&mut self) {
        self.rack.plugins.clear();
        self.shared.sync_plugin_latency(0);
    }
}

impl Default for PreviewRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{GainParams, PluginProcessor};
    use crate::engine::gc_handle;

    fn block(value: f32) -> AudioBuffer {
        let mut buf = AudioBuffer::silence(1, 4);
        buf.channel_mut(0).fill(value);
        buf
    }

    fn router_with_gain(db: f32) -> PreviewRouter {
        let router = PreviewRouter::new();
        router.param_cells().gain.store(GainParams { gain_db: db });
        router.shared().set_stage_enabled(StageKind::Gain, true);
        router
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let mut router = PreviewRouter::new();
        router.param_cells().gain.store(GainParams { gain_db: 12.0 });
        router.apply_pending();
        // gain published but not enabled
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        assert!((buf.channel(0)[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_enabled_gain_applies() {
        let mut router = router_with_gain(6.0);
        router.apply_pending();
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        assert!((buf.channel(0)[0] - 0.1995).abs() < 0.001);
    }

    #[test]
    fn test_bypass_short_circuits_whole_chain() {
        let mut router = router_with_gain(6.0);
        router.apply_pending();
        router.shared().set_bypass(true);
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        assert!((buf.channel(0)[0] - 0.1).abs() < 1e-6);
        router.shared().set_bypass(false);
        router.process_chain(&mut buf);
        assert!((buf.channel(0)[0] - 0.1995).abs() < 0.001);
    }

    struct AddOne;

    impl PluginProcessor for AddOne {
        fn name(&self) -> &str {
            "add one"
        }

        fn process(&mut self, buffer: &mut AudioBuffer) {
            for c in 0..buffer.channels() {
                for s in buffer.channel_mut(c) {
                    *s += 1.0;
                }
            }
        }
    }

    #[test]
    fn test_stage_order_changes_result() {
        let mut router = router_with_gain(6.0);
        router.apply_pending();
        router.shared().set_stage_enabled(StageKind::Plugins, true);
        router.install_plugins(Owned::new(&gc_handle(), vec![Box::new(AddOne) as Box<dyn PluginProcessor>]));

        // default order: gain before plugins
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        let gain_first = buf.channel(0)[0];
        assert!((gain_first - (0.1995 + 1.0)).abs() < 0.001);

        router.set_order(StageOrder::from_kinds(&[StageKind::Plugins, StageKind::Gain]));
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        let plugin_first = buf.channel(0)[0];
        assert!((plugin_first - (1.1 * 1.9953)).abs() < 0.001);
    }

    #[test]
    fn test_stage_missing_from_order_never_runs() {
        let mut router = router_with_gain(6.0);
        router.apply_pending();
        router.set_order(StageOrder::from_kinds(&[StageKind::Fade]));
        let mut buf = block(0.1);
        router.process_chain(&mut buf);
        assert!((buf.channel(0)[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_entering_preview_resets_stage_state() {
        let mut router = PreviewRouter::new();
        router.prepare(1000, 64);
        router.shared().set_stage_enabled(StageKind::Fade, true);
        router.set_mode(PreviewMode::RealtimeDsp);

        // run the fade counter forward, then re-enter preview
        let mut buf = block(1.0);
        router.process_chain(&mut buf);
        router.set_mode(PreviewMode::Disabled);
        router.set_mode(PreviewMode::RealtimeDsp);

        let mut buf = block(1.0);
        router.process_chain(&mut buf);
        // fade-in restarts near zero
        assert!(buf.channel(0)[0].abs() < 0.01);
    }

    #[test]
    fn test_plugin_latency_mirrors_install_and_clear() {
        struct Lagged;
        impl PluginProcessor for Lagged {
            fn name(&self) -> &str {
                "lagged"
            }
            fn process(&mut self, _buffer: &mut AudioBuffer) {}
            fn latency_samples(&self) -> u32 {
                64
            }
        }

        let mut router = PreviewRouter::new();
        let shared = router.shared();
        router.install_plugins(Owned::new(&gc_handle(), vec![Box::new(Lagged) as Box<dyn PluginProcessor>]));
        assert_eq!(shared.plugin_latency(), 64);
        router.clear_plugins();
        assert_eq!(shared.plugin_latency(), 0);
    }
}
