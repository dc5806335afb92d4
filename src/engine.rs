//! Control plane and tick
//!
//! [`CsndEngine`] owns the channel table and the producer side of the frame
//! queue. [`Csnd`] shares it behind a mutex and drives it from the virtual
//! clock.

use crate::channel::ChannelSource;
use crate::command::{ChannelConfig, Command};
use crate::config::CsndConfig;
use crate::constants::{MAX_CHANNELS, SAMPLES_PER_TICK, TICK_PERIOD_CYCLES};
use crate::memory::MemoryAccessor;
use crate::mixer::Mixer;
use crate::streaming::{
    FrameQueue, OutputPipeline, PipelineControls, PipelineStats, Sink, StatsSnapshot,
};
use crate::timing::{EventId, Scheduler};
use crate::{CsndError, Result, StereoFrame};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Channel engine: configuration, mixing and queue output
pub struct CsndEngine {
    config: CsndConfig,
    memory: Arc<dyn MemoryAccessor>,
    mixer: Mixer,
    /// Producer end of the queue; `None` until a sink is selected
    queue: Option<Arc<FrameQueue>>,
    controls: Arc<PipelineControls>,
    stats: Arc<PipelineStats>,
    frame: Vec<StereoFrame>,
    ticks: u64,
}

impl std::fmt::Debug for CsndEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsndEngine")
            .field("config", &self.config)
            .field("active_channels", &self.mixer.active_count())
            .field("has_sink", &self.queue.is_some())
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl CsndEngine {
    /// Create an engine reading sample blocks through `memory`
    pub fn new(config: CsndConfig, memory: Arc<dyn MemoryAccessor>) -> Self {
        let controls = Arc::new(PipelineControls::new(
            config.volume,
            config.enable_time_stretching,
        ));
        CsndEngine {
            config,
            memory,
            mixer: Mixer::new(),
            queue: None,
            controls,
            stats: Arc::new(PipelineStats::default()),
            frame: vec![[0, 0]; SAMPLES_PER_TICK],
            ticks: 0,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &CsndConfig {
        &self.config
    }

    /// Replace the source of `config.channel_index` with a freshly decoded one
    ///
    /// The new source is installed even when decoding fails; it then stays
    /// silent but still accepts playback toggles. The decode status is
    /// returned.
    pub fn configure_channel(&mut self, config: &ChannelConfig) -> Result<()> {
        if config.channel_index as usize >= MAX_CHANNELS {
            return Err(CsndError::ChannelIndexOutOfRange(config.channel_index as u32));
        }

        let mut source = ChannelSource::new(config, self.config.native_sample_rate);
        let status = source.load(self.memory.as_ref());
        if self.mixer.install(source).is_some() {
            debug!("Channel {}: replaced previous source", config.channel_index);
        }
        status
    }

    /// Start or stop an existing channel
    pub fn set_playback(&mut self, channel_index: u8, enable: bool) -> Result<()> {
        match self.mixer.get_mut(channel_index) {
            Some(source) => {
                source.set_playback_enabled(enable);
                debug!("Channel {}: playback {}", channel_index, enable);
                Ok(())
            }
            None => {
                warn!("Playback toggle for unconfigured channel {}", channel_index);
                Err(CsndError::UnknownChannel(channel_index))
            }
        }
    }

    /// Apply a decoded command
    pub fn submit(&mut self, command: &Command) -> Result<()> {
        debug!("Command 0x{:X}: {:?}", command.command_id(), command);
        match command {
            Command::SetPlayState {
                channel_index,
                enable_playback,
            } => self.set_playback(*channel_index, *enable_playback),
            Command::ConfigureChannel(config) => self.configure_channel(config),
        }
    }

    /// Route output to `sink`
    ///
    /// A fresh queue is created and the sink's callback is replaced with one
    /// draining it.
    pub fn set_sink(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let queue = Arc::new(FrameQueue::new(self.config.queue_capacity)?);
        let rate = self.config.native_sample_rate;
        sink.set_native_sample_rate(rate);

        let mut pipeline = OutputPipeline::new(
            Arc::clone(&queue),
            Arc::clone(&self.controls),
            Arc::clone(&self.stats),
            rate,
        );
        sink.set_callback(Box::new(move |out| pipeline.fill(out)));
        self.queue = Some(queue);

        info!("Audio sink '{}' selected at {}Hz", sink.name(), rate);
        Ok(())
    }

    /// Disconnect from `sink`; output becomes a no-op
    pub fn detach_sink(&mut self, sink: &mut dyn Sink) {
        sink.clear_callback();
        self.queue = None;
    }

    /// Whether a sink is selected
    pub fn has_sink(&self) -> bool {
        self.queue.is_some()
    }

    /// Turn time stretching on or off
    pub fn enable_stretching(&self, enable: bool) {
        self.controls.set_stretching(enable);
    }

    /// Whether time stretching is on
    pub fn stretching_enabled(&self) -> bool {
        self.controls.stretching()
    }

    /// Set the linear output volume
    pub fn set_volume(&self, volume: f32) {
        self.controls.set_volume(volume);
    }

    /// Current linear output volume
    pub fn volume(&self) -> f32 {
        self.controls.volume()
    }

    /// Mix one tick and queue it
    pub fn tick(&mut self) {
        // mix_frames may have left the buffer at another length
        self.frame.resize(SAMPLES_PER_TICK, [0, 0]);
        self.mixer.mix_into(&mut self.frame);
        self.ticks += 1;
        self.output_frame();
    }

    /// Mix one tick without queueing it
    pub fn generate_current_frame(&mut self) -> &[StereoFrame] {
        self.mix_frames(SAMPLES_PER_TICK)
    }

    /// Mix `frames` frames from every channel without queueing them
    pub fn mix_frames(&mut self, frames: usize) -> &[StereoFrame] {
        self.frame.resize(frames, [0, 0]);
        self.mixer.mix_into(&mut self.frame);
        &self.frame
    }

    fn output_frame(&mut self) {
        let Some(queue) = self.queue.as_ref() else {
            return;
        };
        let pushed = queue.push(&self.frame);
        self.stats.record_push(self.frame.len(), pushed);
        if pushed < self.frame.len() {
            debug!(
                "Frame queue full, dropped {} frames",
                self.frame.len() - pushed
            );
        }
    }

    /// Source configured on `channel_index`
    pub fn channel(&self, channel_index: u8) -> Option<&ChannelSource> {
        self.mixer.get(channel_index)
    }

    /// Indices of configured channels
    pub fn active_channels(&self) -> Vec<u8> {
        self.mixer.active_channels().collect()
    }

    /// Remove every channel
    pub fn reset(&mut self) {
        self.mixer.clear();
    }

    /// Ticks run since creation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Pipeline counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Producer end of the frame queue
    ///
    /// # Errors
    ///
    /// Returns [`CsndError::SinkUnavailable`] when no sink is selected.
    pub fn frame_queue(&self) -> Result<Arc<FrameQueue>> {
        self.queue.clone().ok_or(CsndError::SinkUnavailable)
    }

    /// Frames waiting for the device
    pub fn queued_frames(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.len())
    }
}

/// Shared engine handle wired to a scheduler
///
/// The tick event holds only a weak reference, so dropping every handle
/// stops the ticks even without [`shutdown`](Csnd::shutdown).
pub struct Csnd {
    engine: Arc<Mutex<CsndEngine>>,
    tick_event: EventId,
}

impl Csnd {
    /// Build the engine and arm its periodic tick on `scheduler`
    pub fn new(
        config: CsndConfig,
        memory: Arc<dyn MemoryAccessor>,
        scheduler: &mut dyn Scheduler,
    ) -> Self {
        let engine = Arc::new(Mutex::new(CsndEngine::new(config, memory)));

        let weak = Arc::downgrade(&engine);
        let tick_event = scheduler.register_event(
            "csnd::tick",
            Box::new(move |cycles_late| {
                let engine = weak.upgrade()?;
                engine.lock().tick();
                Some(TICK_PERIOD_CYCLES as i64 - cycles_late)
            }),
        );
        scheduler.schedule_event(TICK_PERIOD_CYCLES, tick_event);

        Csnd { engine, tick_event }
    }

    /// Lock the engine
    pub fn engine(&self) -> MutexGuard<'_, CsndEngine> {
        self.engine.lock()
    }

    /// Shared engine, e.g. for [`CsndService`](crate::CsndService)
    pub fn shared_engine(&self) -> Arc<Mutex<CsndEngine>> {
        Arc::clone(&self.engine)
    }

    /// Apply a decoded command
    pub fn submit(&self, command: &Command) -> Result<()> {
        self.engine.lock().submit(command)
    }

    /// Scheduler event of the tick
    pub fn tick_event(&self) -> EventId {
        self.tick_event
    }

    /// Stop ticking and drop the tick callback
    pub fn shutdown(self, scheduler: &mut dyn Scheduler) {
        scheduler.unschedule_event(self.tick_event);
        scheduler.unregister_event(self.tick_event);
    }
}
