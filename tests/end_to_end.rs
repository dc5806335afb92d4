use std::sync::Arc;

use csnd::channel::{Encoding, PlaybackState, RepeatMode};
use csnd::constants::{SAMPLES_PER_TICK, TICK_PERIOD_CYCLES};
use csnd::{
    ChannelConfig, Command, Csnd, CsndConfig, CsndEngine, NullSink, PhysicalMemory, StereoFrame,
    VirtualClock,
};

const BLOCK: u32 = 0x2000_0000;

fn pcm16_bytes(frames: &[StereoFrame]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| f.iter().flat_map(|s| s.to_le_bytes()))
        .collect()
}

fn memory_with(address: u32, frames: &[StereoFrame]) -> Arc<PhysicalMemory> {
    let memory = Arc::new(PhysicalMemory::new());
    memory.map_region(BLOCK, 0x4000);
    memory.write(address, &pcm16_bytes(frames)).unwrap();
    memory
}

fn headless_config() -> CsndConfig {
    CsndConfig {
        enable_time_stretching: false,
        sink_id: "null".into(),
        ..CsndConfig::default()
    }
}

fn one_shot(channel_index: u8, address: u32, frames: u32) -> ChannelConfig {
    ChannelConfig {
        channel_index,
        encoding: Encoding::Pcm16,
        repeat_mode: RepeatMode::OneShot,
        enable_playback: true,
        timer: 2048,
        first_block_address: address,
        block_size: frames * 4,
        ..ChannelConfig::default()
    }
}

fn ramp() -> Vec<StereoFrame> {
    (1..=8).map(|i| [i * 100, -i * 100]).collect()
}

#[test]
fn one_shot_block_plays_once_then_goes_silent() {
    let mut engine = CsndEngine::new(headless_config(), memory_with(BLOCK, &ramp()));
    engine
        .submit(&Command::ConfigureChannel(one_shot(3, BLOCK, 8)))
        .unwrap();

    assert_eq!(engine.mix_frames(4), &ramp()[..4]);
    assert_eq!(engine.mix_frames(4), &ramp()[4..]);
    assert_eq!(engine.mix_frames(4), &[[0, 0]; 4]);
    assert_eq!(engine.mix_frames(4), &[[0, 0]; 4]);
    assert_eq!(
        engine.channel(3).unwrap().playback_state(),
        PlaybackState::Exhausted
    );
}

#[test]
fn reconfiguring_a_channel_restarts_it() {
    let memory = memory_with(BLOCK, &ramp());
    memory
        .write(BLOCK + 0x100, &pcm16_bytes(&[[7, 7]; 4]))
        .unwrap();
    let mut engine = CsndEngine::new(headless_config(), memory);

    engine.configure_channel(&one_shot(3, BLOCK, 8)).unwrap();
    engine.mix_frames(4);
    engine
        .configure_channel(&one_shot(3, BLOCK + 0x100, 4))
        .unwrap();

    assert_eq!(engine.active_channels(), vec![3]);
    assert_eq!(engine.mix_frames(4), &[[7, 7]; 4]);
}

#[test]
fn two_channels_mix_with_saturation() {
    let memory = memory_with(BLOCK, &[[30_000, -30_000]; 4]);
    let mut engine = CsndEngine::new(headless_config(), memory);
    engine.configure_channel(&one_shot(0, BLOCK, 4)).unwrap();
    engine.configure_channel(&one_shot(31, BLOCK, 4)).unwrap();

    assert_eq!(engine.mix_frames(4), &[[i16::MAX, i16::MIN]; 4]);
}

#[test]
fn paused_channel_resumes_where_it_stopped() {
    let mut engine = CsndEngine::new(headless_config(), memory_with(BLOCK, &ramp()));
    engine.configure_channel(&one_shot(3, BLOCK, 8)).unwrap();

    assert_eq!(engine.mix_frames(2), &ramp()[..2]);
    engine
        .submit(&Command::SetPlayState {
            channel_index: 3,
            enable_playback: false,
        })
        .unwrap();
    assert_eq!(engine.mix_frames(2), &[[0, 0]; 2]);

    engine.set_playback(3, true).unwrap();
    assert_eq!(engine.mix_frames(2), &ramp()[2..4]);
}

#[test]
fn clock_ticks_feed_the_sink_and_underruns_repeat_the_last_frame() {
    let frames = vec![[500, -500]; SAMPLES_PER_TICK];
    let mut clock = VirtualClock::new();
    let csnd = Csnd::new(headless_config(), memory_with(BLOCK, &frames), &mut clock);

    let mut sink = NullSink::new();
    csnd.engine().set_sink(&mut sink).unwrap();
    csnd.submit(&Command::ConfigureChannel(one_shot(
        3,
        BLOCK,
        SAMPLES_PER_TICK as u32,
    )))
    .unwrap();

    clock.advance(TICK_PERIOD_CYCLES);
    assert_eq!(csnd.engine().queued_frames(), SAMPLES_PER_TICK);

    let mut out = vec![[0, 0]; SAMPLES_PER_TICK + 40];
    assert!(sink.render(&mut out));
    assert!(out.iter().all(|frame| *frame == [500, -500]));

    let stats = csnd.engine().stats();
    assert_eq!(stats.frames_pushed, SAMPLES_PER_TICK as u64);
    assert_eq!(stats.frames_played, SAMPLES_PER_TICK as u64);
    assert_eq!(stats.underrun_frames, 40);

    csnd.shutdown(&mut clock);
    assert_eq!(clock.pending_count(), 0);
}

#[test]
fn output_volume_scales_device_frames() {
    let frames = vec![[1000, -1000]; SAMPLES_PER_TICK];
    let mut clock = VirtualClock::new();
    let csnd = Csnd::new(headless_config(), memory_with(BLOCK, &frames), &mut clock);

    let mut sink = NullSink::new();
    csnd.engine().set_sink(&mut sink).unwrap();
    csnd.engine().set_volume(0.0);
    csnd.engine()
        .configure_channel(&one_shot(0, BLOCK, SAMPLES_PER_TICK as u32))
        .unwrap();

    clock.advance(TICK_PERIOD_CYCLES);
    let mut out = vec![[1, 1]; SAMPLES_PER_TICK];
    sink.render(&mut out);
    assert!(out.iter().all(|frame| *frame == [0, 0]));
}
