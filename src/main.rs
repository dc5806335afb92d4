//! csnd-demo: drive the CSND engine with a synthesized guest program
//!
//! Writes two sample blocks into guest memory, submits the channel setup as
//! a command chain through the service, then either plays the result on the
//! audio device (`streaming`) or renders it to a WAV file (`export-wav`).

use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use csnd::channel::{Encoding, RepeatMode};
use csnd::command::{ChannelConfig, Command, END_OF_CHAIN, RECORD_SIZE};
use csnd::{Csnd, CsndConfig, CsndService, PhysicalMemory, VirtualClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

const GUEST_BASE: u32 = 0x2000_0000;
const GUEST_SIZE: usize = 0x10000;

/// Timer for 16364 Hz, so the looping channel goes through rate conversion
const LOOP_TIMER: u32 = 4096;
const LOOP_RATE: u32 = 16364;
const LOOP_BLOCK_FRAMES: usize = LOOP_RATE as usize / 4;

const PLUCK_TIMER: u32 = 2048;
const PLUCK_BYTES: usize = 0x2000;

struct Options {
    config: Option<PathBuf>,
    wav: Option<PathBuf>,
    seconds: f32,
}

fn print_usage() {
    println!(
        "Usage:\n  csnd-demo [--config <file.json>] [--seconds <n>] [--wav <out.wav>]\n\nFlags:\n  --config <file>   Load a JSON CsndConfig\n  --seconds <n>     Duration to play or render (default 5)\n  --wav <file>      Render offline to a WAV file instead of playing\n  -h, --help        Show this help\n"
    );
}

fn parse_args() -> Result<Option<Options>> {
    let mut options = Options {
        config: None,
        wav: None,
        seconds: 5.0,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                options.config = Some(PathBuf::from(value));
            }
            "--wav" => {
                let value = args.next().context("--wav requires a path")?;
                options.wav = Some(PathBuf::from(value));
            }
            "--seconds" => {
                let value = args.next().context("--seconds requires a number")?;
                options.seconds = value
                    .parse()
                    .with_context(|| format!("invalid duration '{}'", value))?;
            }
            other => bail!("unknown argument '{}' (see --help)", other),
        }
    }
    Ok(Some(options))
}

/// Interleaved PCM16 sine block
fn sine_block(frequency: f32, sample_rate: u32, frames: usize) -> Vec<u8> {
    (0..frames)
        .flat_map(|i| {
            let t = i as f32 / sample_rate as f32;
            let left = ((2.0 * PI * frequency * t).sin() * 6000.0) as i16;
            let right = ((2.0 * PI * frequency * 1.5 * t).sin() * 6000.0) as i16;
            left.to_le_bytes().into_iter().chain(right.to_le_bytes())
        })
        .collect()
}

/// Decaying PCM8 square wave
fn pluck_block(bytes: usize) -> Vec<u8> {
    (0..bytes)
        .map(|i| {
            let envelope = 1.0 - i as f32 / bytes as f32;
            let level = if (i / 40) % 2 == 0 { 60.0 } else { -60.0 };
            ((level * envelope) as i8) as u8
        })
        .collect()
}

fn channel_setup() -> [ChannelConfig; 2] {
    let loop_bytes = (LOOP_BLOCK_FRAMES * 4) as u32;
    [
        ChannelConfig {
            channel_index: 8,
            repeat_mode: RepeatMode::Loop,
            encoding: Encoding::Pcm16,
            enable_playback: true,
            timer: LOOP_TIMER,
            left_volume: 0x8000,
            right_volume: 0x8000,
            first_block_address: GUEST_BASE,
            second_block_address: GUEST_BASE + loop_bytes,
            block_size: loop_bytes,
            ..ChannelConfig::default()
        },
        ChannelConfig {
            channel_index: 9,
            repeat_mode: RepeatMode::OneShot,
            encoding: Encoding::Pcm8,
            enable_playback: true,
            timer: PLUCK_TIMER,
            left_volume: 0x8000,
            right_volume: 0x8000,
            first_block_address: GUEST_BASE + 2 * loop_bytes,
            block_size: PLUCK_BYTES as u32,
            ..ChannelConfig::default()
        },
    ]
}

fn write_guest_blocks(memory: &PhysicalMemory) -> Result<()> {
    memory.map_region(GUEST_BASE, GUEST_SIZE);
    let loop_bytes = (LOOP_BLOCK_FRAMES * 4) as u32;
    memory.write(GUEST_BASE, &sine_block(440.0, LOOP_RATE, LOOP_BLOCK_FRAMES))?;
    memory.write(
        GUEST_BASE + loop_bytes,
        &sine_block(330.0, LOOP_RATE, LOOP_BLOCK_FRAMES),
    )?;
    memory.write(GUEST_BASE + 2 * loop_bytes, &pluck_block(PLUCK_BYTES))?;
    Ok(())
}

/// Write the setup as a record chain and execute it
fn submit_setup(service: &mut CsndService) -> Result<()> {
    service.initialize(0x1000, [0x800, 0x808, 0xA00, 0xA10]);
    service.acquire_sound_channels();

    let configs = channel_setup();
    let shared = service
        .shared_memory_mut()
        .context("shared memory not allocated")?;
    for (i, config) in configs.iter().enumerate() {
        let offset = i * RECORD_SIZE;
        let next = if i + 1 == configs.len() {
            END_OF_CHAIN
        } else {
            (offset + RECORD_SIZE) as u16
        };
        let record = Command::ConfigureChannel(*config).encode(next);
        shared[offset..offset + RECORD_SIZE].copy_from_slice(&record);
    }

    let processed = service.execute_commands(0)?;
    info!("Executed {} command records", processed);
    Ok(())
}

#[cfg(feature = "export-wav")]
fn render(csnd: &Csnd, clock: &mut VirtualClock, path: &std::path::Path, seconds: f32) -> Result<()> {
    let mut sink = csnd::NullSink::new();
    csnd.engine().set_sink(&mut sink)?;
    let frames = csnd::export::render_to_wav(clock, &mut sink, seconds, path)?;
    info!("Wrote {} frames to {}", frames, path.display());
    Ok(())
}

#[cfg(not(feature = "export-wav"))]
fn render(_: &Csnd, _: &mut VirtualClock, _: &std::path::Path, _: f32) -> Result<()> {
    bail!("WAV export requires the \"export-wav\" feature. Rebuild with `--features export-wav`.")
}

#[cfg(feature = "streaming")]
fn play(csnd: &Csnd, clock: &mut VirtualClock, config: &CsndConfig, seconds: f32) -> Result<()> {
    use csnd::constants::us_to_cycles;
    use std::time::{Duration, Instant};

    let mut sink = csnd::streaming::create_sink(&config.sink_id, &config.audio_device_id)?;
    csnd.engine().set_sink(sink.as_mut())?;
    info!("Playing for {:.1}s on '{}' sink", seconds, sink.name());

    // the virtual clock follows wall time
    let start = Instant::now();
    let duration = Duration::from_secs_f32(seconds.max(0.0));
    while start.elapsed() < duration {
        std::thread::sleep(Duration::from_millis(5));
        let target = us_to_cycles(start.elapsed().as_micros() as u64);
        clock.advance(target.saturating_sub(clock.now()));
    }

    let stats = csnd.engine().stats();
    info!(
        "pushed={} dropped={} played={} underrun={}",
        stats.frames_pushed, stats.frames_dropped, stats.frames_played, stats.underrun_frames
    );
    csnd.engine().detach_sink(sink.as_mut());
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play(_: &Csnd, _: &mut VirtualClock, _: &CsndConfig, _: f32) -> Result<()> {
    eprintln!(
        "Live playback requires the \"streaming\" feature. Rebuild with `--features streaming`, or use --wav with `--features export-wav`."
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let config = match &options.config {
        Some(path) => CsndConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CsndConfig::default(),
    };

    let memory = Arc::new(PhysicalMemory::new());
    write_guest_blocks(&memory)?;

    let mut clock = VirtualClock::new();
    let csnd = Csnd::new(config.clone(), memory, &mut clock);
    let mut service = CsndService::for_csnd(&csnd);
    submit_setup(&mut service)?;

    match &options.wav {
        Some(path) => render(&csnd, &mut clock, path, options.seconds)?,
        None => play(&csnd, &mut clock, &config, options.seconds)?,
    }

    csnd.shutdown(&mut clock);
    Ok(())
}
