//! WAV file export

use crate::constants::{SAMPLES_PER_TICK, TICK_PERIOD_CYCLES};
use crate::streaming::{NullSink, Sink};
use crate::timing::VirtualClock;
use crate::{CsndError, Result, StereoFrame};
use std::path::Path;
use tracing::info;

fn wav_error(context: &str, e: hound::Error) -> CsndError {
    CsndError::Io(std::io::Error::other(format!("{}: {}", context, e)))
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write stereo frames to a 16-bit WAV file
pub fn write_wav<P: AsRef<Path>>(path: P, frames: &[StereoFrame], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::create(path.as_ref(), wav_spec(sample_rate))
        .map_err(|e| wav_error("Failed to create WAV file", e))?;
    for sample in frames.iter().flatten() {
        writer
            .write_sample(*sample)
            .map_err(|e| wav_error("Failed to write sample", e))?;
    }
    writer
        .finalize()
        .map_err(|e| wav_error("Failed to finalize WAV file", e))
}

/// Render `seconds` of output into a WAV file
///
/// `sink` must already be selected on the engine driven by `clock`. Returns
/// the number of frames written.
pub fn render_to_wav<P: AsRef<Path>>(
    clock: &mut VirtualClock,
    sink: &mut NullSink,
    seconds: f32,
    path: P,
) -> Result<usize> {
    let sample_rate = sink.native_sample_rate();
    let total_frames = (seconds.max(0.0) * sample_rate as f32) as usize;
    let ticks = total_frames.div_ceil(SAMPLES_PER_TICK);

    info!(
        "Rendering {} ticks ({:.1}s) to {}",
        ticks,
        seconds,
        path.as_ref().display()
    );

    let mut writer = hound::WavWriter::create(path.as_ref(), wav_spec(sample_rate))
        .map_err(|e| wav_error("Failed to create WAV file", e))?;
    let mut frames = vec![[0i16; 2]; SAMPLES_PER_TICK];
    for _ in 0..ticks {
        clock.advance(TICK_PERIOD_CYCLES);
        sink.render(&mut frames);
        for sample in frames.iter().flatten() {
            writer
                .write_sample(*sample)
                .map_err(|e| wav_error("Failed to write sample", e))?;
        }
    }
    writer
        .finalize()
        .map_err(|e| wav_error("Failed to finalize WAV file", e))?;

    Ok(ticks * SAMPLES_PER_TICK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Encoding, RepeatMode};
    use crate::command::{ChannelConfig, Command};
    use crate::config::CsndConfig;
    use crate::engine::Csnd;
    use crate::memory::PhysicalMemory;
    use std::sync::Arc;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("csnd-{}-{}.wav", name, std::process::id()))
    }

    #[test]
    fn test_write_wav_round_trip() {
        let path = temp_path("write");
        let frames = [[100, -100], [i16::MAX, i16::MIN]];
        write_wav(&path, &frames, 32728).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 32728);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, i16::MAX, i16::MIN]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_render_channel_to_wav() {
        let memory = Arc::new(PhysicalMemory::new());
        memory.map_region(0x2000_0000, 0x1000);
        memory.write(0x2000_0000, &[0x40; 320]).unwrap();

        let mut clock = VirtualClock::new();
        let config = CsndConfig {
            enable_time_stretching: false,
            ..CsndConfig::default()
        };
        let csnd = Csnd::new(config, memory, &mut clock);
        let mut sink = NullSink::new();
        csnd.engine().set_sink(&mut sink).unwrap();
        csnd.submit(&Command::ConfigureChannel(ChannelConfig {
            encoding: Encoding::Pcm8,
            repeat_mode: RepeatMode::OneShot,
            enable_playback: true,
            timer: 2048,
            first_block_address: 0x2000_0000,
            block_size: 320,
            ..ChannelConfig::default()
        }))
        .unwrap();

        let path = temp_path("render");
        let written = render_to_wav(&mut clock, &mut sink, 0.1, &path).unwrap();
        assert_eq!(written % SAMPLES_PER_TICK, 0);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), written * 2);
        assert_eq!(&samples[..4], &[0x4000, 0x4000, 0x4000, 0x4000]);
        std::fs::remove_file(&path).ok();
    }
}
