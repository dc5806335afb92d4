//! Offline rendering
//!
//! Runs the tick without a device: the virtual clock is advanced one tick at
//! a time and each tick's frames are pulled through a [`NullSink`](crate::NullSink)
//! and written to a file.
//!
//! ```no_run
//! use std::sync::Arc;
//! use csnd::{Csnd, CsndConfig, NullSink, PhysicalMemory, VirtualClock};
//! use csnd::export::render_to_wav;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let memory = Arc::new(PhysicalMemory::new());
//! let mut clock = VirtualClock::new();
//! let csnd = Csnd::new(CsndConfig::default(), memory, &mut clock);
//! let mut sink = NullSink::new();
//! csnd.engine().set_sink(&mut sink)?;
//!
//! render_to_wav(&mut clock, &mut sink, 2.0, "csnd.wav")?;
//! # Ok(())
//! # }
//! ```

mod wav;

pub use wav::{render_to_wav, write_wav};
