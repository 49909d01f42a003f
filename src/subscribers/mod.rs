//! Subscribers that render the lifecycle.
//!
//! Each subscriber maps `(stage, progress)` onto its own parameters through
//! an exhaustive per-stage table and publishes the result to a
//! [`StyleSink`](crate::render::StyleSink). The beam and particle field
//! also run their own proximity loops, independent of the engine tick.

pub mod atmosphere;
pub mod audio;
pub mod beam;
pub mod particles;

pub use atmosphere::Atmosphere;
pub use audio::{AudioClock, AudioEngine, AudioOptions};
pub use beam::{BeamMotion, BeamObserver, BeamScanner, Proximity, ScanReport};
pub use particles::{Layer, ParticleField};
