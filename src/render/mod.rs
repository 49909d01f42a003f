//! Render surface.
//!
//! Subscribers never touch pixels. They publish CSS custom properties and
//! per-element classes to a [`StyleSink`], and read page geometry from a
//! [`Scene`]. The crate ships an in-memory [`StyleSheet`] and a
//! [`StaticScene`] for headless runs and tests.

pub mod scene;
pub mod style;

pub use scene::{Rect, Scene, StaticScene, Target, Viewport};
pub use style::{StyleSheet, StyleSink, StyleState, css_number};
