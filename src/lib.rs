//! `specimen` - decay lifecycle engine
//!
//! Ages a page through healthy, panic, decay and death (or a pirate
//! ending), fanning `(stage, progress)` out to subscribers that publish the
//! page's atmosphere, scanning beam, particle field and audio.

pub mod cli;
pub mod config;
pub mod error;
pub mod interaction;
pub mod lifecycle;
pub mod observability;
pub mod render;
pub mod subscribers;
