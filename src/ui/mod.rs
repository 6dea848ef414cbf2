//! Terminal User Interface module.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling
//! - `events` - Background task event processing
//! - `helpers` - Task spawning and shared utilities
//! - `render` - View rendering dispatch and tab bar
//! - `listings` - Listing feed widget
//! - `detail` - Listing detail widget
//! - `status` - Status bar widget

mod detail;
mod events;
mod helpers;
mod input;
mod listings;
mod loop_runner;
mod render;
mod status;

pub use loop_runner::{run, Action};
