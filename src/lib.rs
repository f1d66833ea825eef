//! logscope - viewport engine over merged log sources
//!
//! Shows a fixed-height window of lines drawn from several growing, randomly
//! seekable message sources, merged into one timestamp order. Scrolling, jumping to
//! bookmarks, timestamps or proportional positions, resizing and reloading all run as
//! cancellable async operations; the newest one wins and a cancelled one leaves the
//! buffer untouched.
//!
//! # Layers
//!
//! - [`model`]: messages, bookmarks, identifiers and errors
//! - [`source`]: the [`source::MessageSource`] contract plus an in-memory source
//! - [`view_state`]: per-source windows, the k-way merge and the screen buffer
//! - [`state`]: navigation serialization and selection tracking
//! - [`highlight`]: cached highlight ranges for visible lines
//! - [`viewer`]: [`LogViewer`], the facade tying them together
//! - [`config`] and [`logging`]: file/env configuration and tracing setup

pub mod config;
pub mod highlight;
pub mod logging;
pub mod model;
pub mod source;
pub mod state;
pub mod view_state;
pub mod viewer;

pub use viewer::LogViewer;
