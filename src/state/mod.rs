//! Navigation and selection state.
//!
//! The navigation manager serializes buffer operations; the selection manager keeps
//! the cursor anchored while they change the buffer.

pub mod navigation;
pub mod selection;

// Re-export for convenience
pub use navigation::NavigationManager;
pub use selection::{CursorPosition, LinePlacement, Selection, SelectionFlags, SelectionManager};
