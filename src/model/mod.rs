//! Domain model types (pure).
//!
//! Messages, their identities, bookmarks and the line order shared by every other
//! module. Nothing here performs I/O.

pub mod bookmark;
pub mod error;
pub mod identifiers;
pub mod message;

// Re-export for convenience
pub use bookmark::{Bookmark, OrderKey};
pub use error::{EngineError, SourceError};
pub use identifiers::{MessageKey, SourceId};
pub use message::{Message, MessageRef, MessageText, TextMode};
