//! # Audit Context
//!
//! Builds the bounded context bundle a classifier sees for one focus chunk:
//! resolved references, nearest neighbours per corpus and hits for follow-up
//! queries, deduplicated by chunk id and rendered as grouped text.

mod builder;
mod bundle;
mod error;
mod limits;

pub use builder::ContextBuilder;
pub use bundle::{ContextBundle, ContextCounts, ContextEntry, EntryOrigin};
pub use error::{ContextError, Result};
pub use limits::ContextLimits;
