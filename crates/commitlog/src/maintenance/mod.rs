//! Background maintenance over sealed segments.
//!
//! - `condensor`: rewrite one sealed segment into a replay-equivalent,
//!   smaller `.condensed` sibling by coalescing per-node edits
//! - `combiner`: merge the first adjacent pair of sealed segments whose
//!   sizes fit under a budget
//!
//! Both write through a `.tmp` sidecar and rename it into place, so an
//! interrupted run leaves its sources intact and only a discardable sidecar
//! behind.

pub mod combiner;
pub mod condensor;

pub use combiner::Combiner;
pub use condensor::Condensor;
