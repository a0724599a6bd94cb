//! Sorting utilities.
//!
//! [`introsort_by`] is the general entry point; it falls back to
//! [`insertion_sort_by`] for short runs. [`sort_by_bytes`] orders items by a
//! byte-string key, which is how string-keyed maps are emitted
//! deterministically.

mod insertion;
mod introsort;

pub use insertion::{insertion_sort, insertion_sort_by};
pub use introsort::{introsort_by, max_depth, sort_by_bytes};
