//! packstream-util - utility functions shared by the packstream crates.

pub mod sort;

pub use sort::{insertion_sort, insertion_sort_by, introsort_by, sort_by_bytes};
