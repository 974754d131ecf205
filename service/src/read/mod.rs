//! Read entities definitions.

pub mod contribution;
pub mod pool;
