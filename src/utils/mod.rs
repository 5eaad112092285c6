//! Utility functions for flopt.

mod boolean;

pub use boolean::parse_bool;
