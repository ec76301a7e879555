//! Static safety gate for generated Python code.
//!
//! The [`SafetyAnalyzer`] parses a fragment and walks its syntax tree looking
//! for names on a configurable [`DenyList`]. This is a deny-list check layered
//! in front of the sandbox process boundary. It does not confine the code:
//! dynamic attribute lookup, string-built imports and similar tricks can get
//! past it, and the sandbox runner remains the isolation layer.

mod analyzer;
mod deny_list;

pub use analyzer::{SafetyAnalyzer, SafetyVerdict};
pub use deny_list::DenyList;
