//! Wire codecs for action and result trees
//!
//! Two forms are supported, and both preserve tree shape and field order:
//!
//! - [`xml`]: attributes for scalars, nested elements for parameters,
//!   conditionals and child collections, under a namespace-qualified root
//! - [`binary`]: compact little-endian framing with `u32` length prefixes and
//!   `u8` has-value flags ahead of every optional substructure

pub mod binary;
pub mod xml;

/// Namespace qualifying the XML root elements
pub const XML_NAMESPACE: &str = "urn:actionflow:persistence:v1";

/// Maximum nesting depth accepted by the decoders
///
/// Bounds recursion on untrusted input. Real action graphs stay far below it.
pub const MAX_DECODE_DEPTH: usize = 64;
