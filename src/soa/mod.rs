//! # Struct-of-Arrays Codec
//!
//! Compacts a homogeneous list of records (maps with identical ordered key
//! sets) into one schema plus a flat fixed-width payload, amortizing the
//! per-record key and marker overhead across the whole collection.
//!
//! ## Wire Layout
//!
//! ```text
//! [ $ {schema} # count          row-major fixed payload
//! { $ {schema} # count          column-major fixed payload
//!         |        \
//!         |         # [d0 d1 ..] for multi-dimensional record grids
//!         |
//!         deferred blocks (dict tables, offset tables) in schema
//!         order, depth-first, precede the fixed payload
//! ```
//!
//! The schema is inferred in a read-only pass ([`schema::infer`]); emission
//! ([`encode::encode_records`]) is a second pass against the finalized
//! schema, so index widths and string strategies are exact, never estimated.
//! [`decode::expand`] turns a decoded collection back into a list of maps.

pub mod decode;
pub mod encode;
pub mod schema;

#[cfg(test)]
mod tests;
