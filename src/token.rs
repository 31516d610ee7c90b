//! Collaborator interface: the opaque token values the core matches against.
//!
//! The token stream itself is out of scope; the core only needs a type
//! exposing a token type, with the same reserved sentinels as
//! [`crate::interval_set`].

pub const EOF: i32 = crate::interval_set::EOF;
pub const EPSILON: i32 = crate::interval_set::EPSILON;

/// An opaque token produced upstream of this crate.
pub trait Token {
	fn token_type(&self) -> i32;
}
