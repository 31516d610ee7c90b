//! Typed error surface for the ATN runtime, following the subsystem split in
//! the ERROR HANDLING DESIGN: malformed wire input, structural invariant
//! violations, and unsupported operations are distinguishable variants, not
//! stringly-typed failures.

use thiserror::Error;

/// Failures from [`crate::atn_deserializer::AtnDeserializer::deserialize`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DeserializeError {
	#[error("unsupported ATN serialization version {found}, expected {expected}")]
	UnsupportedVersion { found: i32, expected: i32 },

	#[error("unsupported or unknown ATN feature UUID")]
	UnknownUuid,

	#[error("ATN wire payload truncated while reading {section}")]
	Truncated { section: &'static str },

	#[error("ATN verification failed: {detail} (state {state})")]
	Verification { state: usize, detail: String },

	#[error("invalid state type tag {0} in wire payload")]
	InvalidStateType(i32),

	#[error("invalid transition type tag {0} in wire payload")]
	InvalidTransitionType(i32),

	#[error("invalid lexer action type tag {0} in wire payload")]
	InvalidLexerActionType(i32),
}

/// Failures from prediction-context operations.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PredictionContextError {
	#[error("cannot append a suffix of size {0} (only size <= 1 is supported)")]
	SuffixTooLong(usize),
}
