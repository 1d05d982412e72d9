use core::ffi::c_int;

use thiserror::Error;

use crate::raw::{SQLITE_MISMATCH, SQLITE_MISUSE, SQLITE_RANGE};

/// Every failure the engine reports. Each kind carries the native status
/// code, see [`Error::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	#[error("unable to open database ({code}): {message}")]
	Open { code: c_int, message: String },

	#[error("unable to prepare statement ({code}): {message}")]
	Prepare { code: c_int, message: String },

	#[error("binding error ({code}): {message}")]
	Bind { code: c_int, message: String },

	#[error("SQLite error {code}: {message}")]
	Execution { code: c_int, message: String },

	#[error("SQLite API misuse ({code}): {message}")]
	Misuse { code: c_int, message: String },

	#[error("out of range: {message}")]
	Range { message: String },

	#[error("statement has been finalized")]
	UseAfterFinalize,

	#[error("{0} has been closed")]
	UseAfterClose(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	#[must_use]
	pub const fn code(&self) -> c_int {
		match self {
			Self::Open { code, .. }
			| Self::Prepare { code, .. }
			| Self::Bind { code, .. }
			| Self::Execution { code, .. }
			| Self::Misuse { code, .. } => *code,
			Self::Range { .. } => SQLITE_RANGE,
			Self::UseAfterFinalize | Self::UseAfterClose(_) => SQLITE_MISUSE,
		}
	}

	#[must_use]
	pub const fn is_use_after_release(&self) -> bool {
		matches!(self, Self::UseAfterFinalize | Self::UseAfterClose(_))
	}

	pub(crate) fn unsupported_value(what: impl std::fmt::Display) -> Self {
		Self::Bind { code: SQLITE_MISMATCH, message: format!("unsupported value type: {what}") }
	}

	pub(crate) fn unknown_parameter(name: &str) -> Self {
		Self::Bind { code: SQLITE_RANGE, message: format!("no such parameter \"{name}\"") }
	}

	pub(crate) fn already_bound() -> Self {
		Self::Bind { code: SQLITE_MISUSE, message: "statement already bound to values".to_string() }
	}

	pub(crate) fn misuse(message: impl Into<String>) -> Self {
		Self::Misuse { code: SQLITE_MISUSE, message: message.into() }
	}
}
