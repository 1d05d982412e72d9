use core::ffi::c_int;
use std::ffi::CStr;
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_MISUSE, SQLITE_OK, primary_code};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatusKind {
	Ok,
	Misuse,
	Other,
}

/// A native status code resolved to a kind and a readable message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Status {
	pub kind: StatusKind,
	pub code: c_int,
	pub message: String,
}

impl Status {
	/// Resolves `code`. With a connection handle the message is the
	/// connection's last error text, otherwise the static code description.
	#[must_use]
	pub fn translate(code: c_int, db: Option<NonNull<ffi::Sqlite3>>) -> Self {
		let kind = match primary_code(code) {
			SQLITE_OK => StatusKind::Ok,
			SQLITE_MISUSE => StatusKind::Misuse,
			_ => StatusKind::Other,
		};

		let message = match (kind, db) {
			(StatusKind::Ok, _) => errstr(code),
			(_, Some(db)) => connection_message(db).unwrap_or_else(|| errstr(code)),
			(_, None) => errstr(code),
		};

		Self { kind, code, message }
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		self.kind == StatusKind::Ok
	}

	/// Misuse keeps its own kind; everything else becomes [`Error::Execution`].
	#[must_use]
	pub fn into_error(self) -> Error {
		match self.kind {
			StatusKind::Misuse => Error::Misuse { code: self.code, message: self.message },
			StatusKind::Ok | StatusKind::Other => {
				Error::Execution { code: self.code, message: self.message }
			}
		}
	}
}

#[must_use]
pub fn errstr(code: c_int) -> String {
	litestmt_sqlite_ffi::sqlite_errstr(code)
}

pub(crate) fn check(code: c_int, db: Option<NonNull<ffi::Sqlite3>>) -> Result<()> {
	if code == SQLITE_OK {
		return Ok(());
	}
	Err(Status::translate(code, db).into_error())
}

fn connection_message(db: NonNull<ffi::Sqlite3>) -> Option<String> {
	let message_ptr = unsafe { ffi::sqlite3_errmsg(db.as_ptr()) };
	if message_ptr.is_null() {
		return None;
	}

	Some(unsafe { CStr::from_ptr(message_ptr).to_string_lossy().into_owned() })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::raw::{SQLITE_BUSY, SQLITE_RANGE};

	#[test]
	fn ok_status_passes() {
		let status = Status::translate(SQLITE_OK, None);
		assert!(status.is_ok());
		assert!(check(SQLITE_OK, None).is_ok());
	}

	#[test]
	fn misuse_is_its_own_kind() {
		let status = Status::translate(SQLITE_MISUSE, None);
		assert_eq!(status.kind, StatusKind::Misuse);
		assert!(matches!(status.into_error(), Error::Misuse { code: SQLITE_MISUSE, .. }));
	}

	#[test]
	fn without_connection_falls_back_to_errstr() {
		let err = check(SQLITE_BUSY, None).expect_err("busy is an error");
		assert_eq!(err, Error::Execution { code: SQLITE_BUSY, message: "database is locked".to_string() });

		let status = Status::translate(SQLITE_RANGE, None);
		assert_eq!(status.kind, StatusKind::Other);
		assert_eq!(status.message, "column index out of range");
	}
}
