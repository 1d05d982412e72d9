use core::ffi::c_int;
use std::ffi::CString;
use std::ptr::NonNull;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_BUSY, SQLITE_DONE, SQLITE_LOCKED, SQLITE_OK, primary_code};
use crate::status::{Status, check};

/// An online copy of one database into another.
#[derive(Debug)]
pub struct Backup<'a> {
	dest: &'a Connection,
	handle: Option<NonNull<ffi::Sqlite3Backup>>,
}

impl<'a> Backup<'a> {
	pub fn new(dest: &'a Connection, dest_name: &str, source: &'a Connection, source_name: &str) -> Result<Self> {
		let dest_name_c =
			CString::new(dest_name).map_err(|_| Error::misuse("database name contains a NUL byte"))?;
		let source_name_c =
			CString::new(source_name).map_err(|_| Error::misuse("database name contains a NUL byte"))?;

		let backup = unsafe {
			ffi::sqlite3_backup_init(
				dest.as_ptr(),
				dest_name_c.as_ptr(),
				source.as_ptr(),
				source_name_c.as_ptr(),
			)
		};
		let Some(backup) = NonNull::new(backup) else {
			// Failures are recorded on the destination connection.
			let code = unsafe { ffi::sqlite3_extended_errcode(dest.as_ptr()) };
			return Err(Status::translate(code, Some(dest.handle())).into_error());
		};

		tracing::debug!(dest_name, source_name, "started backup");
		Ok(Self { dest, handle: Some(backup) })
	}

	/// Copies up to `pages` pages (all of them when negative). Returns true
	/// while pages remain; a busy or locked source also returns true so the
	/// caller can retry.
	pub fn step(&mut self, pages: c_int) -> Result<bool> {
		let backup = self.handle()?;
		let code = unsafe { ffi::sqlite3_backup_step(backup.as_ptr(), pages) };
		match primary_code(code) {
			SQLITE_OK | SQLITE_BUSY | SQLITE_LOCKED => Ok(true),
			SQLITE_DONE => Ok(false),
			_ => Err(Status::translate(code, Some(self.dest.handle())).into_error()),
		}
	}

	pub fn remaining(&self) -> Result<usize> {
		let backup = self.handle()?;
		Ok(usize::try_from(unsafe { ffi::sqlite3_backup_remaining(backup.as_ptr()) }).unwrap_or_default())
	}

	pub fn page_count(&self) -> Result<usize> {
		let backup = self.handle()?;
		Ok(usize::try_from(unsafe { ffi::sqlite3_backup_pagecount(backup.as_ptr()) }).unwrap_or_default())
	}

	/// Releases the backup handle. Finishing again is a no-op.
	pub fn finish(&mut self) -> Result<()> {
		let Some(backup) = self.handle.take() else {
			return Ok(());
		};

		let code = unsafe { ffi::sqlite3_backup_finish(backup.as_ptr()) };
		tracing::debug!(code, "finished backup");
		check(code, Some(self.dest.handle()))
	}

	#[must_use]
	pub const fn is_finished(&self) -> bool {
		self.handle.is_none()
	}

	fn handle(&self) -> Result<NonNull<ffi::Sqlite3Backup>> {
		self.handle.ok_or(Error::UseAfterClose("backup"))
	}
}

impl Drop for Backup<'_> {
	fn drop(&mut self) {
		if let Err(err) = self.finish() {
			tracing::warn!(%err, "finishing backup on drop failed");
		}
	}
}
