use core::ffi::c_int;
use std::ffi::CString;
use std::io;
use std::iter::FusedIterator;
use std::ptr::NonNull;

use crate::connection::{Connection, LiveHandle};
use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_OK, SQLITE_READONLY};
use crate::status::{Status, check};

/// Window size of [`Blob::chunks`], [`Blob::reader`] and [`Blob::writer`].
pub const BLOB_CHUNK_SIZE: usize = 16 * 1024;

/// Positioned byte I/O on one blob cell, fixed at open time.
///
/// The length never changes while the handle is open; every read and write
/// must fall inside it.
#[derive(Debug)]
pub struct Blob<'conn> {
	conn: &'conn Connection,
	handle: Option<NonNull<ffi::Sqlite3Blob>>,
	len: usize,
	readonly: bool,
}

fn name_arg(value: &str, what: &str) -> Result<CString> {
	CString::new(value).map_err(|_| Error::misuse(format!("{what} contains a NUL byte")))
}

impl<'conn> Blob<'conn> {
	pub(crate) fn open(
		conn: &'conn Connection,
		database: &str,
		table: &str,
		column: &str,
		row: i64,
		readonly: bool,
	) -> Result<Self> {
		let database_c = name_arg(database, "database name")?;
		let table_c = name_arg(table, "table name")?;
		let column_c = name_arg(column, "column name")?;

		let mut blob: *mut ffi::Sqlite3Blob = std::ptr::null_mut();
		let code = unsafe {
			ffi::sqlite3_blob_open(
				conn.as_ptr(),
				database_c.as_ptr(),
				table_c.as_ptr(),
				column_c.as_ptr(),
				row,
				c_int::from(!readonly),
				&raw mut blob,
			)
		};
		if code != SQLITE_OK {
			return Err(Status::translate(code, Some(conn.handle())).into_error());
		}

		let blob = NonNull::new(blob).ok_or_else(|| Error::misuse("SQLite returned a null blob handle"))?;
		let len = usize::try_from(unsafe { ffi::sqlite3_blob_bytes(blob.as_ptr()) }).unwrap_or_default();
		conn.registry().register(LiveHandle::Blob(blob));
		tracing::debug!(table, column, row, len, readonly, "opened blob");

		Ok(Self { conn, handle: Some(blob), len, readonly })
	}

	#[must_use]
	pub const fn byte_length(&self) -> usize {
		self.len
	}

	#[must_use]
	pub const fn is_readonly(&self) -> bool {
		self.readonly
	}

	#[must_use]
	pub const fn is_closed(&self) -> bool {
		self.handle.is_none()
	}

	/// Fills `buf` with the bytes starting at `offset`.
	pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
		let blob = self.handle()?;
		let (n, at) = self.span(offset, buf.len(), "read")?;
		if n == 0 {
			return Ok(());
		}

		let code = unsafe { ffi::sqlite3_blob_read(blob.as_ptr(), buf.as_mut_ptr().cast(), n, at) };
		check(code, Some(self.conn.handle()))
	}

	/// Overwrites the bytes starting at `offset` with `data`.
	pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
		let blob = self.handle()?;
		if self.readonly {
			return Err(Error::Execution {
				code: SQLITE_READONLY,
				message: "blob was opened read-only".to_string(),
			});
		}
		let (n, at) = self.span(offset, data.len(), "write")?;
		if n == 0 {
			return Ok(());
		}

		let code = unsafe { ffi::sqlite3_blob_write(blob.as_ptr(), data.as_ptr().cast(), n, at) };
		check(code, Some(self.conn.handle()))
	}

	/// Reads the whole blob in [`BLOB_CHUNK_SIZE`] windows from offset 0.
	#[must_use]
	pub const fn chunks(&self) -> BlobChunks<'_, 'conn> {
		BlobChunks { blob: self, offset: 0, failed: false }
	}

	#[must_use]
	pub const fn reader(&self) -> BlobReader<'_, 'conn> {
		BlobReader { blob: self, offset: 0 }
	}

	pub const fn writer(&mut self) -> BlobWriter<'_, 'conn> {
		BlobWriter { blob: self, offset: 0 }
	}

	/// Releases the native handle. Closing again is a no-op.
	pub fn close(&mut self) -> Result<()> {
		let Some(blob) = self.handle.take() else {
			return Ok(());
		};

		let code = if self.conn.registry().release(LiveHandle::Blob(blob)) {
			unsafe { ffi::sqlite3_blob_close(blob.as_ptr()) }
		} else {
			SQLITE_OK
		};
		tracing::debug!(code, "closed blob");
		check(code, Some(self.conn.handle()))
	}

	fn handle(&self) -> Result<NonNull<ffi::Sqlite3Blob>> {
		self.handle.ok_or(Error::UseAfterClose("blob"))
	}

	/// Checks `offset..offset + len` against the blob and converts both to
	/// native sizes.
	fn span(&self, offset: usize, len: usize, op: &str) -> Result<(c_int, c_int)> {
		let out_of_range = || Error::Range {
			message: format!(
				"{op} of {len} bytes at offset {offset} is outside blob of {} bytes",
				self.len
			),
		};

		let end = offset.checked_add(len).ok_or_else(out_of_range)?;
		if offset >= self.len || end > self.len {
			return Err(out_of_range());
		}

		let n = c_int::try_from(len).map_err(|_| out_of_range())?;
		let at = c_int::try_from(offset).map_err(|_| out_of_range())?;
		Ok((n, at))
	}
}

impl Drop for Blob<'_> {
	fn drop(&mut self) {
		if let Err(err) = self.close() {
			tracing::warn!(%err, "closing blob on drop failed");
		}
	}
}

/// Finite sequence of blob windows, see [`Blob::chunks`].
#[derive(Debug)]
pub struct BlobChunks<'blob, 'conn> {
	blob: &'blob Blob<'conn>,
	offset: usize,
	failed: bool,
}

impl Iterator for BlobChunks<'_, '_> {
	type Item = Result<Vec<u8>>;

	fn next(&mut self) -> Option<Self::Item> {
		let remaining = self.blob.len.saturating_sub(self.offset);
		if self.failed || remaining == 0 {
			return None;
		}

		let mut chunk = vec![0; remaining.min(BLOB_CHUNK_SIZE)];
		match self.blob.read_at(self.offset, &mut chunk) {
			Ok(()) => {
				self.offset += chunk.len();
				Some(Ok(chunk))
			}
			Err(err) => {
				self.failed = true;
				Some(Err(err))
			}
		}
	}
}

impl FusedIterator for BlobChunks<'_, '_> {}

/// Sequential [`io::Read`] over a blob from offset 0.
#[derive(Debug)]
pub struct BlobReader<'blob, 'conn> {
	blob: &'blob Blob<'conn>,
	offset: usize,
}

impl io::Read for BlobReader<'_, '_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let n = buf.len().min(self.blob.len.saturating_sub(self.offset)).min(BLOB_CHUNK_SIZE);
		let Some(window) = buf.get_mut(..n) else {
			return Ok(0);
		};
		if n == 0 {
			return Ok(0);
		}

		self.blob.read_at(self.offset, window).map_err(io::Error::other)?;
		self.offset += n;
		Ok(n)
	}
}

/// Sequential [`io::Write`] over a blob from offset 0. The blob cannot grow,
/// so writing past its end fails with [`io::ErrorKind::WriteZero`].
#[derive(Debug)]
pub struct BlobWriter<'blob, 'conn> {
	blob: &'blob mut Blob<'conn>,
	offset: usize,
}

impl io::Write for BlobWriter<'_, '_> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}

		let n = buf.len().min(self.blob.len.saturating_sub(self.offset)).min(BLOB_CHUNK_SIZE);
		let Some(window) = buf.get(..n).filter(|window| !window.is_empty()) else {
			return Err(io::Error::new(io::ErrorKind::WriteZero, "write past the end of the blob"));
		};

		self.blob.write_at(self.offset, window).map_err(io::Error::other)?;
		self.offset += n;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}
