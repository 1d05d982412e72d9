pub use litestmt_sqlite_ffi::ffi;
pub use litestmt_sqlite_ffi::raw;

mod backup;
mod binder;
mod blob;
mod connection;
mod error;
mod function;
mod row;
mod statement;
mod status;
mod stepper;
mod value;

use std::ffi::CString;

pub use backup::Backup;
pub use binder::Params;
pub use blob::{BLOB_CHUNK_SIZE, Blob, BlobChunks, BlobReader, BlobWriter};
pub use connection::{Connection, OpenOptions, Transaction, TransactionMode};
pub use error::{Error, Result};
pub use row::Row;
pub use statement::{Rows, Statement};
pub use status::{Status, StatusKind, errstr};
pub use stepper::{CursorState, StepMode};
pub use value::{BindValue, Value};

/// True when `sql` ends in a complete SQL statement.
#[must_use]
pub fn is_complete(sql: &str) -> bool {
	let Ok(sql) = CString::new(sql) else {
		return false;
	};
	unsafe { ffi::sqlite3_complete(sql.as_ptr()) != 0 }
}

pub fn sqlite_lib_version() -> String {
	litestmt_sqlite_ffi::sqlite_lib_version()
}

pub fn sqlite_lib_version_number() -> i32 {
	litestmt_sqlite_ffi::sqlite_lib_version_number()
}

pub fn sqlite_source_id() -> String {
	litestmt_sqlite_ffi::sqlite_source_id()
}

pub fn sqlite_compile_option_used(name: &str) -> bool {
	litestmt_sqlite_ffi::sqlite_compile_option_used(name)
}

pub fn sqlite_compile_options() -> Vec<String> {
	litestmt_sqlite_ffi::sqlite_compile_options()
}
