use core::ffi::c_int;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::ffi;
use crate::raw::{SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_TEXT};
use crate::value::Value;

/// Decodes column `index` of the current row.
///
/// Narrow mode reads INTEGER columns through the engine's 32-bit accessor,
/// so wider stored values come back truncated.
pub(crate) fn decode_column(stmt: NonNull<ffi::Sqlite3Stmt>, index: c_int, wide: bool) -> Value {
	let stmt = stmt.as_ptr();
	match unsafe { ffi::sqlite3_column_type(stmt, index) } {
		SQLITE_INTEGER if wide => Value::Integer(unsafe { ffi::sqlite3_column_int64(stmt, index) }),
		SQLITE_INTEGER => Value::Integer(i64::from(unsafe { ffi::sqlite3_column_int(stmt, index) })),
		SQLITE_FLOAT => {
			let v = unsafe { ffi::sqlite3_column_double(stmt, index) };
			if v.is_nan() { Value::Null } else { Value::Float(v) }
		}
		SQLITE_TEXT => {
			let ptr = unsafe { ffi::sqlite3_column_text(stmt, index) };
			let bytes = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
			match column_slice(ptr, bytes) {
				Some(slice) => Value::Text(String::from_utf8_lossy(slice).into_owned()),
				None => Value::Null,
			}
		}
		SQLITE_BLOB => {
			let ptr = unsafe { ffi::sqlite3_column_blob(stmt, index) };
			let bytes = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
			column_slice(ptr.cast(), bytes).map_or(Value::Null, |slice| Value::Blob(slice.to_vec()))
		}
		_ => Value::Null,
	}
}

/// Zero length yields an empty slice without touching `ptr`; a null pointer
/// with a non-zero length (allocation failure) yields `None`.
fn column_slice<'a>(ptr: *const u8, bytes: c_int) -> Option<&'a [u8]> {
	let len = usize::try_from(bytes).unwrap_or_default();
	if len == 0 {
		return Some(&[]);
	}
	if ptr.is_null() {
		return None;
	}
	Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Row layout of a statement: column names in declaration order plus the
/// integer mode the rows decode with. Built once and shared by every row
/// read through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowShape {
	names: Rc<[String]>,
	wide: bool,
}

impl RowShape {
	pub(crate) fn read(stmt: NonNull<ffi::Sqlite3Stmt>, wide: bool) -> Self {
		let count = unsafe { ffi::sqlite3_column_count(stmt.as_ptr()) };
		let names = (0..count)
			.map(|index| {
				let ptr = unsafe { ffi::sqlite3_column_name(stmt.as_ptr(), index) };
				if ptr.is_null() {
					String::new()
				} else {
					unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
				}
			})
			.collect();
		Self { names, wide }
	}

	pub(crate) const fn is_wide(&self) -> bool {
		self.wide
	}

	pub(crate) fn names(&self) -> &[String] {
		&self.names
	}

	pub(crate) fn values(&self, stmt: NonNull<ffi::Sqlite3Stmt>) -> Vec<Value> {
		(0..self.names.len())
			.map_while(|index| c_int::try_from(index).ok())
			.map(|index| decode_column(stmt, index, self.wide))
			.collect()
	}

	pub(crate) fn row(&self, stmt: NonNull<ffi::Sqlite3Stmt>) -> Row {
		Row { names: Rc::clone(&self.names), values: self.values(stmt) }
	}
}

/// One result row with its column names.
///
/// Lookup by name returns the first column carrying that name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
	names: Rc<[String]>,
	values: Vec<Value>,
}

impl Row {
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		let index = self.names.iter().position(|column| column == name)?;
		self.values.get(index)
	}

	#[must_use]
	pub fn get_index(&self, index: usize) -> Option<&Value> {
		self.values.get(index)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.values.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	#[must_use]
	pub fn column_names(&self) -> &[String] {
		&self.names
	}

	#[must_use]
	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.names.iter().map(String::as_str).zip(self.values.iter())
	}

	#[must_use]
	pub fn into_values(self) -> Vec<Value> {
		self.values
	}

	/// Later duplicates of a column name overwrite earlier ones.
	#[must_use]
	pub fn into_map(self) -> BTreeMap<String, Value> {
		self.names.iter().cloned().zip(self.values).collect()
	}
}
