use core::ffi::c_int;
use std::collections::{BTreeMap, HashMap};
use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_MISUSE, SQLITE_OK, SQLITE_RANGE, SQLITE_STATIC, SQLITE_UTF8};
use crate::status::{Status, StatusKind};
use crate::value::BindValue;

/// Arguments for one statement call.
///
/// `Named` resolves each name through the statement; a name without a
/// `:`, `@` or `$` prefix is looked up as `:name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
	#[default]
	None,
	Positional(Vec<BindValue>),
	Named(Vec<(String, BindValue)>),
}

impl Params {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		match self {
			Self::None => true,
			Self::Positional(values) => values.is_empty(),
			Self::Named(values) => values.is_empty(),
		}
	}
}

impl From<()> for Params {
	fn from((): ()) -> Self {
		Self::None
	}
}

impl From<Vec<BindValue>> for Params {
	fn from(values: Vec<BindValue>) -> Self {
		Self::Positional(values)
	}
}

impl<const N: usize> From<[BindValue; N]> for Params {
	fn from(values: [BindValue; N]) -> Self {
		Self::Positional(values.into())
	}
}

impl From<Vec<(String, BindValue)>> for Params {
	fn from(values: Vec<(String, BindValue)>) -> Self {
		Self::Named(values)
	}
}

impl<S: std::hash::BuildHasher> From<HashMap<String, BindValue, S>> for Params {
	fn from(values: HashMap<String, BindValue, S>) -> Self {
		Self::Named(values.into_iter().collect())
	}
}

impl From<BTreeMap<String, BindValue>> for Params {
	fn from(values: BTreeMap<String, BindValue>) -> Self {
		Self::Named(values.into_iter().collect())
	}
}

/// Positional parameters: `params![1, "two", 3.5]`.
#[macro_export]
macro_rules! params {
	() => {
		$crate::Params::None
	};
	($($value:expr),+ $(,)?) => {
		$crate::Params::Positional(vec![$($crate::BindValue::from($value)),+])
	};
}

/// Named parameters: `named_params! { "id" => 1, ":name" => "x" }`.
#[macro_export]
macro_rules! named_params {
	() => {
		$crate::Params::None
	};
	($($name:expr => $value:expr),+ $(,)?) => {
		$crate::Params::Named(vec![$((::std::string::String::from($name), $crate::BindValue::from($value))),+])
	};
}

/// The native bind call a [`BindValue`] turns into.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindCall {
	Null,
	Int(i32),
	Int64(i64),
	Double(f64),
	Text(Vec<u8>),
	Blob(Vec<u8>),
}

const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// First matching rule wins: 32-bit whole numbers, wider whole numbers,
/// fractional numbers, text, null, bytes, timestamps, big integers, booleans.
pub(crate) fn coerce(value: BindValue) -> Result<BindCall> {
	match value {
		BindValue::Integer(v) => Ok(i32::try_from(v).map_or(BindCall::Int64(v), BindCall::Int)),
		BindValue::Float(v) => coerce_number(v),
		BindValue::Text(v) => Ok(BindCall::Text(v.into_bytes())),
		BindValue::Null => Ok(BindCall::Null),
		BindValue::Blob(v) => Ok(BindCall::Blob(v)),
		BindValue::Timestamp(at) => Ok(BindCall::Text(BindValue::timestamp_text(&at).into_bytes())),
		BindValue::BigInt(v) => Ok(BindCall::Int64(v)),
		BindValue::Bool(v) => Ok(BindCall::Int(i32::from(v))),
	}
}

#[expect(clippy::cast_possible_truncation, reason = "range is checked before each cast")]
fn coerce_number(v: f64) -> Result<BindCall> {
	if !v.is_finite() || v.fract() != 0.0 {
		return Ok(BindCall::Double(v));
	}
	if v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) {
		return Ok(BindCall::Int(v as i32));
	}
	if (I64_LOWER..I64_UPPER).contains(&v) {
		return Ok(BindCall::Int64(v as i64));
	}
	Err(Error::unsupported_value(format_args!("whole number {v} exceeds 64-bit integer range")))
}

pub(crate) fn normalize_parameter_name(name: &str) -> String {
	if name.starts_with([':', '@', '$']) { name.to_string() } else { format!(":{name}") }
}

/// 1-based index of `name`, `None` when the statement has no such parameter.
pub(crate) fn parameter_index(stmt: NonNull<ffi::Sqlite3Stmt>, name: &str) -> Result<Option<usize>> {
	let name = CString::new(normalize_parameter_name(name)).map_err(|_| Error::Bind {
		code: SQLITE_MISUSE,
		message: "parameter name contains a NUL byte".to_string(),
	})?;
	let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt.as_ptr(), name.as_ptr()) };
	Ok(usize::try_from(index).ok().filter(|index| *index > 0))
}

// Backs zero-length text and blobs so the engine never sees a null pointer.
static EMPTY: [u8; 1] = [0];

/// Binds arguments and keeps every buffer handed to the engine alive until
/// [`Binder::release`].
#[derive(Debug, Default)]
pub(crate) struct Binder {
	retained: Vec<Box<[u8]>>,
}

impl Binder {
	pub(crate) fn bind_params(
		&mut self,
		db: NonNull<ffi::Sqlite3>,
		stmt: NonNull<ffi::Sqlite3Stmt>,
		params: Params,
	) -> Result<()> {
		match params {
			Params::None => Ok(()),
			Params::Positional(values) => {
				for (offset, value) in values.into_iter().enumerate() {
					self.bind_at(db, stmt, offset, value)?;
				}
				Ok(())
			}
			Params::Named(values) => {
				for (name, value) in values {
					let Some(index) = parameter_index(stmt, &name)? else {
						return Err(Error::unknown_parameter(&name));
					};
					self.bind_at(db, stmt, index - 1, value)?;
				}
				Ok(())
			}
		}
	}

	/// `offset` is 0-based; the native index is `offset + 1`.
	fn bind_at(
		&mut self,
		db: NonNull<ffi::Sqlite3>,
		stmt: NonNull<ffi::Sqlite3Stmt>,
		offset: usize,
		value: BindValue,
	) -> Result<()> {
		let index = offset
			.checked_add(1)
			.and_then(|index| c_int::try_from(index).ok())
			.ok_or_else(|| Error::Bind {
				code: SQLITE_RANGE,
				message: format!("parameter offset {offset} does not fit a native index"),
			})?;
		let stmt = stmt.as_ptr();

		let code = match coerce(value)? {
			BindCall::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },
			BindCall::Int(v) => unsafe { ffi::sqlite3_bind_int(stmt, index, v) },
			BindCall::Int64(v) => unsafe { ffi::sqlite3_bind_int64(stmt, index, v) },
			BindCall::Double(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, v) },
			BindCall::Text(bytes) => {
				let (ptr, len) = self.retain(bytes);
				unsafe {
					ffi::sqlite3_bind_text64(stmt, index, ptr.cast(), len, SQLITE_STATIC, SQLITE_UTF8)
				}
			}
			BindCall::Blob(bytes) => {
				let (ptr, len) = self.retain(bytes);
				unsafe { ffi::sqlite3_bind_blob64(stmt, index, ptr.cast(), len, SQLITE_STATIC) }
			}
		};

		if code == SQLITE_OK {
			return Ok(());
		}
		let status = Status::translate(code, Some(db));
		Err(match status.kind {
			StatusKind::Misuse => status.into_error(),
			StatusKind::Ok | StatusKind::Other => {
				Error::Bind { code: status.code, message: status.message }
			}
		})
	}

	fn retain(&mut self, bytes: Vec<u8>) -> (*const u8, u64) {
		if bytes.is_empty() {
			return (EMPTY.as_ptr(), 0);
		}

		let buffer = bytes.into_boxed_slice();
		let ptr = buffer.as_ptr();
		let len = buffer.len() as u64;
		self.retained.push(buffer);
		(ptr, len)
	}

	/// Callers must clear the statement's bindings first.
	pub(crate) fn release(&mut self) {
		self.retained.clear();
	}

	pub(crate) fn retained(&self) -> usize {
		self.retained.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whole_numbers_pick_the_narrowest_integer_call() {
		assert_eq!(coerce(BindValue::Integer(42)), Ok(BindCall::Int(42)));
		assert_eq!(coerce(BindValue::Integer(1 << 40)), Ok(BindCall::Int64(1 << 40)));
		assert_eq!(coerce(BindValue::Float(-7.0)), Ok(BindCall::Int(-7)));
		assert_eq!(coerce(BindValue::Float(2_147_483_648.0)), Ok(BindCall::Int64(2_147_483_648)));
		assert_eq!(coerce(BindValue::Float(2.5)), Ok(BindCall::Double(2.5)));
	}

	#[test]
	fn non_finite_numbers_bind_as_doubles() {
		assert!(matches!(coerce(BindValue::Float(f64::NAN)), Ok(BindCall::Double(v)) if v.is_nan()));
		assert_eq!(coerce(BindValue::Float(f64::INFINITY)), Ok(BindCall::Double(f64::INFINITY)));
	}

	#[test]
	fn huge_whole_numbers_are_rejected() {
		let err = coerce(BindValue::Float(1e300)).expect_err("1e300 has no integer form");
		assert!(matches!(err, Error::Bind { .. }));
	}

	#[test]
	fn other_shapes_map_directly() {
		assert_eq!(coerce(BindValue::Bool(true)), Ok(BindCall::Int(1)));
		assert_eq!(coerce(BindValue::Bool(false)), Ok(BindCall::Int(0)));
		assert_eq!(coerce(BindValue::BigInt(5)), Ok(BindCall::Int64(5)));
		assert_eq!(coerce(BindValue::Null), Ok(BindCall::Null));
		assert_eq!(coerce(BindValue::Text(String::new())), Ok(BindCall::Text(Vec::new())));
		assert_eq!(coerce(BindValue::Blob(vec![9])), Ok(BindCall::Blob(vec![9])));
	}

	#[test]
	fn names_default_to_colon_prefix() {
		assert_eq!(normalize_parameter_name("id"), ":id");
		assert_eq!(normalize_parameter_name(":id"), ":id");
		assert_eq!(normalize_parameter_name("@id"), "@id");
		assert_eq!(normalize_parameter_name("$id"), "$id");
	}

	#[test]
	fn retained_buffers_skip_empty_values() {
		let mut binder = Binder::default();
		let (ptr, len) = binder.retain(Vec::new());
		assert!(!ptr.is_null());
		assert_eq!(len, 0);
		assert_eq!(binder.retained(), 0);

		let _ = binder.retain(b"abc".to_vec());
		assert_eq!(binder.retained(), 1);
		binder.release();
		assert_eq!(binder.retained(), 0);
	}

	#[test]
	fn params_macros_build_both_shapes() {
		assert_eq!(params![], Params::None);
		assert_eq!(
			params![1, "a"],
			Params::Positional(vec![BindValue::Integer(1), BindValue::Text("a".to_string())])
		);
		assert_eq!(
			named_params! { "id" => 2 },
			Params::Named(vec![("id".to_string(), BindValue::Integer(2))])
		);
		assert!(Params::from(()).is_empty());
	}
}
