use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{Error, Result};

/// A decoded column value.
///
/// In narrow integer mode `Integer` holds the engine's 32-bit truncation of
/// the stored value; enable wide integers on the connection for full 64-bit
/// values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Integer(i64),
	Float(f64),
	/// Invalid UTF-8 stored as TEXT is decoded with U+FFFD replacements;
	/// select the column as a BLOB (`cast(x as blob)`) for the raw bytes.
	Text(String),
	Blob(Vec<u8>),
}

impl Value {
	#[must_use]
	pub const fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	#[must_use]
	pub const fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Integer(v) => Some(*v),
			_ => None,
		}
	}

	#[must_use]
	#[expect(clippy::cast_precision_loss, reason = "integers widen to double like the engine does")]
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Float(v) => Some(*v),
			Self::Integer(v) => Some(*v as f64),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(v) => Some(v),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_blob(&self) -> Option<&[u8]> {
		match self {
			Self::Blob(v) => Some(v),
			_ => None,
		}
	}
}

/// A value that can be bound to a statement parameter.
///
/// `Integer` and `Float` both model a plain number: a whole number that fits
/// in 32 bits binds as a 32-bit integer, any other whole number as a 64-bit
/// integer, and only a fractional (or non-finite) number binds as a double.
/// `BigInt` always binds as a 64-bit integer. NaN binds as a double, which
/// the engine stores as NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
	Null,
	Integer(i64),
	Float(f64),
	BigInt(i64),
	Text(String),
	Blob(Vec<u8>),
	Timestamp(DateTime<Utc>),
	Bool(bool),
}

impl BindValue {
	/// ISO-8601 with millisecond precision and a `Z` suffix.
	#[must_use]
	pub fn timestamp_text(at: &DateTime<Utc>) -> String {
		at.to_rfc3339_opts(SecondsFormat::Millis, true)
	}
}

macro_rules! bind_integer_from {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for BindValue {
				fn from(value: $ty) -> Self {
					Self::Integer(i64::from(value))
				}
			}
		)*
	};
}

bind_integer_from!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<u64> for BindValue {
	type Error = Error;

	fn try_from(value: u64) -> Result<Self> {
		i64::try_from(value)
			.map(Self::BigInt)
			.map_err(|_| Error::unsupported_value(format_args!("u64 {value} exceeds 64-bit signed range")))
	}
}

impl TryFrom<i128> for BindValue {
	type Error = Error;

	fn try_from(value: i128) -> Result<Self> {
		i64::try_from(value)
			.map(Self::BigInt)
			.map_err(|_| Error::unsupported_value(format_args!("i128 {value} exceeds 64-bit signed range")))
	}
}

impl From<f64> for BindValue {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<f32> for BindValue {
	fn from(value: f32) -> Self {
		Self::Float(f64::from(value))
	}
}

impl From<bool> for BindValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<&str> for BindValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for BindValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

impl From<&[u8]> for BindValue {
	fn from(value: &[u8]) -> Self {
		Self::Blob(value.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for BindValue {
	fn from(value: &[u8; N]) -> Self {
		Self::Blob(value.to_vec())
	}
}

impl From<Vec<u8>> for BindValue {
	fn from(value: Vec<u8>) -> Self {
		Self::Blob(value)
	}
}

impl<Tz: TimeZone> From<DateTime<Tz>> for BindValue {
	fn from(value: DateTime<Tz>) -> Self {
		Self::Timestamp(value.with_timezone(&Utc))
	}
}

impl<T: Into<Self>> From<Option<T>> for BindValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}

impl From<Value> for BindValue {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Self::Null,
			Value::Integer(v) => Self::BigInt(v),
			Value::Float(v) => Self::Float(v),
			Value::Text(v) => Self::Text(v),
			Value::Blob(v) => Self::Blob(v),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rust_primitives_convert() {
		assert_eq!(BindValue::from(7_u8), BindValue::Integer(7));
		assert_eq!(BindValue::from(-3_i64), BindValue::Integer(-3));
		assert_eq!(BindValue::from(1.5_f32), BindValue::Float(1.5));
		assert_eq!(BindValue::from("hi"), BindValue::Text("hi".to_string()));
		assert_eq!(BindValue::from(b"ab"), BindValue::Blob(vec![b'a', b'b']));
		assert_eq!(BindValue::from(None::<i32>), BindValue::Null);
		assert_eq!(BindValue::from(Some(true)), BindValue::Bool(true));
	}

	#[test]
	fn oversized_integers_are_unsupported() {
		let err = BindValue::try_from(u64::MAX).expect_err("u64::MAX does not fit");
		assert!(matches!(err, Error::Bind { .. }));
		assert!(err.to_string().contains("unsupported value type"));

		assert_eq!(BindValue::try_from(5_u64).expect("fits"), BindValue::BigInt(5));
		assert!(BindValue::try_from(i128::MIN).is_err());
	}

	#[test]
	fn timestamps_render_as_iso_8601() {
		let at = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).single().expect("valid date");
		assert_eq!(BindValue::timestamp_text(&at), "2001-01-01T00:00:00.000Z");
	}

	#[test]
	fn value_accessors() {
		assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
		assert_eq!(Value::Text("x".to_string()).as_str(), Some("x"));
		assert!(Value::Null.is_null());
		assert_eq!(Value::Blob(vec![1]).as_blob(), Some(&[1_u8][..]));
	}
}
