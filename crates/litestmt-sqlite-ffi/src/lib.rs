use core::ffi::c_int;
use std::ffi::{CStr, CString};

#[cfg(feature = "bundled-sqlite")]
extern crate libsqlite3_sys as _;

pub mod ffi;
pub mod raw;

pub fn sqlite_lib_version_number() -> i32 {
	unsafe { ffi::sqlite3_libversion_number() }
}

pub fn sqlite_lib_version() -> String {
	unsafe { CStr::from_ptr(ffi::sqlite3_libversion()).to_string_lossy().into_owned() }
}

pub fn sqlite_source_id() -> String {
	unsafe { CStr::from_ptr(ffi::sqlite3_sourceid()).to_string_lossy().into_owned() }
}

pub fn sqlite_compile_option_used(name: &str) -> bool {
	let Ok(name) = CString::new(name) else {
		return false;
	};
	unsafe { ffi::sqlite3_compileoption_used(name.as_ptr()) != 0 }
}

pub fn sqlite_compile_options() -> Vec<String> {
	let mut result = Vec::new();
	let mut index: c_int = 0;

	loop {
		let option = unsafe { ffi::sqlite3_compileoption_get(index) };
		if option.is_null() {
			break;
		}

		result.push(unsafe { CStr::from_ptr(option).to_string_lossy().into_owned() });
		index += 1;
	}

	result
}

/// Static description of a result code, e.g. `"database is locked"`.
pub fn sqlite_errstr(code: c_int) -> String {
	let ptr = unsafe { ffi::sqlite3_errstr(code) };
	if ptr.is_null() {
		return format!("unknown error ({code})");
	}
	unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn has_sqlite_version_number() {
		assert!(sqlite_lib_version_number() >= 3_000_000);
	}

	#[test]
	fn has_sqlite_version_text() {
		assert!(!sqlite_lib_version().is_empty());
		assert!(!sqlite_source_id().is_empty());
	}

	#[test]
	fn reports_compile_options() {
		assert!(!sqlite_compile_options().is_empty());
		assert!(!sqlite_compile_option_used("NOT_A_REAL_OPTION"));
	}

	#[test]
	fn errstr_describes_codes() {
		assert_eq!(sqlite_errstr(raw::SQLITE_MISUSE), "bad parameter or other API misuse");
		assert_eq!(sqlite_errstr(raw::SQLITE_RANGE), "column index out of range");
	}
}
