use core::ffi::{c_char, c_int, c_void};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{
	SQLITE_BLOB, SQLITE_DETERMINISTIC, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_MISUSE, SQLITE_TEXT,
	SQLITE_UTF8, sqlite_transient,
};
use crate::value::Value;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Connection-wide bookkeeping for steps that may call back into Rust.
#[derive(Default)]
pub(crate) struct CallbackState {
	depth: Cell<usize>,
	panic: RefCell<Option<PanicPayload>>,
}

pub(crate) struct CallbackGuard<'a> {
	state: &'a CallbackState,
}

impl Drop for CallbackGuard<'_> {
	fn drop(&mut self) {
		self.state.depth.set(self.state.depth.get().saturating_sub(1));
	}
}

/// Hides any enclosing callback step for the lifetime of a plain step.
pub(crate) struct SuspendGuard<'a> {
	state: &'a CallbackState,
	saved: usize,
}

impl Drop for SuspendGuard<'_> {
	fn drop(&mut self) {
		self.state.depth.set(self.saved);
	}
}

impl CallbackState {
	pub(crate) fn enter(&self) -> CallbackGuard<'_> {
		self.depth.set(self.depth.get() + 1);
		CallbackGuard { state: self }
	}

	pub(crate) fn suspend(&self) -> SuspendGuard<'_> {
		SuspendGuard { state: self, saved: self.depth.replace(0) }
	}

	pub(crate) fn is_active(&self) -> bool {
		self.depth.get() > 0
	}

	/// Keeps the first payload; later panics in the same step are dropped.
	fn park_panic(&self, payload: PanicPayload) {
		let mut slot = self.panic.borrow_mut();
		if slot.is_none() {
			*slot = Some(payload);
		}
	}

	pub(crate) fn take_panic(&self) -> Option<PanicPayload> {
		self.panic.borrow_mut().take()
	}
}

type ScalarFn = dyn FnMut(&[Value]) -> Result<Value>;

struct FunctionSlot {
	func: RefCell<Box<ScalarFn>>,
	callbacks: Rc<CallbackState>,
}

pub(crate) fn register_scalar(
	db: *mut ffi::Sqlite3,
	callbacks: &Rc<CallbackState>,
	name: &str,
	n_args: i32,
	deterministic: bool,
	func: Box<ScalarFn>,
) -> c_int {
	let Ok(name) = CString::new(name) else {
		return SQLITE_MISUSE;
	};

	let slot = Box::new(FunctionSlot { func: RefCell::new(func), callbacks: Rc::clone(callbacks) });
	let encoding = c_int::from(SQLITE_UTF8);
	let flags = if deterministic { encoding | SQLITE_DETERMINISTIC } else { encoding };

	// On failure the engine has already invoked `drop_slot`.
	unsafe {
		ffi::sqlite3_create_function_v2(
			db,
			name.as_ptr(),
			n_args,
			flags,
			Box::into_raw(slot).cast(),
			Some(call_scalar),
			None,
			None,
			Some(drop_slot),
		)
	}
}

unsafe extern "C" fn drop_slot(slot: *mut c_void) {
	if !slot.is_null() {
		drop(unsafe { Box::from_raw(slot.cast::<FunctionSlot>()) });
	}
}

unsafe extern "C" fn call_scalar(
	context: *mut ffi::Sqlite3Context,
	argc: c_int,
	argv: *mut *mut ffi::Sqlite3Value,
) {
	let slot = unsafe { &*ffi::sqlite3_user_data(context).cast::<FunctionSlot>() };
	let args = unsafe { read_args(argc, argv) };

	let outcome = catch_unwind(AssertUnwindSafe(|| {
		let Ok(mut func) = slot.func.try_borrow_mut() else {
			return Err(Error::misuse("user function re-entered itself"));
		};
		func(&args)
	}));

	match outcome {
		Ok(Ok(value)) => unsafe { set_result(context, &value) },
		Ok(Err(err)) => unsafe { set_error(context, &err.to_string()) },
		Err(payload) => {
			if slot.callbacks.is_active() {
				slot.callbacks.park_panic(payload);
			}
			unsafe { set_error(context, "user function panicked") };
		}
	}
}

unsafe fn read_args(argc: c_int, argv: *mut *mut ffi::Sqlite3Value) -> Vec<Value> {
	let count = usize::try_from(argc).unwrap_or_default();
	if argv.is_null() || count == 0 {
		return Vec::new();
	}

	let values = unsafe { std::slice::from_raw_parts(argv, count) };
	values.iter().map(|value| unsafe { read_value(*value) }).collect()
}

unsafe fn read_value(value: *mut ffi::Sqlite3Value) -> Value {
	match unsafe { ffi::sqlite3_value_type(value) } {
		SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_value_int64(value) }),
		SQLITE_FLOAT => Value::Float(unsafe { ffi::sqlite3_value_double(value) }),
		SQLITE_TEXT => {
			let ptr = unsafe { ffi::sqlite3_value_text(value) };
			let len = usize::try_from(unsafe { ffi::sqlite3_value_bytes(value) }).unwrap_or_default();
			if len == 0 || ptr.is_null() {
				Value::Text(String::new())
			} else {
				let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
				Value::Text(String::from_utf8_lossy(slice).into_owned())
			}
		}
		SQLITE_BLOB => {
			let ptr = unsafe { ffi::sqlite3_value_blob(value) };
			let len = usize::try_from(unsafe { ffi::sqlite3_value_bytes(value) }).unwrap_or_default();
			if len == 0 || ptr.is_null() {
				Value::Blob(Vec::new())
			} else {
				Value::Blob(unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }.to_vec())
			}
		}
		_ => Value::Null,
	}
}

unsafe fn set_result(context: *mut ffi::Sqlite3Context, value: &Value) {
	match value {
		Value::Null => unsafe { ffi::sqlite3_result_null(context) },
		Value::Integer(v) => unsafe { ffi::sqlite3_result_int64(context, *v) },
		Value::Float(v) => unsafe { ffi::sqlite3_result_double(context, *v) },
		Value::Text(v) => unsafe {
			ffi::sqlite3_result_text64(
				context,
				v.as_ptr().cast::<c_char>(),
				v.len() as u64,
				sqlite_transient(),
				SQLITE_UTF8,
			);
		},
		Value::Blob(v) => unsafe {
			ffi::sqlite3_result_blob64(context, v.as_ptr().cast(), v.len() as u64, sqlite_transient());
		},
	}
}

unsafe fn set_error(context: *mut ffi::Sqlite3Context, message: &str) {
	let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
	unsafe { ffi::sqlite3_result_error(context, message.as_ptr().cast(), len) };
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guard_tracks_depth() {
		let state = CallbackState::default();
		assert!(!state.is_active());
		{
			let _outer = state.enter();
			let _inner = state.enter();
			assert!(state.is_active());
		}
		assert!(!state.is_active());
	}

	#[test]
	fn suspend_hides_and_restores_depth() {
		let state = CallbackState::default();
		let _outer = state.enter();
		{
			let _plain = state.suspend();
			assert!(!state.is_active());
			let _nested = state.enter();
			assert!(state.is_active());
		}
		assert!(state.is_active());
	}

	#[test]
	fn first_parked_panic_wins() {
		let state = CallbackState::default();
		state.park_panic(Box::new("first"));
		state.park_panic(Box::new("second"));

		let payload = state.take_panic().expect("payload parked");
		assert_eq!(payload.downcast_ref::<&str>(), Some(&"first"));
		assert!(state.take_panic().is_none());
	}
}
