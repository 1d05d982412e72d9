use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use litestmt::{Connection, Error, OpenOptions, StepMode, Value, params};

fn with_functions() -> Connection {
	let db = OpenOptions::new().wide_integers(true).open(":memory:").expect("open memory database");
	db.create_function("twice", 1, true, |args| {
		Ok(match args.first() {
			Some(Value::Integer(v)) => Value::Integer(v * 2),
			Some(Value::Float(v)) => Value::Float(v * 2.0),
			Some(Value::Text(v)) => Value::Text(v.repeat(2)),
			Some(Value::Blob(v)) => Value::Blob(v.repeat(2)),
			Some(Value::Null) | None => Value::Null,
		})
	})
	.expect("register twice");
	db.create_function("refuse", 0, false, |_| {
		Err(Error::Execution { code: 1, message: "refused by policy".to_string() })
	})
	.expect("register refuse");
	db.create_function("explode", 0, false, |_| -> litestmt::Result<Value> { panic!("boom") })
		.expect("register explode");
	db
}

#[test]
fn scalar_functions_see_decoded_arguments() {
	let db = with_functions();
	let mut stmt = db.prepare("select twice(?), twice(?), twice(?), twice(?), twice(null)").expect("prepare");
	stmt.enable_callback();

	let row = stmt
		.value(params![1_i64 << 40, 1.25, "ab", b"\x01"])
		.expect("call function")
		.expect("one row");
	assert_eq!(
		row,
		vec![
			Value::Integer(1_i64 << 41),
			Value::Float(2.5),
			Value::Text("abab".to_string()),
			Value::Blob(vec![1, 1]),
			Value::Null,
		]
	);
}

#[test]
fn function_errors_become_execution_errors() {
	let db = with_functions();
	let mut stmt = db.prepare("select refuse()").expect("prepare");
	let err = stmt.value(()).expect_err("function refuses");
	assert!(matches!(&err, Error::Execution { message, .. } if message.contains("refused by policy")));
}

#[test]
fn callback_mode_resumes_panics_on_the_caller() {
	let db = with_functions();
	let mut stmt = db.prepare("select explode()").expect("prepare");
	stmt.set_callback(true);
	assert_eq!(stmt.step_mode(), StepMode::Callback);

	let outcome = catch_unwind(AssertUnwindSafe(|| stmt.value(())));
	let payload = outcome.expect_err("panic crosses back into Rust");
	assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
	assert!(!db.in_callback_step());

	let mut after = db.prepare("select twice(21)").expect("prepare after panic");
	assert_eq!(after.value(()).expect("connection still usable"), Some(vec![Value::Integer(42)]));
}

#[test]
fn plain_mode_reports_panics_as_errors() {
	let db = with_functions();
	let mut stmt = db.prepare("select explode()").expect("prepare");
	assert!(!stmt.callback());

	let err = stmt.value(()).expect_err("panic reported as SQL error");
	assert!(err.to_string().contains("user function panicked"));
}

#[test]
fn plain_step_inside_a_callback_step_keeps_its_panic() {
	let db = Rc::new(with_functions());
	let inner: Weak<Connection> = Rc::downgrade(&db);
	db.create_function("guarded", 0, false, move |_| {
		let Some(db) = inner.upgrade() else {
			return Ok(Value::Null);
		};
		let mut stmt = db.prepare("select explode()")?;
		Ok(match stmt.value(()) {
			Ok(_) => Value::Integer(1),
			Err(err) if err.to_string().contains("user function panicked") => Value::Integer(0),
			Err(err) => return Err(err),
		})
	})
	.expect("register guarded");

	let mut stmt = db.prepare("select guarded()").expect("prepare");
	stmt.enable_callback();
	let outcome = catch_unwind(AssertUnwindSafe(|| stmt.value(())));
	let row = outcome.expect("handled panic stays inside the function").expect("select");
	assert_eq!(row, Some(vec![Value::Integer(0)]));
	assert!(!db.in_callback_step());
}

#[test]
fn stateful_functions_keep_their_captures() {
	let db = Connection::open_in_memory().expect("open memory database");
	let calls = Rc::new(Cell::new(0));
	let seen = Rc::clone(&calls);
	db.create_function("tick", 0, false, move |_| {
		seen.set(seen.get() + 1);
		Ok(Value::Integer(seen.get()))
	})
	.expect("register tick");

	let mut stmt = db.prepare("select tick() from (select 1 union all select 2 union all select 3)").expect("prepare");
	stmt.enable_callback();
	let values = stmt.values(()).expect("values");
	assert_eq!(values, [[Value::Integer(1)], [Value::Integer(2)], [Value::Integer(3)]]);
	assert_eq!(calls.get(), 3);
}
