use core::ffi::c_int;
use std::ffi::{CStr, CString};
use std::fmt;
use std::iter::FusedIterator;
use std::ptr::NonNull;

use crate::binder::{Binder, Params, parameter_index};
use crate::connection::{Connection, LiveHandle};
use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_MISUSE, SQLITE_NOMEM, SQLITE_OK};
use crate::row::{Row, RowShape};
use crate::status::Status;
use crate::stepper::{self, CursorState, Step, StepMode};
use crate::value::Value;

/// A prepared statement bound to the connection it was prepared on.
///
/// Every query call resets the cursor, binds its arguments (unless the
/// statement has no parameters or was bound once with [`Statement::bind`]),
/// steps, and releases the argument buffers once the cycle ends. The native
/// handle is released by [`Statement::finalize`] or on drop, never twice.
pub struct Statement<'conn> {
	conn: &'conn Connection,
	handle: Option<NonNull<ffi::Sqlite3Stmt>>,
	param_count: usize,
	mode: StepMode,
	bound: bool,
	state: CursorState,
	binder: Binder,
	shape: Option<RowShape>,
}

impl<'conn> Statement<'conn> {
	pub(crate) fn prepare(conn: &'conn Connection, sql: &str) -> Result<Self> {
		let sql_c = CString::new(sql).map_err(|_| Error::Prepare {
			code: SQLITE_MISUSE,
			message: "SQL contains a NUL byte".to_string(),
		})?;

		match Self::prepare_at(conn, &sql_c, 0)? {
			(Some(stmt), _) => Ok(stmt),
			(None, _) => Err(Error::Prepare {
				code: SQLITE_MISUSE,
				message: "SQL did not produce a statement".to_string(),
			}),
		}
	}

	/// Prepares the first statement starting at byte `offset` of `sql` and
	/// returns it with the offset of the unparsed tail. Whitespace or
	/// comments alone produce no statement.
	pub(crate) fn prepare_at(
		conn: &'conn Connection,
		sql: &CStr,
		offset: usize,
	) -> Result<(Option<Self>, usize)> {
		let total = sql.to_bytes().len();
		if offset >= total {
			return Ok((None, total));
		}

		let start = sql.as_ptr();
		let head = unsafe { start.add(offset) };
		let mut stmt: *mut ffi::Sqlite3Stmt = std::ptr::null_mut();
		let mut tail: *const core::ffi::c_char = std::ptr::null();
		let code = unsafe {
			ffi::sqlite3_prepare_v3(conn.as_ptr(), head, -1, 0, &raw mut stmt, &raw mut tail)
		};
		if code != SQLITE_OK {
			let status = Status::translate(code, Some(conn.handle()));
			return Err(Error::Prepare { code: status.code, message: status.message });
		}

		let next = if tail.is_null() {
			total
		} else {
			usize::try_from(unsafe { tail.offset_from(start) }).unwrap_or(total)
		};

		let Some(stmt) = NonNull::new(stmt) else {
			return Ok((None, next));
		};

		let param_count =
			usize::try_from(unsafe { ffi::sqlite3_bind_parameter_count(stmt.as_ptr()) }).unwrap_or_default();
		conn.registry().register(LiveHandle::Statement(stmt));
		tracing::debug!(param_count, "prepared statement");

		let statement = Self {
			conn,
			handle: Some(stmt),
			param_count,
			mode: StepMode::default(),
			bound: false,
			state: CursorState::default(),
			binder: Binder::default(),
			shape: None,
		};
		Ok((Some(statement), next))
	}

	/// Runs the statement for one step and returns the connection's change
	/// counter.
	pub fn run(&mut self, params: impl Into<Params>) -> Result<u64> {
		let stmt = self.begin(params.into())?;
		match self.advance(stmt)? {
			Step::Row => self.stop_early(stmt),
			Step::Done => self.finish(stmt),
		}
		Ok(self.conn.changes())
	}

	/// Every row as values in column order.
	pub fn values(&mut self, params: impl Into<Params>) -> Result<Vec<Vec<Value>>> {
		self.collect(params.into(), |shape, stmt| shape.values(stmt))
	}

	/// Every row with its column names.
	pub fn all(&mut self, params: impl Into<Params>) -> Result<Vec<Row>> {
		self.collect(params.into(), |shape, stmt| shape.row(stmt))
	}

	/// The first row with its column names, `None` when there is none.
	pub fn get(&mut self, params: impl Into<Params>) -> Result<Option<Row>> {
		self.first(params.into(), |shape, stmt| shape.row(stmt))
	}

	/// The first row as values in column order, `None` when there is none.
	pub fn value(&mut self, params: impl Into<Params>) -> Result<Option<Vec<Value>>> {
		self.first(params.into(), |shape, stmt| shape.values(stmt))
	}

	/// Lazily steps through the rows. Iterating again re-runs the statement
	/// from the top; dropping the iterator early resets the cursor.
	pub fn iter(&mut self, params: impl Into<Params>) -> Result<Rows<'_, 'conn>> {
		let handle = self.begin(params.into())?;
		Ok(Rows { stmt: self, handle, shape: None, finished: false })
	}

	/// Binds `params` for the rest of the statement's life. Later calls must
	/// pass no arguments, and binding again fails.
	pub fn bind(&mut self, params: impl Into<Params>) -> Result<&mut Self> {
		let stmt = self.handle()?;
		if self.bound {
			return Err(Error::already_bound());
		}

		let _ = unsafe { ffi::sqlite3_reset(stmt.as_ptr()) };
		self.state = CursorState::Ready;
		if self.param_count > 0 {
			self.clear_bindings(stmt);
			if let Err(err) = self.binder.bind_params(self.conn.handle(), stmt, params.into()) {
				self.clear_bindings(stmt);
				return Err(err);
			}
		}

		self.bound = true;
		tracing::trace!(retained = self.binder.retained(), "statement bound permanently");
		Ok(self)
	}

	/// Releases the native handle and every retained argument buffer.
	/// Finalizing again is a no-op.
	pub fn finalize(&mut self) -> Result<()> {
		let Some(stmt) = self.handle.take() else {
			return Ok(());
		};

		let code = self.release(stmt);
		tracing::debug!(code, "finalized statement");
		// A failed last step is reported again by finalize; it was already surfaced.
		if code == SQLITE_OK || self.state == CursorState::Failed {
			return Ok(());
		}
		Err(Status::translate(code, Some(self.conn.handle())).into_error())
	}

	/// Column names as the next row would report them.
	pub fn column_names(&mut self) -> Result<Vec<String>> {
		let stmt = self.handle()?;
		Ok(self.shape(stmt).names().to_vec())
	}

	/// The SQL text the statement was prepared from.
	pub fn sql(&self) -> Result<String> {
		let stmt = self.handle()?;
		let ptr = unsafe { ffi::sqlite3_sql(stmt.as_ptr()) };
		if ptr.is_null() {
			return Ok(String::new());
		}
		Ok(unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() })
	}

	/// The SQL text with the currently bound values substituted.
	pub fn expanded_sql(&self) -> Result<String> {
		let stmt = self.handle()?;
		let ptr = unsafe { ffi::sqlite3_expanded_sql(stmt.as_ptr()) };
		if ptr.is_null() {
			return Err(Status::translate(SQLITE_NOMEM, None).into_error());
		}

		let text = unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() };
		unsafe { ffi::sqlite3_free(ptr.cast()) };
		Ok(text)
	}

	pub fn readonly(&self) -> Result<bool> {
		let stmt = self.handle()?;
		Ok(unsafe { ffi::sqlite3_stmt_readonly(stmt.as_ptr()) } != 0)
	}

	pub fn bind_parameter_count(&self) -> Result<usize> {
		self.handle()?;
		Ok(self.param_count)
	}

	/// Name of the 1-based parameter `index`, `None` for anonymous `?`
	/// parameters and out of range indices.
	pub fn bind_parameter_name(&self, index: usize) -> Result<Option<String>> {
		let stmt = self.handle()?;
		let Ok(index) = c_int::try_from(index) else {
			return Ok(None);
		};

		let ptr = unsafe { ffi::sqlite3_bind_parameter_name(stmt.as_ptr(), index) };
		if ptr.is_null() {
			return Ok(None);
		}
		Ok(Some(unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }))
	}

	/// 1-based index of a named parameter; the name gets a `:` prefix unless
	/// it already starts with `:`, `@` or `$`.
	pub fn bind_parameter_index(&self, name: &str) -> Result<Option<usize>> {
		parameter_index(self.handle()?, name)
	}

	/// Steps through the callback-safe path from now on.
	pub fn enable_callback(&mut self) -> &mut Self {
		self.mode = StepMode::Callback;
		self
	}

	pub fn set_callback(&mut self, enabled: bool) -> &mut Self {
		self.mode = if enabled { StepMode::Callback } else { StepMode::Plain };
		self
	}

	#[must_use]
	pub fn callback(&self) -> bool {
		self.mode == StepMode::Callback
	}

	#[must_use]
	pub const fn step_mode(&self) -> StepMode {
		self.mode
	}

	#[must_use]
	pub const fn state(&self) -> CursorState {
		self.state
	}

	#[must_use]
	pub const fn is_finalized(&self) -> bool {
		self.handle.is_none()
	}

	#[must_use]
	pub const fn is_bound(&self) -> bool {
		self.bound
	}

	/// Steps to completion, discarding rows.
	pub(crate) fn drain(&mut self) -> Result<()> {
		let stmt = self.begin(Params::None)?;
		while self.advance(stmt)? == Step::Row {}
		self.finish(stmt);
		Ok(())
	}

	fn handle(&self) -> Result<NonNull<ffi::Sqlite3Stmt>> {
		self.handle.ok_or(Error::UseAfterFinalize)
	}

	fn begin(&mut self, params: Params) -> Result<NonNull<ffi::Sqlite3Stmt>> {
		let stmt = self.handle()?;
		// Reset reports the previous step's error again; it was already surfaced.
		let _ = unsafe { ffi::sqlite3_reset(stmt.as_ptr()) };
		self.state = CursorState::Ready;
		tracing::trace!(param_count = self.param_count, bound = self.bound, "statement cycle");

		if self.param_count == 0 {
			return Ok(stmt);
		}
		if self.bound {
			if !params.is_empty() {
				return Err(Error::already_bound());
			}
			return Ok(stmt);
		}

		self.clear_bindings(stmt);
		if let Err(err) = self.binder.bind_params(self.conn.handle(), stmt, params) {
			self.clear_bindings(stmt);
			return Err(err);
		}
		Ok(stmt)
	}

	fn advance(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) -> Result<Step> {
		stepper::step(self.conn, stmt, self.mode, &mut self.state).inspect_err(|_| {
			self.release_bindings(stmt);
		})
	}

	/// Cycle ran to DONE: the cursor stays exhausted until the next call resets it.
	fn finish(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) {
		self.release_bindings(stmt);
	}

	/// Cycle stopped on a buffered row: reset so the cursor does not hold the
	/// read transaction open.
	fn stop_early(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) {
		let _ = unsafe { ffi::sqlite3_reset(stmt.as_ptr()) };
		self.state = CursorState::Ready;
		self.release_bindings(stmt);
	}

	/// Per-call buffers go once the cycle ends; a permanently bound statement
	/// keeps them until finalize.
	fn release_bindings(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) {
		if !self.bound && self.param_count > 0 {
			self.clear_bindings(stmt);
		}
	}

	fn clear_bindings(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) {
		let _ = unsafe { ffi::sqlite3_clear_bindings(stmt.as_ptr()) };
		self.binder.release();
	}

	/// The cached layout is reused only in unsafe concurrency mode and only
	/// while the integer mode it was built with still applies.
	fn shape(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) -> RowShape {
		let wide = self.conn.wide_integers();
		if self.conn.unsafe_concurrency() {
			if let Some(shape) = self.shape.as_ref().filter(|shape| shape.is_wide() == wide) {
				return shape.clone();
			}
		}

		let shape = RowShape::read(stmt, wide);
		self.shape = Some(shape.clone());
		shape
	}

	fn collect<T>(
		&mut self,
		params: Params,
		mut read: impl FnMut(&RowShape, NonNull<ffi::Sqlite3Stmt>) -> T,
	) -> Result<Vec<T>> {
		let stmt = self.begin(params)?;
		let mut shape: Option<RowShape> = None;
		let mut rows = Vec::new();

		while self.advance(stmt)? == Step::Row {
			if shape.is_none() {
				shape = Some(self.shape(stmt));
			}
			if let Some(shape) = &shape {
				rows.push(read(shape, stmt));
			}
		}

		self.finish(stmt);
		Ok(rows)
	}

	fn first<T>(
		&mut self,
		params: Params,
		read: impl FnOnce(&RowShape, NonNull<ffi::Sqlite3Stmt>) -> T,
	) -> Result<Option<T>> {
		let stmt = self.begin(params)?;
		match self.advance(stmt)? {
			Step::Row => {
				let shape = self.shape(stmt);
				let row = read(&shape, stmt);
				self.stop_early(stmt);
				Ok(Some(row))
			}
			Step::Done => {
				self.finish(stmt);
				Ok(None)
			}
		}
	}

	/// Finalizes `stmt` unless the connection already released it, then
	/// drops the retained buffers.
	fn release(&mut self, stmt: NonNull<ffi::Sqlite3Stmt>) -> c_int {
		let code = if self.conn.registry().release(LiveHandle::Statement(stmt)) {
			unsafe { ffi::sqlite3_finalize(stmt.as_ptr()) }
		} else {
			SQLITE_OK
		};
		self.binder.release();
		self.shape = None;
		code
	}
}

impl Drop for Statement<'_> {
	fn drop(&mut self) {
		let Some(stmt) = self.handle.take() else {
			return;
		};

		let code = self.release(stmt);
		tracing::debug!(code, "finalized statement on drop");
		if code != SQLITE_OK && self.state != CursorState::Failed {
			tracing::warn!(code, "finalizing statement on drop failed");
		}
	}
}

impl fmt::Display for Statement<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.expanded_sql().unwrap_or_default())
	}
}

impl fmt::Debug for Statement<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Statement")
			.field("handle", &self.handle)
			.field("param_count", &self.param_count)
			.field("mode", &self.mode)
			.field("bound", &self.bound)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

/// Lazy row iterator returned by [`Statement::iter`].
pub struct Rows<'stmt, 'conn> {
	stmt: &'stmt mut Statement<'conn>,
	handle: NonNull<ffi::Sqlite3Stmt>,
	shape: Option<RowShape>,
	finished: bool,
}

impl Iterator for Rows<'_, '_> {
	type Item = Result<Row>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.finished {
			return None;
		}

		match self.stmt.advance(self.handle) {
			Ok(Step::Row) => {
				let stmt = &mut *self.stmt;
				let handle = self.handle;
				let shape = self.shape.get_or_insert_with(|| stmt.shape(handle));
				Some(Ok(shape.row(handle)))
			}
			Ok(Step::Done) => {
				self.finished = true;
				self.stmt.finish(self.handle);
				None
			}
			Err(err) => {
				self.finished = true;
				Some(Err(err))
			}
		}
	}
}

impl FusedIterator for Rows<'_, '_> {}

impl Drop for Rows<'_, '_> {
	fn drop(&mut self) {
		if !self.finished {
			self.stmt.stop_early(self.handle);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{named_params, params};

	fn fixture() -> Connection {
		let db = Connection::open_in_memory().expect("open memory database");
		db.exec(
			"create table fruit(id integer primary key, name text, weight real);
			 insert into fruit(name, weight) values ('apple', 1.5), ('pear', 2.0), ('fig', 0.25);",
		)
		.expect("seed table");
		db
	}

	#[test]
	fn queries_materialize_rows() {
		let db = fixture();
		let mut stmt = db.prepare("select id, name from fruit order by id").expect("prepare");

		let values = stmt.values(()).expect("values");
		assert_eq!(values.len(), 3);
		assert_eq!(values.first(), Some(&vec![Value::Integer(1), Value::Text("apple".to_string())]));

		let rows = stmt.all(()).expect("all");
		assert_eq!(rows.last().and_then(|row| row.get("name")), Some(&Value::Text("fig".to_string())));
		assert_eq!(stmt.column_names().expect("names"), ["id", "name"]);
		assert_eq!(stmt.state(), CursorState::Done);
	}

	#[test]
	fn first_row_accessors_return_none_when_empty() {
		let db = fixture();
		let mut stmt = db.prepare("select name from fruit where id = ?").expect("prepare");
		assert_eq!(stmt.value(params![2]).expect("value"), Some(vec![Value::Text("pear".to_string())]));
		assert_eq!(stmt.get(params![99]).expect("get"), None);
		assert_eq!(stmt.state(), CursorState::Done);
	}

	#[test]
	fn run_returns_changes() {
		let db = fixture();
		let mut stmt = db.prepare("update fruit set weight = weight * 2 where weight > ?").expect("prepare");
		assert_eq!(stmt.run(params![1.0]).expect("run"), 2);
		assert_eq!(stmt.run(params![100.0]).expect("run again"), 0);
	}

	#[test]
	fn buffers_are_released_after_each_cycle() {
		let db = fixture();
		let mut stmt = db.prepare("select count(*) from fruit where name = ?").expect("prepare");
		stmt.value(params!["apple"]).expect("value");
		assert_eq!(stmt.binder.retained(), 0);

		stmt.bind(params!["pear"]).expect("bind");
		assert_eq!(stmt.binder.retained(), 1);
		stmt.value(()).expect("value after bind");
		assert_eq!(stmt.binder.retained(), 1);

		stmt.finalize().expect("finalize");
		assert_eq!(stmt.binder.retained(), 0);
	}

	#[test]
	fn named_parameters_accept_any_prefix() {
		let db = fixture();
		let mut stmt = db.prepare("select name from fruit where id = @id").expect("prepare");
		assert_eq!(stmt.bind_parameter_index("@id").expect("index"), Some(1));
		assert_eq!(stmt.bind_parameter_index("id").expect("index"), None);
		assert_eq!(stmt.bind_parameter_name(1).expect("name").as_deref(), Some("@id"));

		let row = stmt.value(named_params! { "@id" => 3 }).expect("value");
		assert_eq!(row, Some(vec![Value::Text("fig".to_string())]));
	}

	#[test]
	fn display_shows_expanded_sql() {
		let db = fixture();
		let mut stmt = db.prepare("select ?1 + 1").expect("prepare");
		stmt.bind(params![41]).expect("bind");
		assert_eq!(stmt.to_string(), "select 41 + 1");
		assert_eq!(stmt.sql().expect("sql"), "select ?1 + 1");
		assert!(stmt.readonly().expect("readonly"));
		stmt.finalize().expect("finalize");
		assert_eq!(stmt.to_string(), "");
	}

	#[test]
	fn dropping_iterator_early_resets() {
		let db = fixture();
		let mut stmt = db.prepare("select id from fruit order by id").expect("prepare");
		{
			let mut rows = stmt.iter(()).expect("iter");
			let first = rows.next().expect("first row").expect("row ok");
			assert_eq!(first.get_index(0), Some(&Value::Integer(1)));
		}
		assert_eq!(stmt.state(), CursorState::Ready);
		assert_eq!(db.registry().len(), 1);
	}

	#[test]
	fn prepare_rejects_empty_sql() {
		let db = fixture();
		let err = db.prepare("  -- nothing here").expect_err("no statement");
		assert!(matches!(err, Error::Prepare { .. }));
		let err = db.prepare("select * from missing").expect_err("unknown table");
		assert!(err.to_string().contains("no such table: missing"));
	}
}
