use core::ffi::c_int;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::backup::Backup;
use crate::binder::Params;
use crate::blob::Blob;
use crate::error::{Error, Result};
use crate::ffi;
use crate::function::{CallbackState, register_scalar};
use crate::raw::{
	SQLITE_MISUSE, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_MEMORY, SQLITE_OPEN_READONLY,
	SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI,
};
use crate::statement::Statement;
use crate::status::{Status, check};
use crate::value::Value;

/// How a connection is opened and how its statements decode rows.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OpenOptions {
	create: bool,
	readonly: bool,
	memory: bool,
	uri: bool,
	wide_integers: bool,
	unsafe_concurrency: bool,
	flags: c_int,
}

impl Default for OpenOptions {
	fn default() -> Self {
		Self {
			create: true,
			readonly: false,
			memory: false,
			uri: true,
			wide_integers: false,
			unsafe_concurrency: false,
			flags: 0,
		}
	}
}

impl OpenOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn create(mut self, create: bool) -> Self {
		self.create = create;
		self
	}

	#[must_use]
	pub const fn readonly(mut self, readonly: bool) -> Self {
		self.readonly = readonly;
		self
	}

	#[must_use]
	pub const fn memory(mut self, memory: bool) -> Self {
		self.memory = memory;
		self
	}

	#[must_use]
	pub const fn uri(mut self, uri: bool) -> Self {
		self.uri = uri;
		self
	}

	/// Decode INTEGER columns as full 64-bit values instead of the engine's
	/// 32-bit truncation.
	#[must_use]
	pub const fn wide_integers(mut self, wide: bool) -> Self {
		self.wide_integers = wide;
		self
	}

	/// Let statements keep their column metadata across calls instead of
	/// re-reading it on every call.
	#[must_use]
	pub const fn unsafe_concurrency(mut self, enabled: bool) -> Self {
		self.unsafe_concurrency = enabled;
		self
	}

	/// Extra native open flags, OR-ed into the computed ones.
	#[must_use]
	pub const fn flags(mut self, flags: c_int) -> Self {
		self.flags = flags;
		self
	}

	const fn open_flags(&self) -> c_int {
		let mut flags = if self.readonly {
			SQLITE_OPEN_READONLY
		} else if self.create {
			SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE
		} else {
			SQLITE_OPEN_READWRITE
		};
		if self.uri {
			flags |= SQLITE_OPEN_URI;
		}
		if self.memory {
			flags |= SQLITE_OPEN_MEMORY;
		}
		flags | self.flags
	}

	pub fn open(&self, path: &str) -> Result<Connection> {
		let path_c = CString::new(path).map_err(|_| Error::Open {
			code: SQLITE_MISUSE,
			message: "database path contains a NUL byte".to_string(),
		})?;

		let mut db: *mut ffi::Sqlite3 = std::ptr::null_mut();
		let code = unsafe {
			ffi::sqlite3_open_v2(path_c.as_ptr(), &raw mut db, self.open_flags(), std::ptr::null())
		};
		if code != SQLITE_OK {
			let status = Status::translate(code, NonNull::new(db));
			if !db.is_null() {
				let _ = unsafe { ffi::sqlite3_close_v2(db) };
			}
			return Err(Error::Open { code: status.code, message: status.message });
		}

		let db = NonNull::new(db).ok_or_else(|| Error::Open {
			code: SQLITE_MISUSE,
			message: "SQLite returned a null connection handle".to_string(),
		})?;

		let _ = unsafe { ffi::sqlite3_extended_result_codes(db.as_ptr(), 1) };
		tracing::debug!(path, wide_integers = self.wide_integers, "opened connection");

		Ok(Connection {
			db,
			open: Cell::new(true),
			registry: HandleRegistry::default(),
			callbacks: Rc::default(),
			wide_integers: Cell::new(self.wide_integers),
			unsafe_concurrency: Cell::new(self.unsafe_concurrency),
		})
	}
}

/// A native handle the connection must release if its owner never does.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum LiveHandle {
	Statement(NonNull<ffi::Sqlite3Stmt>),
	Blob(NonNull<ffi::Sqlite3Blob>),
}

impl LiveHandle {
	fn key(self) -> usize {
		match self {
			Self::Statement(ptr) => ptr.as_ptr().addr(),
			Self::Blob(ptr) => ptr.as_ptr().addr(),
		}
	}
}

/// Handles that are still open, keyed by address. Whoever removes a handle
/// first is the one that releases it.
#[derive(Debug, Default)]
pub(crate) struct HandleRegistry {
	live: RefCell<HashMap<usize, LiveHandle>>,
}

impl HandleRegistry {
	pub(crate) fn register(&self, handle: LiveHandle) {
		self.live.borrow_mut().insert(handle.key(), handle);
	}

	/// True when the caller now owns the release.
	pub(crate) fn release(&self, handle: LiveHandle) -> bool {
		self.live.borrow_mut().remove(&handle.key()).is_some()
	}

	pub(crate) fn len(&self) -> usize {
		self.live.borrow().len()
	}

	fn drain(&self) -> Vec<LiveHandle> {
		self.live.borrow_mut().drain().map(|(_, handle)| handle).collect()
	}
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransactionMode {
	Deferred,
	Immediate,
	Exclusive,
}

impl TransactionMode {
	const fn begin_sql(self) -> &'static str {
		match self {
			Self::Deferred => "BEGIN DEFERRED",
			Self::Immediate => "BEGIN IMMEDIATE",
			Self::Exclusive => "BEGIN EXCLUSIVE",
		}
	}
}

pub struct Connection {
	db: NonNull<ffi::Sqlite3>,
	open: Cell<bool>,
	registry: HandleRegistry,
	callbacks: Rc<CallbackState>,
	wide_integers: Cell<bool>,
	unsafe_concurrency: Cell<bool>,
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("db", &self.db)
			.field("live_handles", &self.registry.len())
			.field("wide_integers", &self.wide_integers.get())
			.field("unsafe_concurrency", &self.unsafe_concurrency.get())
			.finish_non_exhaustive()
	}
}

impl Connection {
	pub fn open(path: &str) -> Result<Self> {
		OpenOptions::default().open(path)
	}

	pub fn open_in_memory() -> Result<Self> {
		Self::open(":memory:")
	}

	pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
		Statement::prepare(self, sql)
	}

	/// Runs every `;`-separated statement in `sql` to completion and returns
	/// the change count of the last one.
	pub fn exec(&self, sql: &str) -> Result<u64> {
		let sql_c = CString::new(sql).map_err(|_| Error::Prepare {
			code: SQLITE_MISUSE,
			message: "SQL contains a NUL byte".to_string(),
		})?;

		let total = sql_c.as_bytes().len();
		let mut offset = 0;
		while offset < total {
			let (stmt, next) = Statement::prepare_at(self, &sql_c, offset)?;
			if let Some(mut stmt) = stmt {
				stmt.drain()?;
				stmt.finalize()?;
			}
			if next <= offset {
				break;
			}
			offset = next;
		}

		Ok(self.changes())
	}

	/// Prepares `sql`, runs it once with `params` and finalizes it.
	pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<u64> {
		let mut stmt = self.prepare(sql)?;
		let changes = stmt.run(params)?;
		stmt.finalize()?;
		Ok(changes)
	}

	#[must_use]
	pub fn changes(&self) -> u64 {
		let n = unsafe { ffi::sqlite3_changes64(self.db.as_ptr()) };
		u64::try_from(n).unwrap_or_default()
	}

	#[must_use]
	pub fn total_changes(&self) -> u64 {
		let n = unsafe { ffi::sqlite3_total_changes64(self.db.as_ptr()) };
		u64::try_from(n).unwrap_or_default()
	}

	#[must_use]
	pub fn last_insert_rowid(&self) -> i64 {
		unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) }
	}

	#[must_use]
	pub fn autocommit(&self) -> bool {
		unsafe { ffi::sqlite3_get_autocommit(self.db.as_ptr()) != 0 }
	}

	#[must_use]
	pub fn wide_integers(&self) -> bool {
		self.wide_integers.get()
	}

	pub fn set_wide_integers(&self, wide: bool) {
		self.wide_integers.set(wide);
	}

	#[must_use]
	pub fn unsafe_concurrency(&self) -> bool {
		self.unsafe_concurrency.get()
	}

	pub fn set_unsafe_concurrency(&self, enabled: bool) {
		self.unsafe_concurrency.set(enabled);
	}

	/// True while a callback-mode step is inside the native engine.
	#[must_use]
	pub fn in_callback_step(&self) -> bool {
		self.callbacks.is_active()
	}

	/// Registers a scalar SQL function. Statements that call it should enable
	/// callback mode so a panic inside `func` reaches the caller.
	pub fn create_function<F>(&self, name: &str, n_args: i32, deterministic: bool, func: F) -> Result<()>
	where
		F: FnMut(&[Value]) -> Result<Value> + 'static,
	{
		let code =
			register_scalar(self.db.as_ptr(), &self.callbacks, name, n_args, deterministic, Box::new(func));
		check(code, Some(self.db))
	}

	pub fn open_blob(&self, table: &str, column: &str, row: i64, readonly: bool) -> Result<Blob<'_>> {
		Blob::open(self, "main", table, column, row, readonly)
	}

	pub fn open_blob_in(
		&self,
		database: &str,
		table: &str,
		column: &str,
		row: i64,
		readonly: bool,
	) -> Result<Blob<'_>> {
		Blob::open(self, database, table, column, row, readonly)
	}

	/// Copies this connection's `main` database over `dest`'s in one pass.
	pub fn backup_to(&self, dest: &Self) -> Result<()> {
		let mut backup = Backup::new(dest, "main", self, "main")?;
		while backup.step(-1)? {}
		backup.finish()
	}

	pub fn transaction(&self) -> Result<Transaction<'_>> {
		self.transaction_with_mode(TransactionMode::Immediate)
	}

	pub fn transaction_with_mode(&self, mode: TransactionMode) -> Result<Transaction<'_>> {
		self.exec(mode.begin_sql())?;
		Ok(Transaction { conn: self, active: true })
	}

	/// Closes the connection and reports the native outcome.
	pub fn close(self) -> Result<()> {
		let code = self.shutdown();
		check(code, None)
	}

	#[must_use]
	pub const fn as_ptr(&self) -> *mut ffi::Sqlite3 {
		self.db.as_ptr()
	}

	pub(crate) const fn handle(&self) -> NonNull<ffi::Sqlite3> {
		self.db
	}

	pub(crate) const fn registry(&self) -> &HandleRegistry {
		&self.registry
	}

	pub(crate) fn callbacks(&self) -> &CallbackState {
		&self.callbacks
	}

	fn shutdown(&self) -> c_int {
		if !self.open.replace(false) {
			return SQLITE_OK;
		}

		for handle in self.registry.drain() {
			tracing::debug!(?handle, "releasing handle leaked past its owner");
			match handle {
				LiveHandle::Statement(stmt) => {
					let _ = unsafe { ffi::sqlite3_finalize(stmt.as_ptr()) };
				}
				LiveHandle::Blob(blob) => {
					let _ = unsafe { ffi::sqlite3_blob_close(blob.as_ptr()) };
				}
			}
		}

		let code = unsafe { ffi::sqlite3_close_v2(self.db.as_ptr()) };
		tracing::debug!(code, "closed connection");
		code
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		let code = self.shutdown();
		if code != SQLITE_OK {
			tracing::warn!(code, "closing connection failed");
		}
	}
}

pub struct Transaction<'conn> {
	conn: &'conn Connection,
	active: bool,
}

impl<'conn> Transaction<'conn> {
	pub fn prepare(&self, sql: &str) -> Result<Statement<'conn>> {
		self.conn.prepare(sql)
	}

	pub fn exec(&self, sql: &str) -> Result<u64> {
		self.conn.exec(sql)
	}

	pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<u64> {
		self.conn.execute(sql, params)
	}

	pub fn commit(mut self) -> Result<()> {
		if !self.active {
			return Ok(());
		}

		self.conn.exec("COMMIT")?;
		self.active = false;
		Ok(())
	}

	pub fn rollback(mut self) -> Result<()> {
		if !self.active {
			return Ok(());
		}

		self.conn.exec("ROLLBACK")?;
		self.active = false;
		Ok(())
	}

	#[must_use]
	pub const fn is_active(&self) -> bool {
		self.active
	}
}

impl Drop for Transaction<'_> {
	fn drop(&mut self) {
		if self.active && self.conn.exec("ROLLBACK").is_err() {
			tracing::warn!("rollback on drop failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::params;

	#[test]
	fn exec_runs_every_statement() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.exec(
			"create table items(id integer primary key, name text not null);
			 insert into items(name) values ('apples');
			 insert into items(name) values ('oranges'), ('pears');",
		)
		.expect("run batch");

		assert_eq!(db.changes(), 2);
		assert_eq!(db.total_changes(), 3);
		assert_eq!(db.last_insert_rowid(), 3);
		assert_eq!(db.registry().len(), 0);
	}

	#[test]
	fn exec_tolerates_trailing_comments() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.exec("create table t(x); -- done").expect("run batch with comment");
		db.exec("").expect("empty batch");
	}

	#[test]
	fn execute_binds_parameters() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.exec("create table kv(k text, v integer)").expect("create table");
		let changes =
			db.execute("insert into kv values (?, ?)", params!["a", 1]).expect("insert with params");
		assert_eq!(changes, 1);
	}

	#[test]
	fn open_errors_carry_codes() {
		let err = OpenOptions::new()
			.create(false)
			.open("/nonexistent-dir/definitely/missing.db")
			.expect_err("cannot open missing file without create");
		assert!(matches!(err, Error::Open { code, .. } if code & 0xff == 14));
	}

	#[test]
	fn options_toggle_modes() {
		let db = OpenOptions::new()
			.wide_integers(true)
			.unsafe_concurrency(true)
			.open(":memory:")
			.expect("open with options");
		assert!(db.wide_integers());
		assert!(db.unsafe_concurrency());
		db.set_wide_integers(false);
		assert!(!db.wide_integers());
		assert!(db.autocommit());
	}

	#[test]
	fn transaction_rolls_back_on_drop_and_can_commit() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.exec("create table txlog(value text)").expect("create table");

		{
			let tx = db.transaction().expect("begin transaction");
			tx.exec("insert into txlog(value) values ('rolled')").expect("insert rolled row");
			assert!(!db.autocommit());
		}

		let mut count = db.prepare("select count(*) from txlog").expect("prepare count");
		assert_eq!(count.value(()).expect("count rows"), Some(vec![Value::Integer(0)]));

		let tx = db.transaction_with_mode(TransactionMode::Deferred).expect("begin transaction");
		tx.execute("insert into txlog(value) values (?)", params!["committed"])
			.expect("insert committed row");
		tx.commit().expect("commit transaction");

		assert_eq!(count.value(()).expect("count rows"), Some(vec![Value::Integer(1)]));
	}

	#[test]
	fn leaked_statements_are_released_on_close() {
		let db = Connection::open_in_memory().expect("open memory database");
		let stmt = db.prepare("select 1").expect("prepare");
		std::mem::forget(stmt);
		assert_eq!(db.registry().len(), 1);
		db.close().expect("close releases leaked handles");
	}
}
