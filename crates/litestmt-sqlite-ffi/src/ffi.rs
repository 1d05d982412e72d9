use core::ffi::{c_char, c_int, c_uchar, c_void};

pub type Sqlite3Int64 = i64;
pub type Sqlite3UInt64 = u64;
pub type Sqlite3DestructorType = Option<unsafe extern "C" fn(*mut c_void)>;

pub type Sqlite3Callback =
	Option<unsafe extern "C" fn(*mut Sqlite3Context, c_int, *mut *mut Sqlite3Value)>;
pub type Sqlite3StepCallback = Sqlite3Callback;
pub type Sqlite3FinalCallback = Option<unsafe extern "C" fn(*mut Sqlite3Context)>;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3 {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Stmt {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Blob {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Backup {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Context {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Value {
	_unused: [u8; 0],
}

unsafe extern "C" {
	pub fn sqlite3_libversion_number() -> c_int;
	pub fn sqlite3_libversion() -> *const c_char;
	pub fn sqlite3_sourceid() -> *const c_char;
	pub fn sqlite3_complete(sql: *const c_char) -> c_int;
	pub fn sqlite3_compileoption_used(name: *const c_char) -> c_int;
	pub fn sqlite3_compileoption_get(n: c_int) -> *const c_char;
	pub fn sqlite3_open_v2(
		filename: *const c_char,
		pp_db: *mut *mut Sqlite3,
		flags: c_int,
		z_vfs: *const c_char,
	) -> c_int;
	pub fn sqlite3_close_v2(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_changes64(db: *mut Sqlite3) -> Sqlite3Int64;
	pub fn sqlite3_total_changes64(db: *mut Sqlite3) -> Sqlite3Int64;
	pub fn sqlite3_last_insert_rowid(db: *mut Sqlite3) -> Sqlite3Int64;
	pub fn sqlite3_get_autocommit(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_errmsg(db: *mut Sqlite3) -> *const c_char;
	pub fn sqlite3_errstr(code: c_int) -> *const c_char;
	pub fn sqlite3_extended_errcode(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_extended_result_codes(db: *mut Sqlite3, onoff: c_int) -> c_int;
	pub fn sqlite3_prepare_v3(
		db: *mut Sqlite3,
		z_sql: *const c_char,
		n_byte: c_int,
		prep_flags: u32,
		pp_stmt: *mut *mut Sqlite3Stmt,
		pz_tail: *mut *const c_char,
	) -> c_int;
	pub fn sqlite3_step(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_finalize(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_reset(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_clear_bindings(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_bind_parameter_count(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_bind_parameter_name(p_stmt: *mut Sqlite3Stmt, i: c_int) -> *const c_char;
	pub fn sqlite3_bind_parameter_index(p_stmt: *mut Sqlite3Stmt, z_name: *const c_char) -> c_int;
	pub fn sqlite3_bind_null(p_stmt: *mut Sqlite3Stmt, i: c_int) -> c_int;
	pub fn sqlite3_bind_int(p_stmt: *mut Sqlite3Stmt, i: c_int, value: c_int) -> c_int;
	pub fn sqlite3_bind_int64(p_stmt: *mut Sqlite3Stmt, i: c_int, value: Sqlite3Int64) -> c_int;
	pub fn sqlite3_bind_double(p_stmt: *mut Sqlite3Stmt, i: c_int, value: f64) -> c_int;
	pub fn sqlite3_bind_text64(
		p_stmt: *mut Sqlite3Stmt,
		i: c_int,
		value: *const c_char,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
		encoding: c_uchar,
	) -> c_int;
	pub fn sqlite3_bind_blob64(
		p_stmt: *mut Sqlite3Stmt,
		i: c_int,
		value: *const c_void,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
	) -> c_int;
	pub fn sqlite3_column_count(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_column_name(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_char;
	pub fn sqlite3_column_type(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> c_int;
	pub fn sqlite3_column_int(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> c_int;
	pub fn sqlite3_column_int64(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> Sqlite3Int64;
	pub fn sqlite3_column_double(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> f64;
	pub fn sqlite3_column_text(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_uchar;
	pub fn sqlite3_column_blob(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_void;
	pub fn sqlite3_column_bytes(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> c_int;
	pub fn sqlite3_sql(p_stmt: *mut Sqlite3Stmt) -> *const c_char;
	pub fn sqlite3_expanded_sql(p_stmt: *mut Sqlite3Stmt) -> *mut c_char;
	pub fn sqlite3_stmt_readonly(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_backup_init(
		p_dest: *mut Sqlite3,
		z_dest_name: *const c_char,
		p_source: *mut Sqlite3,
		z_source_name: *const c_char,
	) -> *mut Sqlite3Backup;
	pub fn sqlite3_backup_step(p: *mut Sqlite3Backup, n_page: c_int) -> c_int;
	pub fn sqlite3_backup_finish(p: *mut Sqlite3Backup) -> c_int;
	pub fn sqlite3_backup_remaining(p: *mut Sqlite3Backup) -> c_int;
	pub fn sqlite3_backup_pagecount(p: *mut Sqlite3Backup) -> c_int;
	pub fn sqlite3_blob_open(
		db: *mut Sqlite3,
		z_db: *const c_char,
		z_table: *const c_char,
		z_column: *const c_char,
		i_row: Sqlite3Int64,
		flags: c_int,
		pp_blob: *mut *mut Sqlite3Blob,
	) -> c_int;
	pub fn sqlite3_blob_close(blob: *mut Sqlite3Blob) -> c_int;
	pub fn sqlite3_blob_bytes(blob: *mut Sqlite3Blob) -> c_int;
	pub fn sqlite3_blob_read(
		blob: *mut Sqlite3Blob,
		z: *mut c_void,
		n: c_int,
		i_offset: c_int,
	) -> c_int;
	pub fn sqlite3_blob_write(
		blob: *mut Sqlite3Blob,
		z: *const c_void,
		n: c_int,
		i_offset: c_int,
	) -> c_int;
	pub fn sqlite3_create_function_v2(
		db: *mut Sqlite3,
		z_function_name: *const c_char,
		n_arg: c_int,
		e_text_rep: c_int,
		p_app: *mut c_void,
		x_func: Sqlite3Callback,
		x_step: Sqlite3StepCallback,
		x_final: Sqlite3FinalCallback,
		x_destroy: Sqlite3DestructorType,
	) -> c_int;
	pub fn sqlite3_user_data(context: *mut Sqlite3Context) -> *mut c_void;
	pub fn sqlite3_result_null(context: *mut Sqlite3Context);
	pub fn sqlite3_result_int64(context: *mut Sqlite3Context, value: Sqlite3Int64);
	pub fn sqlite3_result_double(context: *mut Sqlite3Context, value: f64);
	pub fn sqlite3_result_text64(
		context: *mut Sqlite3Context,
		value: *const c_char,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
		encoding: c_uchar,
	);
	pub fn sqlite3_result_blob64(
		context: *mut Sqlite3Context,
		value: *const c_void,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
	);
	pub fn sqlite3_result_error(context: *mut Sqlite3Context, value: *const c_char, n: c_int);
	pub fn sqlite3_value_type(value: *mut Sqlite3Value) -> c_int;
	pub fn sqlite3_value_int64(value: *mut Sqlite3Value) -> Sqlite3Int64;
	pub fn sqlite3_value_double(value: *mut Sqlite3Value) -> f64;
	pub fn sqlite3_value_text(value: *mut Sqlite3Value) -> *const c_uchar;
	pub fn sqlite3_value_blob(value: *mut Sqlite3Value) -> *const c_void;
	pub fn sqlite3_value_bytes(value: *mut Sqlite3Value) -> c_int;
	pub fn sqlite3_free(p: *mut c_void);
}
