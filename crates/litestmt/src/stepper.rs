use std::ptr::NonNull;

use crate::connection::Connection;
use crate::error::Result;
use crate::ffi;
use crate::raw::{SQLITE_DONE, SQLITE_ROW};
use crate::status::Status;

/// How a statement enters the native step call.
///
/// `Callback` is required when the SQL may invoke a user-defined function:
/// the connection records the re-entry and a panic raised inside the
/// function resumes on the caller's side once the step returns. `Plain`
/// skips that bookkeeping; a panicking function then surfaces as an
/// ordinary SQL error.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum StepMode {
	#[default]
	Plain,
	Callback,
}

/// Cursor state of a statement.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum CursorState {
	/// Reset (and possibly bound); nothing stepped yet.
	#[default]
	Ready,
	/// A row is buffered.
	Row,
	/// Exhausted until the next reset.
	Done,
	/// The last step returned an error status; reset before reuse.
	Failed,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Step {
	Row,
	Done,
}

pub(crate) fn step(
	conn: &Connection,
	stmt: NonNull<ffi::Sqlite3Stmt>,
	mode: StepMode,
	state: &mut CursorState,
) -> Result<Step> {
	let code = match mode {
		StepMode::Plain => {
			// A plain step nested in a callback step must not park panics for the outer caller.
			let _plain = conn.callbacks().suspend();
			unsafe { ffi::sqlite3_step(stmt.as_ptr()) }
		}
		StepMode::Callback => step_with_callbacks(conn, stmt, state),
	};

	match code {
		SQLITE_ROW => {
			*state = CursorState::Row;
			Ok(Step::Row)
		}
		SQLITE_DONE => {
			*state = CursorState::Done;
			Ok(Step::Done)
		}
		_ => {
			*state = CursorState::Failed;
			tracing::trace!(code, "step failed");
			Err(Status::translate(code, Some(conn.handle())).into_error())
		}
	}
}

/// Steps with the connection marked as inside a callback step, then resumes
/// any panic a user function parked during the step.
fn step_with_callbacks(
	conn: &Connection,
	stmt: NonNull<ffi::Sqlite3Stmt>,
	state: &mut CursorState,
) -> core::ffi::c_int {
	let guard = conn.callbacks().enter();
	let code = unsafe { ffi::sqlite3_step(stmt.as_ptr()) };
	drop(guard);

	if let Some(payload) = conn.callbacks().take_panic() {
		*state = CursorState::Failed;
		std::panic::resume_unwind(payload);
	}
	code
}
