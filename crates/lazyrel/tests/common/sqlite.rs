//! In-memory SQLite connection that runs rendered statements for real.

#![allow(unsafe_code)]

use lazyrel::prelude::*;
use lazyrel::{QueryError, QueryErrorKind};
use libsqlite3_sys as ffi;
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::Mutex;

struct Handle(*mut ffi::sqlite3);

// SAFETY: the handle is only used while the connection mutex is held.
unsafe impl Send for Handle {}

pub struct SqliteMemory {
    db: Mutex<Handle>,
    statements: Mutex<Vec<String>>,
}

impl SqliteMemory {
    pub fn open() -> Self {
        let path = CString::new(":memory:").unwrap();
        let mut db = ptr::null_mut();
        let flags = ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        // SAFETY: path is NUL-terminated and db is a valid out-pointer
        let rc = unsafe { ffi::sqlite3_open_v2(path.as_ptr(), &mut db, flags, ptr::null()) };
        assert_eq!(rc, ffi::SQLITE_OK, "open in-memory sqlite");
        Self {
            db: Mutex::new(Handle(db)),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Run schema and seed statements.
    pub fn execute_batch(&self, sql: &str) {
        let db = self.db.lock().unwrap();
        let c_sql = CString::new(sql).unwrap();
        let mut errmsg = ptr::null_mut();
        // SAFETY: db is open and errmsg is a valid out-pointer
        let rc = unsafe {
            ffi::sqlite3_exec(db.0, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                last_error(db.0)
            } else {
                // SAFETY: sqlite allocated errmsg for this failure
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            panic!("{msg}: {sql}");
        }
    }

    /// Every statement sent through `Connection::query`.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, String> {
        let db = self.db.lock().unwrap();
        let c_sql = CString::new(sql).map_err(|e| e.to_string())?;
        let mut stmt = ptr::null_mut();
        // SAFETY: db is open, c_sql is NUL-terminated
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db.0, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(last_error(db.0));
        }
        // SAFETY: stmt was just prepared on db and is finalized exactly once
        unsafe {
            let rows = read_rows(db.0, stmt, params);
            ffi::sqlite3_finalize(stmt);
            rows
        }
    }
}

impl Drop for SqliteMemory {
    fn drop(&mut self) {
        let db = self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // SAFETY: db was opened in `open` and is closed only here
        unsafe { ffi::sqlite3_close(db.0) };
    }
}

impl Connection for SqliteMemory {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.statements.lock().unwrap().push(sql.to_string());
        let outcome = match self.query_sync(sql, params) {
            Ok(rows) => Outcome::Ok(rows),
            Err(message) => Outcome::Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message,
                source: None,
            })),
        };
        async move { outcome }
    }
}

fn last_error(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is open; errmsg always returns a valid C string
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

unsafe fn read_rows(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    params: &[Value],
) -> std::result::Result<Vec<Row>, String> {
    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is a live prepared statement, indexes are 1-based
        let rc = unsafe { bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            return Err(format!("cannot bind parameter {}: {param:?}", i + 1));
        }
    }

    // SAFETY: stmt is a live prepared statement
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let names: Vec<String> = (0..col_count)
        .map(|i| {
            // SAFETY: i is within the column count
            unsafe { CStr::from_ptr(ffi::sqlite3_column_name(stmt, i)) }
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is a live prepared statement
        match unsafe { ffi::sqlite3_step(stmt) } {
            ffi::SQLITE_ROW => {
                let values = (0..col_count)
                    // SAFETY: the statement is positioned on a row
                    .map(|i| unsafe { read_column(stmt, i) })
                    .collect();
                rows.push(Row::new(names.clone(), values));
            }
            ffi::SQLITE_DONE => return Ok(rows),
            _ => return Err(last_error(db)),
        }
    }
}

unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees stmt is live; text is copied by SQLITE_TRANSIENT
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Timestamp(n) => ffi::sqlite3_bind_int64(stmt, index, *n),
            Value::Float(f) => ffi::sqlite3_bind_double(stmt, index, f64::from(*f)),
            Value::Double(f) => ffi::sqlite3_bind_double(stmt, index, *f),
            Value::Text(s) => ffi::sqlite3_bind_text(
                stmt,
                index,
                s.as_ptr().cast(),
                s.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            ),
            other => match other.as_i64() {
                Some(n) => ffi::sqlite3_bind_int64(stmt, index, n),
                None => ffi::SQLITE_MISMATCH,
            },
        }
    }
}

unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, i: c_int) -> Value {
    // SAFETY: caller guarantees stmt is positioned on a row and i is in range
    unsafe {
        match ffi::sqlite3_column_type(stmt, i) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, i)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, i)),
            ffi::SQLITE_TEXT => {
                let text = ffi::sqlite3_column_text(stmt, i);
                let len = ffi::sqlite3_column_bytes(stmt, i) as usize;
                if text.is_null() {
                    Value::Text(String::new())
                } else {
                    let bytes = std::slice::from_raw_parts(text, len);
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            _ => Value::Null,
        }
    }
}
