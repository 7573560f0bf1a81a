//! Scoped transactional sessions over one owned connection.
//!
//! # Responsibility
//! - Open a transaction for the outermost [`SessionManager::with_session`] call.
//! - Let nested calls share it (flat mode) or isolate them in savepoints.
//! - Commit on success, roll back on error or panic, always release.
//!
//! # Invariants
//! - `depth == 0` exactly when no transaction is open.
//! - A failed flat-nested scope poisons the shared transaction; the outermost
//!   scope then rolls back and reports [`DbError::ScopeAborted`].
//! - `SessionManager` is `!Sync`, so scopes can not interleave across threads.

use super::{DbError, DbResult};
use log::{debug, warn};
use rusqlite::Connection;
use std::cell::Cell;

/// Nesting behavior for reentrant scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// When `true`, nested scopes run inside their own savepoint.
    pub nested_transactions: bool,
}

/// Owner of the store connection and its single active transaction.
pub struct SessionManager {
    conn: Connection,
    options: SessionOptions,
    depth: Cell<u32>,
    rollback_only: Cell<bool>,
}

/// Handle to the active transaction, valid only inside a scope.
///
/// Carries a back-reference to its manager so dependents reach the
/// connection without it being threaded through every call.
pub struct Session<'m> {
    manager: &'m SessionManager,
    depth: u32,
}

impl Session<'_> {
    /// Connection bound to the open transaction.
    pub fn conn(&self) -> &Connection {
        &self.manager.conn
    }

    /// Manager that opened this session.
    pub fn manager(&self) -> &SessionManager {
        self.manager
    }

    /// Nesting depth of the scope this handle was issued for (1 = outermost).
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Transaction,
    Savepoint(String),
    Shared,
}

impl Scope {
    fn label(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Savepoint(_) => "savepoint",
            Self::Shared => "shared",
        }
    }
}

/// Releases one scope level; rolls it back unless finished normally.
struct ScopeGuard<'m> {
    manager: &'m SessionManager,
    scope: Scope,
    open: bool,
}

impl ScopeGuard<'_> {
    fn commit(mut self) -> DbResult<()> {
        self.open = false;
        self.manager.close_scope(&self.scope)
    }

    fn abort(mut self) {
        self.open = false;
        self.manager.abort_scope(&self.scope);
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!(
                "event=session_scope module=session status=unwound scope={}",
                self.scope.label()
            );
            self.manager.abort_scope(&self.scope);
        }
        let depth = self.manager.depth.get();
        self.manager.depth.set(depth.saturating_sub(1));
    }
}

impl SessionManager {
    /// Takes ownership of a bootstrapped connection.
    pub fn new(conn: Connection, options: SessionOptions) -> Self {
        Self {
            conn,
            options,
            depth: Cell::new(0),
            rollback_only: Cell::new(false),
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Current nesting depth; `0` when no scope is active.
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn in_session(&self) -> bool {
        self.depth.get() > 0
    }

    /// Runs `f` inside a transactional scope.
    ///
    /// The outermost call opens an immediate transaction; nested calls reuse
    /// it (or open a savepoint in nested mode). Returns `f`'s error unchanged
    /// after rolling the scope back.
    ///
    /// # Errors
    /// - Begin/commit failures surface as `E::from(DbError)`.
    /// - [`DbError::ScopeAborted`] when a flat-nested scope failed earlier.
    pub fn with_session<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let depth = self.depth.get();
        let scope = self.open_scope(depth).map_err(E::from)?;
        self.depth.set(depth + 1);

        let guard = ScopeGuard {
            manager: self,
            scope,
            open: true,
        };
        let session = Session {
            manager: self,
            depth: depth + 1,
        };

        match f(&session) {
            Ok(value) => {
                guard.commit().map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                guard.abort();
                Err(err)
            }
        }
    }

    fn open_scope(&self, depth: u32) -> DbResult<Scope> {
        let scope = if depth == 0 {
            self.conn.execute_batch("BEGIN IMMEDIATE;")?;
            self.rollback_only.set(false);
            Scope::Transaction
        } else if self.options.nested_transactions {
            let name = format!("scope_{depth}");
            self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
            Scope::Savepoint(name)
        } else {
            Scope::Shared
        };
        debug!(
            "event=session_scope module=session status=open scope={} depth={}",
            scope.label(),
            depth + 1
        );
        Ok(scope)
    }

    fn close_scope(&self, scope: &Scope) -> DbResult<()> {
        match scope {
            Scope::Transaction => {
                if self.rollback_only.replace(false) {
                    self.rollback_transaction();
                    return Err(DbError::ScopeAborted);
                }
                if let Err(err) = self.conn.execute_batch("COMMIT;") {
                    self.rollback_transaction();
                    return Err(err.into());
                }
            }
            Scope::Savepoint(name) => {
                if let Err(err) = self.conn.execute_batch(&format!("RELEASE {name};")) {
                    self.abort_scope(scope);
                    return Err(err.into());
                }
            }
            Scope::Shared => {}
        }
        debug!(
            "event=session_scope module=session status=commit scope={}",
            scope.label()
        );
        Ok(())
    }

    fn abort_scope(&self, scope: &Scope) {
        match scope {
            Scope::Transaction => self.rollback_transaction(),
            Scope::Savepoint(name) => {
                if let Err(err) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
                {
                    warn!(
                        "event=session_scope module=session status=error scope=savepoint error={err}"
                    );
                    self.rollback_only.set(true);
                }
            }
            Scope::Shared => self.rollback_only.set(true),
        }
        debug!(
            "event=session_scope module=session status=rollback scope={}",
            scope.label()
        );
    }

    fn rollback_transaction(&self) {
        self.rollback_only.set(false);
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!("event=session_scope module=session status=error scope=transaction error={err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionManager, SessionOptions};
    use crate::db::DbError;
    use rusqlite::Connection;

    fn manager(nested_transactions: bool) -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE items (value TEXT NOT NULL);")
            .unwrap();
        SessionManager::new(conn, SessionOptions { nested_transactions })
    }

    fn insert(manager: &SessionManager, value: &str) -> Result<(), DbError> {
        manager.with_session(|s| {
            s.conn().execute("INSERT INTO items (value) VALUES (?1);", [value])?;
            Ok(())
        })
    }

    fn count(manager: &SessionManager) -> i64 {
        manager
            .with_session(|s| {
                s.conn()
                    .query_row("SELECT COUNT(*) FROM items;", [], |row| row.get(0))
                    .map_err(DbError::from)
            })
            .unwrap()
    }

    #[test]
    fn depth_returns_to_zero_after_each_scope() {
        let manager = manager(false);
        assert_eq!(manager.depth(), 0);
        manager
            .with_session(|outer| {
                assert_eq!(outer.depth(), 1);
                manager.with_session(|inner| {
                    assert_eq!(inner.depth(), 2);
                    assert_eq!(inner.manager().depth(), 2);
                    Ok::<_, DbError>(())
                })
            })
            .unwrap();
        assert_eq!(manager.depth(), 0);
        assert!(manager.conn.is_autocommit());
    }

    #[test]
    fn error_rolls_back_outermost_scope() {
        let manager = manager(false);
        let result: Result<(), DbError> = manager.with_session(|s| {
            s.conn().execute("INSERT INTO items (value) VALUES ('a');", [])?;
            Err(DbError::MissingRequiredTable("forced"))
        });
        assert!(result.is_err());
        assert_eq!(count(&manager), 0);
    }

    #[test]
    fn flat_nested_failure_poisons_shared_transaction() {
        let manager = manager(false);
        let result: Result<(), DbError> = manager.with_session(|_| {
            insert(&manager, "kept?")?;
            let inner: Result<(), DbError> = manager.with_session(|s| {
                s.conn().execute("INSERT INTO items (value) VALUES ('b');", [])?;
                Err(DbError::MissingRequiredTable("forced"))
            });
            assert!(inner.is_err());
            Ok(())
        });
        assert!(matches!(result, Err(DbError::ScopeAborted)));
        assert_eq!(count(&manager), 0);
        assert_eq!(manager.depth(), 0);
    }

    #[test]
    fn savepoint_mode_isolates_failed_inner_scope() {
        let manager = manager(true);
        manager
            .with_session(|_| {
                insert(&manager, "outer")?;
                let inner: Result<(), DbError> = manager.with_session(|s| {
                    s.conn().execute("INSERT INTO items (value) VALUES ('inner');", [])?;
                    Err(DbError::MissingRequiredTable("forced"))
                });
                assert!(inner.is_err());
                Ok::<_, DbError>(())
            })
            .unwrap();
        assert_eq!(count(&manager), 1);
    }

    #[test]
    fn panic_inside_scope_rolls_back_and_releases() {
        let manager = manager(false);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), DbError> = manager.with_session(|s| {
                s.conn()
                    .execute("INSERT INTO items (value) VALUES ('lost');", [])
                    .unwrap();
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(manager.depth(), 0);
        assert_eq!(count(&manager), 0);
    }
}
