use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;
use crate::models::Session;
use crate::remote::{AuthEvent, AuthService, DataService, Query, Subscribers, Table};

const ID_LEN: usize = 20;
const TOKEN_LEN: usize = 32;
const SESSION_HOURS: i64 = 8;

/// Embedded stand-in for the hosted service: one JSON document per row in
/// SQLite, plus a fixed set of credential pairs.
pub struct LocalBackend {
  conn: Mutex<Connection>,
  db_path: Option<PathBuf>,
  credentials: HashMap<String, String>,
  session: Mutex<Option<Session>>,
  subscribers: Subscribers,
}

impl LocalBackend {
  pub fn open(path: &Path) -> Result<Self, AppError> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    run_migrations(&mut conn)?;
    Ok(Self::with_connection(conn, Some(path.to_path_buf())))
  }

  pub fn in_memory() -> Result<Self, AppError> {
    let mut conn = Connection::open_in_memory()?;
    run_migrations(&mut conn)?;
    Ok(Self::with_connection(conn, None))
  }

  fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Self {
    Self {
      conn: Mutex::new(conn),
      db_path,
      credentials: HashMap::new(),
      session: Mutex::new(None),
      subscribers: Subscribers::default(),
    }
  }

  pub fn with_credential(mut self, email: &str, password: &str) -> Self {
    self
      .credentials
      .insert(email.trim().to_lowercase(), password.to_string());
    self
  }

  pub fn db_path(&self) -> Option<&Path> {
    self.db_path.as_deref()
  }

  pub fn count(&self, table: Table) -> Result<i64, AppError> {
    with_conn(&self.conn, |conn| {
      let count = conn.query_row(
        "SELECT COUNT(*) FROM rows WHERE tbl = ?1",
        params![table.as_str()],
        |row| row.get(0),
      )?;
      Ok(count)
    })
  }

  fn user_id_for(&self, email: &str) -> Result<String, AppError> {
    let users = self.select(Table::AppUsers, &Query::new().eq("email", email))?;
    Ok(
      users
        .first()
        .and_then(|user| user.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("local-{email}")),
    )
  }
}

pub fn with_conn<T>(
  conn: &Mutex<Connection>,
  f: impl FnOnce(&mut Connection) -> Result<T, AppError>,
) -> Result<T, AppError> {
  let mut guard = conn.lock()?;
  f(&mut guard)
}

impl DataService for LocalBackend {
  fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, AppError> {
    let rows = with_conn(&self.conn, |conn| {
      let mut stmt = conn.prepare("SELECT data FROM rows WHERE tbl = ?1 ORDER BY created_at, rowid")?;
      let rows = stmt.query_map(params![table.as_str()], |row| row.get::<_, String>(0))?;
      let mut items = Vec::new();
      for row in rows {
        items.push(serde_json::from_str::<Value>(&row?)?);
      }
      Ok(items)
    })?;
    debug!(table = table.as_str(), scanned = rows.len(), "local select");
    Ok(query.apply(rows))
  }

  fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, AppError> {
    with_conn(&self.conn, |conn| {
      let tx = conn.transaction()?;
      let now = Utc::now().to_rfc3339();
      let mut inserted = Vec::with_capacity(rows.len());
      for row in rows {
        let Value::Object(mut map) = row else {
          return Err(AppError::new("REMOTE_INVALID_ROW", "Registro precisa ser um objeto"));
        };
        let id = match map.get("id").and_then(Value::as_str) {
          Some(id) if !id.trim().is_empty() => id.to_string(),
          _ => generate_id(ID_LEN),
        };
        map.insert("id".to_string(), Value::from(id.clone()));
        map
          .entry("created_at".to_string())
          .or_insert_with(|| Value::from(now.clone()));
        let data = Value::Object(map);
        let written = tx.execute(
          "INSERT OR IGNORE INTO rows (tbl, id, data, created_at) VALUES (?1, ?2, ?3, ?4)",
          params![table.as_str(), id, data.to_string(), now],
        )?;
        if written == 0 {
          return Err(AppError::new(
            "REMOTE_CONFLICT",
            format!("{} {id} ja existe", table.as_str()),
          ));
        }
        inserted.push(data);
      }
      tx.commit()?;
      Ok(inserted)
    })
  }

  fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value, AppError> {
    let Value::Object(changes) = patch else {
      return Err(AppError::new("REMOTE_INVALID_ROW", "Alteracao precisa ser um objeto"));
    };
    with_conn(&self.conn, |conn| {
      let existing: Option<String> = conn
        .query_row(
          "SELECT data FROM rows WHERE tbl = ?1 AND id = ?2",
          params![table.as_str(), id],
          |row| row.get(0),
        )
        .optional()?;
      let existing = existing.ok_or_else(|| AppError::not_found(table.as_str(), id))?;
      let mut map: Map<String, Value> = match serde_json::from_str(&existing)? {
        Value::Object(map) => map,
        _ => Map::new(),
      };
      for (key, value) in changes {
        if key != "id" {
          map.insert(key, value);
        }
      }
      let data = Value::Object(map);
      conn.execute(
        "UPDATE rows SET data = ?1 WHERE tbl = ?2 AND id = ?3",
        params![data.to_string(), table.as_str(), id],
      )?;
      Ok(data)
    })
  }

  fn delete(&self, table: Table, id: &str) -> Result<(), AppError> {
    with_conn(&self.conn, |conn| {
      conn.execute(
        "DELETE FROM rows WHERE tbl = ?1 AND id = ?2",
        params![table.as_str(), id],
      )?;
      Ok(())
    })
  }
}

impl AuthService for LocalBackend {
  fn current_session(&self) -> Result<Option<Session>, AppError> {
    let mut guard = self.session.lock()?;
    if guard.as_ref().is_some_and(|session| session.is_expired(Utc::now())) {
      *guard = None;
    }
    Ok(guard.clone())
  }

  fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
    let email = email.trim().to_lowercase();
    match self.credentials.get(&email) {
      Some(expected) if expected == password => {}
      _ => return Err(AppError::new("AUTH_INVALID", "Credenciais invalidas")),
    }
    let session = Session {
      user_id: self.user_id_for(&email)?,
      email,
      access_token: generate_id(TOKEN_LEN),
      refresh_token: None,
      expires_at: Utc::now() + chrono::Duration::hours(SESSION_HOURS),
    };
    *self.session.lock()? = Some(session.clone());
    self.subscribers.broadcast(AuthEvent::SignedIn(session.clone()));
    Ok(session)
  }

  fn sign_out(&self) -> Result<(), AppError> {
    *self.session.lock()? = None;
    self.subscribers.broadcast(AuthEvent::SignedOut);
    Ok(())
  }

  fn subscribe(&self) -> Receiver<AuthEvent> {
    self.subscribers.subscribe()
  }
}

fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
  conn.execute_batch(
    "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
  )?;

  apply_migration(conn, "001_init", include_str!("../migrations/001_init.sql"))?;
  Ok(())
}

fn apply_migration(conn: &mut Connection, version: &str, sql: &str) -> Result<(), AppError> {
  let exists: i64 = conn.query_row(
    "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
    params![version],
    |row| row.get(0),
  )?;
  if exists > 0 {
    return Ok(());
  }

  conn.execute_batch(sql)?;
  conn.execute(
    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
    params![version, Utc::now().to_rfc3339()],
  )?;
  Ok(())
}

fn generate_id(len: usize) -> String {
  rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(len)
    .map(char::from)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn insert_assigns_ids_and_rejects_duplicates() {
    let backend = LocalBackend::in_memory().unwrap();
    let rows = backend
      .insert(Table::Clients, vec![json!({ "name": "Padaria Central" }), json!({ "id": "fixed", "name": "Mercado Sol" })])
      .unwrap();
    assert_eq!(rows[0]["id"].as_str().unwrap().len(), ID_LEN);
    assert_eq!(rows[1]["id"], "fixed");
    assert!(rows[0]["created_at"].is_string());

    let err = backend
      .insert(Table::Clients, vec![json!({ "id": "fixed", "name": "Outro" })])
      .unwrap_err();
    assert_eq!(err.code, "REMOTE_CONFLICT");
    assert_eq!(backend.count(Table::Clients).unwrap(), 2);
  }

  #[test]
  fn update_merges_and_keeps_id() {
    let backend = LocalBackend::in_memory().unwrap();
    backend
      .insert(Table::Tasks, vec![json!({ "id": "t1", "title": "DCTF", "is_paused": false })])
      .unwrap();
    let row = backend
      .update(Table::Tasks, "t1", json!({ "id": "other", "is_paused": true, "last_paused_at": null }))
      .unwrap();
    assert_eq!(row["id"], "t1");
    assert_eq!(row["title"], "DCTF");
    assert_eq!(row["is_paused"], true);
    assert!(row.get("last_paused_at").unwrap().is_null());

    let err = backend.update(Table::Tasks, "missing", json!({})).unwrap_err();
    assert_eq!(err.code, "NOT_FOUND");
  }

  #[test]
  fn tables_are_isolated() {
    let backend = LocalBackend::in_memory().unwrap();
    backend.insert(Table::Clients, vec![json!({ "id": "x" })]).unwrap();
    backend.insert(Table::Tasks, vec![json!({ "id": "x" })]).unwrap();
    backend.delete(Table::Tasks, "x").unwrap();
    assert_eq!(backend.select(Table::Clients, &Query::new()).unwrap().len(), 1);
    assert!(backend.select(Table::Tasks, &Query::new()).unwrap().is_empty());
  }

  #[test]
  fn sign_in_checks_credentials_and_notifies() {
    let backend = LocalBackend::in_memory()
      .unwrap()
      .with_credential("Ana@Escritorio.com.br", "segredo");
    let events = backend.subscribe();
    assert_eq!(
      backend.sign_in("ana@escritorio.com.br", "errado").unwrap_err().code,
      "AUTH_INVALID"
    );
    let session = backend.sign_in(" ana@escritorio.com.br ", "segredo").unwrap();
    assert_eq!(session.user_id, "local-ana@escritorio.com.br");
    assert_eq!(backend.current_session().unwrap(), Some(session.clone()));
    assert_eq!(events.try_recv(), Ok(AuthEvent::SignedIn(session)));

    backend.sign_out().unwrap();
    assert_eq!(backend.current_session().unwrap(), None);
    assert_eq!(events.try_recv(), Ok(AuthEvent::SignedOut));
  }

  #[test]
  fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("fiscal.sqlite");
    {
      let backend = LocalBackend::open(&path).unwrap();
      backend.insert(Table::Clients, vec![json!({ "id": "c1", "name": "Padaria" })]).unwrap();
      assert_eq!(backend.db_path(), Some(path.as_path()));
    }
    let backend = LocalBackend::open(&path).unwrap();
    assert_eq!(backend.count(Table::Clients).unwrap(), 1);
  }
}
