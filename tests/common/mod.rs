#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use fiscal_backoffice::config::AppConfig;
use fiscal_backoffice::db::LocalBackend;
use fiscal_backoffice::error::AppError;
use fiscal_backoffice::models::{Client, Competence, TaxRegime};
use fiscal_backoffice::remote::{AuthService, DataService, Query, Table};
use fiscal_backoffice::AppState;

pub const EMAIL: &str = "ana@escritorio.com.br";
pub const PASSWORD: &str = "segredo";

pub fn competence() -> Competence {
  Competence::parse("2026-02").unwrap()
}

pub fn client(id: &str, name: &str, regime: TaxRegime) -> Client {
  Client {
    id: id.to_string(),
    name: name.to_string(),
    trade_name: None,
    document: None,
    regime: Some(regime),
  }
}

/// In-memory backend with one login and two clients.
pub fn backend() -> Arc<LocalBackend> {
  let backend = LocalBackend::in_memory().unwrap().with_credential(EMAIL, PASSWORD);
  let rows = [
    client("cli-padaria", "Padaria Central", TaxRegime::SimplesNacional),
    client("cli-oficina", "Oficina do Joao", TaxRegime::LucroPresumido),
  ]
  .iter()
  .map(|client| serde_json::to_value(client).unwrap())
  .collect();
  backend.insert(Table::Clients, rows).unwrap();
  Arc::new(backend)
}

/// Counts writes and can be told to reject updates.
pub struct Counting {
  pub inner: Arc<LocalBackend>,
  pub inserts: AtomicUsize,
  pub updates: AtomicUsize,
  pub fail_updates: AtomicBool,
}

impl Counting {
  pub fn new(inner: Arc<LocalBackend>) -> Arc<Self> {
    Arc::new(Self {
      inner,
      inserts: AtomicUsize::new(0),
      updates: AtomicUsize::new(0),
      fail_updates: AtomicBool::new(false),
    })
  }

  pub fn inserts(&self) -> usize {
    self.inserts.load(Ordering::SeqCst)
  }

  pub fn updates(&self) -> usize {
    self.updates.load(Ordering::SeqCst)
  }

  pub fn set_failing(&self, failing: bool) {
    self.fail_updates.store(failing, Ordering::SeqCst);
  }
}

impl DataService for Counting {
  fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, AppError> {
    self.inner.select(table, query)
  }

  fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, AppError> {
    self.inserts.fetch_add(1, Ordering::SeqCst);
    self.inner.insert(table, rows)
  }

  fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value, AppError> {
    if self.fail_updates.load(Ordering::SeqCst) {
      return Err(AppError::new("REMOTE_ERROR", "servico indisponivel"));
    }
    self.updates.fetch_add(1, Ordering::SeqCst);
    self.inner.update(table, id, patch)
  }

  fn delete(&self, table: Table, id: &str) -> Result<(), AppError> {
    self.inner.delete(table, id)
  }
}

pub fn app_state(backend: Arc<LocalBackend>) -> AppState {
  let config = AppConfig::from_lookup(|_| None).unwrap();
  let data: Arc<dyn DataService> = backend.clone();
  let auth: Arc<dyn AuthService> = backend;
  AppState::new(config, data, auth).unwrap()
}
