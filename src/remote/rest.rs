use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Session;
use crate::remote::{AuthEvent, AuthService, DataService, FilterOp, Query, Subscribers, Table};

/// Hosted backend: row API under `/rest/v1`, auth under `/auth/v1`.
pub struct RestBackend {
  base_url: String,
  api_key: String,
  http: Client,
  session: Mutex<Option<Session>>,
  subscribers: Subscribers,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in: Option<i64>,
  user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
  id: String,
  #[serde(default)]
  email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
  #[serde(default)]
  exp: Option<i64>,
}

impl RestBackend {
  pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|err| AppError::new("REMOTE_ERROR", format!("Erro criando cliente HTTP: {err}")))?;
    Ok(Self {
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key: api_key.to_string(),
      http,
      session: Mutex::new(None),
      subscribers: Subscribers::default(),
    })
  }

  fn table_url(&self, table: Table) -> String {
    format!("{}/rest/v1/{}", self.base_url, table.as_str())
  }

  fn bearer(&self) -> String {
    let token = self
      .session
      .lock()
      .ok()
      .and_then(|session| session.as_ref().map(|s| s.access_token.clone()))
      .unwrap_or_else(|| self.api_key.clone());
    format!("Bearer {token}")
  }

  fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
    builder
      .header("apikey", &self.api_key)
      .header("Authorization", self.bearer())
      .header("Content-Type", "application/json")
  }

  fn request_token(&self, grant_type: &str, body: Value) -> Result<Session, AppError> {
    let url = format!("{}/auth/v1/token?grant_type={grant_type}", self.base_url);
    let response = self
      .http
      .post(&url)
      .header("apikey", &self.api_key)
      .header("Content-Type", "application/json")
      .json(&body)
      .send()?;
    if response.status().as_u16() == 400 || response.status().as_u16() == 401 {
      return Err(AppError::new("AUTH_INVALID", "Credenciais invalidas"));
    }
    let token: TokenResponse = check_status(response)?.json()?;
    Ok(session_from_token(token, Utc::now()))
  }

  fn store_session(&self, session: Option<Session>) -> Result<(), AppError> {
    let mut guard = self.session.lock()?;
    *guard = session;
    Ok(())
  }
}

impl DataService for RestBackend {
  fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, AppError> {
    let mut params = query_params(query);
    params.insert(0, ("select".to_string(), "*".to_string()));
    debug!(table = table.as_str(), filters = query.filters.len(), "remote select");
    let response = self
      .authorized(self.http.get(self.table_url(table)))
      .query(&params)
      .send()
      .map_err(|err| remote_failure(table, "select", err.into()))?;
    let rows: Vec<Value> = check_status(response)
      .map_err(|err| remote_failure(table, "select", err))?
      .json()?;
    Ok(rows)
  }

  fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, AppError> {
    if rows.is_empty() {
      return Ok(Vec::new());
    }
    let response = self
      .authorized(self.http.post(self.table_url(table)))
      .header("Prefer", "return=representation")
      .json(&rows)
      .send()
      .map_err(|err| remote_failure(table, "insert", err.into()))?;
    let inserted: Vec<Value> = check_status(response)
      .map_err(|err| remote_failure(table, "insert", err))?
      .json()?;
    Ok(inserted)
  }

  fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value, AppError> {
    let response = self
      .authorized(self.http.patch(self.table_url(table)))
      .header("Prefer", "return=representation")
      .query(&[("id", format!("eq.{id}"))])
      .json(&patch)
      .send()
      .map_err(|err| remote_failure(table, "update", err.into()))?;
    let mut rows: Vec<Value> = check_status(response)
      .map_err(|err| remote_failure(table, "update", err))?
      .json()?;
    if rows.is_empty() {
      return Err(AppError::not_found(table.as_str(), id));
    }
    Ok(rows.swap_remove(0))
  }

  fn delete(&self, table: Table, id: &str) -> Result<(), AppError> {
    let response = self
      .authorized(self.http.delete(self.table_url(table)))
      .query(&[("id", format!("eq.{id}"))])
      .send()
      .map_err(|err| remote_failure(table, "delete", err.into()))?;
    check_status(response).map_err(|err| remote_failure(table, "delete", err))?;
    Ok(())
  }
}

impl AuthService for RestBackend {
  fn current_session(&self) -> Result<Option<Session>, AppError> {
    let current = self.session.lock()?.clone();
    let Some(session) = current else {
      return Ok(None);
    };
    if !session.is_expired(Utc::now()) {
      return Ok(Some(session));
    }
    let Some(refresh_token) = session.refresh_token.clone() else {
      self.store_session(None)?;
      self.subscribers.broadcast(AuthEvent::SignedOut);
      return Ok(None);
    };
    match self.request_token("refresh_token", serde_json::json!({ "refresh_token": refresh_token })) {
      Ok(refreshed) => {
        self.store_session(Some(refreshed.clone()))?;
        self.subscribers.broadcast(AuthEvent::SignedIn(refreshed.clone()));
        Ok(Some(refreshed))
      }
      Err(err) => {
        warn!(code = %err.code, "session refresh failed");
        self.store_session(None)?;
        self.subscribers.broadcast(AuthEvent::SignedOut);
        Ok(None)
      }
    }
  }

  fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
    let session = self.request_token(
      "password",
      serde_json::json!({ "email": email, "password": password }),
    )?;
    self.store_session(Some(session.clone()))?;
    self.subscribers.broadcast(AuthEvent::SignedIn(session.clone()));
    Ok(session)
  }

  fn sign_out(&self) -> Result<(), AppError> {
    let url = format!("{}/auth/v1/logout", self.base_url);
    let result = self
      .http
      .post(&url)
      .header("apikey", &self.api_key)
      .header("Authorization", self.bearer())
      .send();
    self.store_session(None)?;
    self.subscribers.broadcast(AuthEvent::SignedOut);
    if let Err(err) = result {
      warn!(error = %err, "remote sign-out failed, local session cleared");
    }
    Ok(())
  }

  fn subscribe(&self) -> Receiver<AuthEvent> {
    self.subscribers.subscribe()
  }
}

/// Renders filters as `column=op.value` pairs, plus `order` and `limit`.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
  let mut params: Vec<(String, String)> = query
    .filters
    .iter()
    .map(|filter| {
      let rendered = match filter.op {
        FilterOp::IsNull => "is.null".to_string(),
        FilterOp::ILike => format!("ilike.*{}*", scalar_text(&filter.value)),
        op => format!("{}.{}", op.as_str(), scalar_text(&filter.value)),
      };
      (filter.column.clone(), rendered)
    })
    .collect();
  if let Some(order) = &query.order {
    let direction = if order.ascending { "asc" } else { "desc" };
    params.push(("order".to_string(), format!("{}.{direction}", order.column)));
  }
  if let Some(limit) = query.limit {
    params.push(("limit".to_string(), limit.to_string()));
  }
  params
}

fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    Value::Null => "null".to_string(),
    other => other.to_string(),
  }
}

fn check_status(response: Response) -> Result<Response, AppError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().unwrap_or_default();
  Err(AppError::new("REMOTE_STATUS", format!("HTTP {}: {}", status.as_u16(), body.trim())))
}

fn remote_failure(table: Table, operation: &str, err: AppError) -> AppError {
  warn!(table = table.as_str(), operation, code = %err.code, "remote call failed");
  err
}

fn session_from_token(token: TokenResponse, now: DateTime<Utc>) -> Session {
  let expires_at = token
    .expires_in
    .map(|seconds| now + chrono::Duration::seconds(seconds))
    .or_else(|| jwt_expiry(&token.access_token))
    .unwrap_or(now + chrono::Duration::hours(1));
  Session {
    user_id: token.user.id,
    email: token.user.email.unwrap_or_default(),
    access_token: token.access_token,
    refresh_token: token.refresh_token,
    expires_at,
  }
}

/// Reads the `exp` claim of an access token without verifying it.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
  let payload = token.split('.').nth(1)?;
  let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
    .decode(payload.trim_end_matches('='))
    .ok()?;
  let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
  Utc.timestamp_opt(claims.exp?, 0).single()
}
