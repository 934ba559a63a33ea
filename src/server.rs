use std::collections::HashMap;
use std::io::Cursor;

use chrono::Local;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::commands::{self, AppState, LoginInput, NewTaskRequest, TimerAction};
use crate::domain::closing::AdvanceInput;
use crate::domain::filters::ClosingListFilter;
use crate::domain::validation;
use crate::error::AppError;
use crate::export::ReportFormat;
use crate::models::{ClosingStatus, Competence, ImportType, TaxRegime};
use crate::reports;
use crate::tasks::TaskInput;

pub const LOGIN_ROUTE: &str = "/login";

/// Transport-independent answer of [`dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub content_type: &'static str,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl ApiResponse {
  pub fn json<T: Serialize>(status: u16, payload: &T) -> Self {
    let body = serde_json::to_vec(payload).unwrap_or_else(|_| b"{}".to_vec());
    Self {
      status,
      content_type: "application/json",
      headers: Vec::new(),
      body,
    }
  }

  pub fn error(status: u16, code: &str, message: &str) -> Self {
    Self::json(status, &serde_json::json!({ "code": code, "message": message }))
  }

  pub fn from_error(err: &AppError) -> Self {
    Self::error(status_for(err), &err.code, &err.message)
  }

  pub fn redirect(location: &str) -> Self {
    Self {
      status: 303,
      content_type: "text/plain; charset=utf-8",
      headers: vec![("Location".to_string(), location.to_string())],
      body: Vec::new(),
    }
  }

  fn bytes(content_type: &'static str, body: Vec<u8>) -> Self {
    Self {
      status: 200,
      content_type,
      headers: Vec::new(),
      body,
    }
  }

  pub fn json_body(&self) -> Option<serde_json::Value> {
    serde_json::from_slice(&self.body).ok()
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }
}

pub fn status_for(err: &AppError) -> u16 {
  if err.is_validation() {
    422
  } else if err.code.starts_with("AUTH_") {
    401
  } else if err.code == "NOT_FOUND" {
    404
  } else if err.is_remote() {
    502
  } else if err.code == "BAD_REQUEST" || err.code == "DECODE_ERROR" {
    400
  } else {
    500
  }
}

fn respond<T: Serialize>(result: Result<T, AppError>) -> ApiResponse {
  match result {
    Ok(payload) => ApiResponse::json(200, &payload),
    Err(err) => ApiResponse::from_error(&err),
  }
}

#[derive(Debug, Default, Deserialize)]
struct RetreatInput {
  #[serde(default)]
  confirmed: bool,
}

/// Routes one request. Every route but the login route requires a session
/// whose access token the caller presents as `Authorization: Bearer`, and
/// answers `303` to the login route otherwise.
pub fn dispatch(
  state: &AppState,
  method: &Method,
  path: &str,
  query: &str,
  authorization: Option<&str>,
  body: &[u8],
) -> ApiResponse {
  let path = path.trim_end_matches('/');
  let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
  let params = parse_query(query);

  if path != LOGIN_ROUTE {
    match state.session.session() {
      Ok(Some(session)) if bearer_token(authorization) == Some(session.access_token.as_str()) => {}
      Ok(Some(_)) => {
        warn!(path, "request without the session token");
        return ApiResponse::redirect(LOGIN_ROUTE);
      }
      Ok(None) => return ApiResponse::redirect(LOGIN_ROUTE),
      Err(err) => return ApiResponse::from_error(&err),
    }
  }

  match (method, segments.as_slice()) {
    (Method::Get, ["login"]) => respond(state.session.session().map(|session| {
      serde_json::json!({
        "signed_in": session.is_some(),
        "email": session.map(|session| session.email),
      })
    })),
    (Method::Post, ["login"]) => match decode::<LoginInput>(body) {
      Ok(input) => respond(commands::login(state, &input)),
      Err(err) => ApiResponse::from_error(&err),
    },
    (Method::Post, ["logout"]) => respond(commands::logout(state).map(|_| serde_json::json!({ "ok": true }))),

    (Method::Get, ["closings"]) => respond(
      competence_param(&params)
        .and_then(|competence| commands::closing_board(state, competence, params.get("search").map(String::as_str))),
    ),
    (Method::Get, ["closings", "list"]) => respond(
      competence_param(&params)
        .and_then(|competence| Ok((competence, list_filter(&params)?)))
        .and_then(|(competence, filter)| commands::list_closings(state, competence, &filter)),
    ),
    (Method::Post, ["closings", "sync"]) => {
      respond(competence_param(&params).and_then(|competence| commands::sync_closings(state, competence)))
    }
    (Method::Post, ["closings", id, "advance"]) => respond(
      decode::<AdvanceInput>(body).and_then(|input| commands::advance_closing(state, id, &input)),
    ),
    (Method::Post, ["closings", id, "retreat"]) => respond(
      decode::<RetreatInput>(body).and_then(|input| commands::retreat_closing(state, id, input.confirmed)),
    ),

    (Method::Get, ["tasks"]) => respond(commands::task_quadrants(state)),
    (Method::Post, ["tasks"]) => {
      respond(decode::<NewTaskRequest>(body).and_then(|request| commands::create_task(state, &request)))
    }
    (Method::Put, ["tasks", id]) => {
      respond(decode::<TaskInput>(body).and_then(|input| commands::update_task(state, id, &input)))
    }
    (Method::Delete, ["tasks", id]) => {
      respond(commands::delete_task(state, id).map(|_| serde_json::json!({ "ok": true })))
    }
    (Method::Post, ["tasks", id, "checklist", index]) => match index.parse::<usize>() {
      Ok(index) => respond(commands::toggle_checklist(state, id, index)),
      Err(_) => ApiResponse::error(400, "BAD_REQUEST", "Indice de checklist invalido"),
    },
    (Method::Post, ["tasks", id, action]) => match TimerAction::parse(action) {
      Some(action) => respond(commands::run_timer(state, id, action)),
      None => not_found(),
    },

    (Method::Get, ["dashboard", "tasks"]) => respond(commands::tasks_dashboard(state)),
    (Method::Get, ["dashboard", "fiscal"]) => respond(
      competence_param(&params).and_then(|competence| commands::fiscal_dashboard(state, competence)),
    ),
    (Method::Get, ["reports", "daily"]) => daily_report(state, &params),

    _ => not_found(),
  }
}

fn bearer_token(authorization: Option<&str>) -> Option<&str> {
  let (scheme, token) = authorization?.trim().split_once(' ')?;
  let token = token.trim();
  (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn not_found() -> ApiResponse {
  ApiResponse::error(404, "NOT_FOUND", "Rota nao encontrada")
}

fn daily_report(state: &AppState, params: &HashMap<String, String>) -> ApiResponse {
  report_response(state, params).unwrap_or_else(|err| ApiResponse::from_error(&err))
}

fn report_response(state: &AppState, params: &HashMap<String, String>) -> Result<ApiResponse, AppError> {
  let day = match params.get("day") {
    Some(raw) => validation::parse_date(raw)?,
    None => Local::now().date_naive(),
  };
  let competence = params.get("competence").map(|raw| Competence::parse(raw)).transpose()?;
  let format = ReportFormat::parse(params.get("format").map(String::as_str).unwrap_or(""))
    .ok_or_else(|| AppError::new("BAD_REQUEST", "Formato de relatorio desconhecido"))?;
  let report = commands::daily_report(state, day, competence)?;
  if params.get("preview").is_some_and(|raw| crate::config::parse_bool(raw)) {
    let path = commands::preview_report(&report, format)?;
    return Ok(ApiResponse::json(200, &serde_json::json!({ "preview": path })));
  }
  Ok(match format {
    ReportFormat::Json => ApiResponse::json(200, &report),
    other => ApiResponse::bytes(other.content_type(), commands::render_report(&report, other)?),
  })
}

fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(T::default());
  }
  serde_json::from_slice(body).map_err(|err| AppError::new("BAD_REQUEST", format!("Corpo invalido: {err}")))
}

fn competence_param(params: &HashMap<String, String>) -> Result<Competence, AppError> {
  match params.get("competence") {
    Some(raw) => Ok(Competence::parse(raw)?),
    None => Ok(reports::default_competence(Local::now().date_naive())),
  }
}

fn list_filter(params: &HashMap<String, String>) -> Result<ClosingListFilter, AppError> {
  let regime = match params.get("regime") {
    Some(raw) => Some(
      serde_json::from_value::<TaxRegime>(serde_json::Value::from(raw.as_str()))
        .map_err(|_| AppError::new("BAD_REQUEST", format!("Regime desconhecido: {raw}")))?,
    ),
    None => None,
  };
  Ok(ClosingListFilter {
    client_name: params.get("client_name").cloned(),
    regime,
    status: params.get("status").map(|raw| ClosingStatus::parse(raw)).transpose()?,
    import_type: params.get("import_type").map(|raw| ImportType::parse(raw)).transpose()?,
    completed_on: params
      .get("completed_on")
      .map(|raw| validation::parse_date(raw))
      .transpose()?,
  })
}

/// Splits `a=1&b=two%20words`. Empty values are dropped.
pub fn parse_query(query: &str) -> HashMap<String, String> {
  let Ok(mut url) = Url::parse("http://localhost/") else {
    return HashMap::new();
  };
  url.set_query(Some(query.trim_start_matches('?')));
  url
    .query_pairs()
    .filter(|(key, value)| !key.is_empty() && !value.trim().is_empty())
    .map(|(key, value)| (key.into_owned(), value.into_owned()))
    .collect()
}

/// Serves requests one at a time until the listener fails.
pub fn serve(state: &AppState, bind: &str) -> Result<(), AppError> {
  let server = Server::http(bind).map_err(|err| AppError::new("SERVER_BIND", format!("{bind}: {err}")))?;
  info!(bind, "http surface listening");
  for request in server.incoming_requests() {
    handle_request(request, state);
  }
  Ok(())
}

fn handle_request(mut request: Request, state: &AppState) {
  let method = request.method().clone();
  let url = request.url().to_string();
  let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

  let authorization = request
    .headers()
    .iter()
    .find(|header| header.field.equiv("Authorization"))
    .map(|header| header.value.as_str().to_string());

  let mut body = Vec::new();
  let api = if request.as_reader().read_to_end(&mut body).is_err() {
    ApiResponse::error(400, "BAD_REQUEST", "Corpo da requisicao ilegivel")
  } else {
    dispatch(state, &method, path, query, authorization.as_deref(), &body)
  };
  debug!(method = %method, path, status = api.status, "request handled");

  let mut response: Response<Cursor<Vec<u8>>> = Response::from_data(api.body).with_status_code(StatusCode(api.status));
  for (name, value) in std::iter::once(("Content-Type".to_string(), api.content_type.to_string())).chain(api.headers) {
    match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
      Ok(header) => response.add_header(header),
      Err(_) => warn!(header = %name, "invalid response header skipped"),
    }
  }
  if let Err(err) = request.respond(response) {
    warn!(error = %err, "failed to send response");
  }
}
