use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::info;

use crate::audit::log::append_audit;
use crate::domain::validation;
use crate::error::AppError;
use crate::models::Session;
use crate::remote::{AuthEvent, AuthService};

/// Current session, passed explicitly to whoever needs it.
///
/// Created with [`SessionContext::init`] at application start and closed with
/// [`SessionContext::teardown`]. Auth events pushed by the service are folded
/// in whenever the session is read.
pub struct SessionContext {
  auth: Arc<dyn AuthService>,
  current: Mutex<Option<Session>>,
  events: Mutex<Option<Receiver<AuthEvent>>>,
}

impl SessionContext {
  pub fn init(auth: Arc<dyn AuthService>) -> Result<Self, AppError> {
    let events = auth.subscribe();
    let current = auth.current_session()?;
    info!(signed_in = current.is_some(), "session context initialised");
    Ok(Self {
      auth,
      current: Mutex::new(current),
      events: Mutex::new(Some(events)),
    })
  }

  fn drain_events(&self) -> Result<(), AppError> {
    let events = self.events.lock()?;
    let Some(receiver) = events.as_ref() else {
      return Ok(());
    };
    let mut current = self.current.lock()?;
    while let Ok(event) = receiver.try_recv() {
      *current = match event {
        AuthEvent::SignedIn(session) => Some(session),
        AuthEvent::SignedOut => None,
      };
    }
    Ok(())
  }

  pub fn session(&self) -> Result<Option<Session>, AppError> {
    self.drain_events()?;
    let mut current = self.current.lock()?;
    if current.as_ref().is_some_and(|session| session.is_expired(Utc::now())) {
      drop(current);
      let refreshed = self.auth.current_session()?;
      current = self.current.lock()?;
      *current = refreshed;
    }
    Ok(current.clone())
  }

  /// Gate for every screen except login.
  pub fn require(&self) -> Result<Session, AppError> {
    self.session()?.ok_or_else(AppError::auth_required)
  }

  pub fn is_active(&self) -> bool {
    self.events.lock().map(|events| events.is_some()).unwrap_or(false)
  }

  pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
    validation::ensure_not_empty("email", email)?;
    validation::ensure_not_empty("password", password)?;
    let session = self.auth.sign_in(email, password)?;
    self.drain_events()?;
    *self.current.lock()? = Some(session.clone());
    append_audit(Some(&session.email), "SIGN_IN", "SESSION", Some(&session.user_id), None);
    Ok(session)
  }

  pub fn sign_out(&self) -> Result<(), AppError> {
    let actor = self.current.lock()?.as_ref().map(|session| session.email.clone());
    self.auth.sign_out()?;
    self.drain_events()?;
    *self.current.lock()? = None;
    append_audit(actor.as_deref(), "SIGN_OUT", "SESSION", None, None);
    Ok(())
  }

  /// Drops the subscription and forgets the session. Later reads see no session.
  pub fn teardown(&self) -> Result<(), AppError> {
    *self.events.lock()? = None;
    *self.current.lock()? = None;
    info!("session context closed");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::LocalBackend;

  fn context() -> (Arc<LocalBackend>, SessionContext) {
    let backend = Arc::new(
      LocalBackend::in_memory()
        .unwrap()
        .with_credential("ana@escritorio.com.br", "segredo"),
    );
    let ctx = SessionContext::init(backend.clone()).unwrap();
    (backend, ctx)
  }

  #[test]
  fn require_fails_without_session() {
    let (_, ctx) = context();
    assert_eq!(ctx.require().unwrap_err().code, "AUTH_REQUIRED");
  }

  #[test]
  fn pushed_events_update_the_context() {
    let (backend, ctx) = context();
    backend.sign_in("ana@escritorio.com.br", "segredo").unwrap();
    assert_eq!(ctx.require().unwrap().email, "ana@escritorio.com.br");
    backend.sign_out().unwrap();
    assert!(ctx.session().unwrap().is_none());
  }

  #[test]
  fn blank_credentials_never_reach_the_service() {
    let (_, ctx) = context();
    let err = ctx.sign_in("", "segredo").unwrap_err();
    assert!(err.is_validation());
  }

  #[test]
  fn teardown_clears_session_and_subscription() {
    let (backend, ctx) = context();
    ctx.sign_in("ana@escritorio.com.br", "segredo").unwrap();
    assert!(ctx.is_active());
    ctx.teardown().unwrap();
    assert!(!ctx.is_active());
    assert!(ctx.session().unwrap().is_none());
    backend.sign_in("ana@escritorio.com.br", "segredo").unwrap();
    assert!(ctx.session().unwrap().is_none());
  }
}
