use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fiscal_backoffice::commands::AppState;
use fiscal_backoffice::config::AppConfig;
use fiscal_backoffice::server;

fn init_tracing(log_json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  if log_json {
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer().json())
      .init();
  } else {
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer())
      .init();
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let config = AppConfig::from_env()?;
  init_tracing(config.log_json);

  let bind = config.bind.clone();
  let state = AppState::from_config(config)?;
  let served = server::serve(&state, &bind);
  state.session.teardown()?;
  served?;
  Ok(())
}
