use std::fmt::Write;

use crate::error::AppError;
use crate::export::excel::timestamp;
use crate::reports::DailyReport;

/// Two sections, tasks then closings, separated by a blank line.
pub fn render_daily_report(report: &DailyReport) -> Result<String, AppError> {
  let mut out = String::new();
  writeln!(out, "{}", escape_csv(&report.title())).map_err(fmt_error)?;
  writeln!(out, "tarefa,cliente,quadrante,concluida_em,minutos").map_err(fmt_error)?;
  for task in &report.tasks {
    writeln!(
      out,
      "{},{},{},{},{}",
      escape_csv(&task.title),
      escape_csv(&task.client_name),
      escape_csv(task.quadrant),
      timestamp(task.completed_at),
      task.net_minutes
    )
    .map_err(fmt_error)?;
  }

  writeln!(out).map_err(fmt_error)?;
  writeln!(out, "cliente,regime,status,importacao,iniciado,concluido").map_err(fmt_error)?;
  for closing in &report.closings {
    writeln!(
      out,
      "{},{},{},{},{},{}",
      escape_csv(&closing.client_name),
      escape_csv(&closing.regime),
      escape_csv(closing.status),
      escape_csv(&closing.import_type),
      timestamp(closing.started_at),
      timestamp(closing.completed_at)
    )
    .map_err(fmt_error)?;
  }

  let totals = &report.totals;
  writeln!(out).map_err(fmt_error)?;
  writeln!(
    out,
    "total_tarefas,{},total_minutos,{},fechamentos,{},concluidos,{}",
    totals.tasks_done, totals.net_minutes, totals.closings_total, totals.closings_done
  )
  .map_err(fmt_error)?;
  Ok(out)
}

fn fmt_error(err: std::fmt::Error) -> AppError {
  AppError::new("EXPORT", err.to_string())
}

fn escape_csv(value: &str) -> String {
  if value.contains(',') || value.contains('"') || value.contains('\n') {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}
