use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};

use crate::error::AppError;
use crate::reports::DailyReport;

/// Renders the daily report as an xlsx workbook held in memory.
pub fn render_daily_report(report: &DailyReport) -> Result<Vec<u8>, AppError> {
  let mut workbook = Workbook::new();
  write_summary_sheet(workbook.add_worksheet(), report)?;
  write_tasks_sheet(workbook.add_worksheet(), report)?;
  write_closings_sheet(workbook.add_worksheet(), report)?;
  Ok(workbook.save_to_buffer()?)
}

fn banner() -> Format {
  Format::new()
    .set_bold()
    .set_font_color(Color::White)
    .set_background_color(Color::RGB(0x1A2433))
}

fn column_header() -> Format {
  Format::new()
    .set_bold()
    .set_background_color(Color::RGB(0xE2E8F0))
    .set_align(FormatAlign::Center)
}

fn write_summary_sheet(sheet: &mut Worksheet, report: &DailyReport) -> Result<(), AppError> {
  sheet.set_name("RESUMO")?;
  let label = Format::new().set_bold();
  let percent = Format::new().set_num_format("0.00%");

  sheet.merge_range(0, 0, 0, 3, &report.title(), &banner())?;

  let totals = &report.totals;
  let counts = [
    ("Tarefas concluidas", totals.tasks_done as f64),
    ("Minutos trabalhados", totals.net_minutes as f64),
    ("Fechamentos", totals.closings_total as f64),
    ("Fechamentos concluidos", totals.closings_done as f64),
  ];
  let mut row = 2;
  for (text, value) in counts {
    sheet.write_string_with_format(row, 0, text, &label)?;
    sheet.write_number(row, 1, value)?;
    row += 1;
  }
  sheet.write_string_with_format(row, 0, "Percentual concluido", &label)?;
  sheet.write_number_with_format(row, 1, totals.done_ratio, &percent)?;
  row += 2;

  sheet.write_string_with_format(row, 0, "Status", &column_header())?;
  sheet.write_string_with_format(row, 1, "Quantidade", &column_header())?;
  for status in &totals.closings_by_status {
    row += 1;
    sheet.write_string(row, 0, status.label)?;
    sheet.write_number(row, 1, status.count as f64)?;
  }

  sheet.set_column_width(0, 28)?;
  sheet.set_column_width(1, 14)?;
  Ok(())
}

fn write_tasks_sheet(sheet: &mut Worksheet, report: &DailyReport) -> Result<(), AppError> {
  sheet.set_name("TAREFAS")?;
  let header = column_header();
  for (col, text) in ["Tarefa", "Cliente", "Quadrante", "Concluida em", "Minutos"].iter().enumerate() {
    sheet.write_string_with_format(0, col as u16, *text, &header)?;
  }

  let mut row = 1;
  for task in &report.tasks {
    sheet.write_string(row, 0, &task.title)?;
    sheet.write_string(row, 1, &task.client_name)?;
    sheet.write_string(row, 2, task.quadrant)?;
    sheet.write_string(row, 3, &timestamp(task.completed_at))?;
    sheet.write_number(row, 4, task.net_minutes as f64)?;
    row += 1;
  }

  sheet.set_column_width(0, 36)?;
  sheet.set_column_width(1, 28)?;
  sheet.set_column_width(2, 14)?;
  sheet.set_column_width(3, 18)?;
  Ok(())
}

fn write_closings_sheet(sheet: &mut Worksheet, report: &DailyReport) -> Result<(), AppError> {
  sheet.set_name("FECHAMENTOS")?;
  let header = column_header();
  let columns = ["Cliente", "Regime", "Status", "Importacao", "Iniciado", "Concluido"];
  for (col, text) in columns.iter().enumerate() {
    sheet.write_string_with_format(0, col as u16, *text, &header)?;
  }

  let mut row = 1;
  for closing in &report.closings {
    sheet.write_string(row, 0, &closing.client_name)?;
    sheet.write_string(row, 1, &closing.regime)?;
    sheet.write_string(row, 2, closing.status)?;
    sheet.write_string(row, 3, &closing.import_type)?;
    sheet.write_string(row, 4, &timestamp(closing.started_at))?;
    sheet.write_string(row, 5, &timestamp(closing.completed_at))?;
    row += 1;
  }

  sheet.set_column_width(0, 32)?;
  sheet.set_column_width(1, 18)?;
  sheet.set_column_width(2, 22)?;
  sheet.set_column_width(4, 18)?;
  sheet.set_column_width(5, 18)?;
  Ok(())
}

pub(crate) fn timestamp(value: Option<DateTime<Utc>>) -> String {
  value
    .map(|at| at.format("%d/%m/%Y %H:%M").to_string())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::Competence;
  use crate::reports::assemble;
  use chrono::NaiveDate;

  #[test]
  fn workbook_is_a_zip_container() {
    let day = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
    let report = assemble(day, Competence::containing(day).previous(), &[], &[], &[], Utc::now());
    let bytes = render_daily_report(&report).unwrap();
    assert!(bytes.starts_with(b"PK"));
  }
}
