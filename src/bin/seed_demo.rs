use chrono::{Duration, Local, Utc};
use serde_json::Value;

use fiscal_backoffice::commands::open_local_store;
use fiscal_backoffice::config::AppConfig;
use fiscal_backoffice::db::LocalBackend;
use fiscal_backoffice::domain::closing::{self, AdvanceInput, ImportChoice};
use fiscal_backoffice::error::AppError;
use fiscal_backoffice::models::{
  AppUser, Category, ChecklistItem, Client, Competence, FiscalClosing, ImportErrorReason, ImportType, ObligationType,
  Quadrant, Task, TaskCategory, TaskStatus, TaxGuide, TaxRegime,
};
use fiscal_backoffice::remote::{DataService, Table};
use fiscal_backoffice::reports::default_competence;

const CLIENTS: [(&str, Option<&str>, TaxRegime); 6] = [
  ("Padaria Central Ltda", Some("Padaria Central"), TaxRegime::SimplesNacional),
  ("Oficina do Joao ME", None, TaxRegime::Mei),
  ("Mercado Sol Nascente Ltda", Some("Mercado Sol"), TaxRegime::LucroPresumido),
  ("Clinica Vida Plena S/A", None, TaxRegime::LucroReal),
  ("Transportes Rota Sul Ltda", Some("Rota Sul"), TaxRegime::LucroPresumido),
  ("Studio Bella Forma", None, TaxRegime::SimplesNacional),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let config = AppConfig::from_env()?;
  let store = open_local_store(&config)?;

  if store.count(Table::Clients)? > 0 {
    println!("Base ja possui dados, nada a fazer");
    return Ok(());
  }

  let competence = default_competence(Local::now().date_naive());
  let summary = seed(&store, competence)?;
  let location = store
    .db_path()
    .map(|path| path.display().to_string())
    .unwrap_or_else(|| ":memory:".to_string());
  println!("{summary} em {location}");
  Ok(())
}

fn to_rows<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>, AppError> {
  items
    .iter()
    .map(|item| serde_json::to_value(item).map_err(AppError::from))
    .collect()
}

fn seed(store: &LocalBackend, competence: Competence) -> Result<String, AppError> {
  let clients: Vec<Client> = CLIENTS
    .iter()
    .enumerate()
    .map(|(idx, (name, trade_name, regime))| Client {
      id: format!("cli-{:02}", idx + 1),
      name: name.to_string(),
      trade_name: trade_name.map(str::to_string),
      document: Some(format!("{:02}.{:03}.{:03}/0001-{:02}", 11 + idx, 222 + idx, 333 + idx, 40 + idx)),
      regime: Some(*regime),
    })
    .collect();
  store.insert(Table::Clients, to_rows(&clients)?)?;

  let categories = vec![
    Category { id: "cat-fiscal".to_string(), name: "Fiscal".to_string(), color: Some("#1A2433".to_string()) },
    Category { id: "cat-pessoal".to_string(), name: "Departamento pessoal".to_string(), color: Some("#2F855A".to_string()) },
    Category { id: "cat-contabil".to_string(), name: "Contabil".to_string(), color: Some("#B7791F".to_string()) },
  ];
  store.insert(Table::Categories, to_rows(&categories)?)?;

  let standards = vec![
    TaskCategory {
      id: "std-das".to_string(),
      title: "Apuracao do Simples Nacional".to_string(),
      category_id: Some("cat-fiscal".to_string()),
      default_checklist: vec!["Importar notas".to_string(), "Conferir receita".to_string(), "Gerar DAS".to_string()],
      estimated_minutes: Some(40),
    },
    TaskCategory {
      id: "std-folha".to_string(),
      title: "Folha de pagamento".to_string(),
      category_id: Some("cat-pessoal".to_string()),
      default_checklist: vec!["Lancar eventos".to_string(), "Calcular".to_string(), "Enviar holerites".to_string()],
      estimated_minutes: Some(90),
    },
  ];
  store.insert(Table::TaskCategories, to_rows(&standards)?)?;

  let obligations = vec![
    ObligationType { id: "obr-das".to_string(), name: "DAS".to_string(), recurrence: Some("mensal".to_string()) },
    ObligationType { id: "obr-parc".to_string(), name: "Parcelamento".to_string(), recurrence: Some("mensal".to_string()) },
  ];
  store.insert(Table::ObligationTypes, to_rows(&obligations)?)?;

  let users = vec![AppUser {
    id: "usr-ana".to_string(),
    email: "ana@escritorio.com.br".to_string(),
    display_name: Some("Ana".to_string()),
    role: Some("admin".to_string()),
  }];
  store.insert(Table::AppUsers, to_rows(&users)?)?;

  let now = Utc::now();
  let today = Local::now().date_naive();
  let mut tasks = Vec::new();
  for (idx, client) in clients.iter().enumerate() {
    let mut task = Task::new(format!("Conferencia fiscal - {}", client.display_name()), Quadrant::ALL[idx % 4]);
    task.client_id = Some(client.id.clone());
    task.category_id = Some("cat-fiscal".to_string());
    task.due_date = Some(today + Duration::days(idx as i64 - 2));
    task.checklist = vec![
      ChecklistItem { text: "Baixar XMLs".to_string(), done: idx % 2 == 0 },
      ChecklistItem { text: "Conferir CFOP".to_string(), done: idx % 2 == 0 },
    ];
    task.created_at = Some(now - Duration::days(3));
    if idx % 2 == 0 {
      task.started_at = Some(now - Duration::minutes(120));
      task.total_pause = Duration::minutes(20).num_milliseconds();
      task.completed_at = Some(now - Duration::minutes(15));
      task.status = TaskStatus::Done;
    } else if idx == 1 {
      task.started_at = Some(now - Duration::minutes(30));
      task.status = TaskStatus::InProgress;
    }
    tasks.push(task);
  }
  store.insert(Table::Tasks, to_rows(&tasks)?)?;

  let mut guides = Vec::new();
  for installment in 1..=4 {
    guides.push(TaxGuide {
      id: String::new(),
      client_id: clients[2].id.clone(),
      obligation_type_id: Some("obr-parc".to_string()),
      competence,
      due_date: today + Duration::days(10 * installment as i64 - 15),
      amount: 1250.0,
      installment_number: Some(installment),
      installment_total: Some(4),
      paid_at: (installment == 1).then_some(now),
    });
  }
  store.insert(Table::TaxGuides, to_rows(&guides)?)?;

  // Walk each closing through the real transitions so the stage metadata is
  // consistent with its status.
  let inputs = [
    AdvanceInput::confirmed(),
    AdvanceInput::import(ImportType::Automatic, None),
    AdvanceInput::movement(true, true),
    AdvanceInput::confirmed(),
  ];
  let mut closings = Vec::new();
  for (idx, client) in clients.iter().enumerate() {
    let mut record = FiscalClosing::pending(client.id.as_str(), competence);
    let steps = idx % 5;
    for (step, input) in inputs.iter().take(steps).enumerate() {
      let input = if step == 1 && idx % 2 == 1 {
        AdvanceInput {
          import: Some(ImportChoice {
            import_type: ImportType::Manual,
            error_reason: Some(ImportErrorReason::ALL[idx % ImportErrorReason::ALL.len()]),
            adjustment_details: Some("Notas reprocessadas manualmente".to_string()),
          }),
          ..AdvanceInput::default()
        }
      } else {
        input.clone()
      };
      let at = now - Duration::hours(24 * (steps - step) as i64);
      if let Some(transition) = closing::plan_advance(&record, &input, at)? {
        transition.apply(&mut record);
      }
    }
    closings.push(record);
  }
  store.insert(Table::FiscalClosings, to_rows(&closings)?)?;

  Ok(format!(
    "Criados {} clientes, {} tarefas, {} guias e {} fechamentos ({})",
    clients.len(),
    tasks.len(),
    guides.len(),
    closings.len(),
    competence
  ))
}
