use inspection_domain::{ContainerType, NewRunInput, StepId, StepOutcome};
use inspection_store::{InMemoryAuditSink, InMemoryWorkspaceRepository};
use inspection_workflow::{InspectionConfig, InspectionService};
use serde_json::json;
use std::sync::Arc;

fn main() {
  // Repositorio en memoria; la configuración sale de INSPECTION_* o sus
  // valores por defecto.
  let config = InspectionConfig::from_env().expect("configuración");
  let audit = Arc::new(InMemoryAuditSink::new());
  let svc = InspectionService::new(Arc::new(InMemoryWorkspaceRepository::new()), config).with_audit_sink(audit.clone());
  svc.ensure_workspace("demo").expect("workspace");

  let input = NewRunInput { item_key: Some("line-1".into()),
                            sku: Some("ACE-55".into()),
                            material_name: Some("Acetona".into()),
                            container_type: ContainerType::Drum,
                            container_count: 4 };
  let run = svc.create_inspection_runs("demo", &[input], "ana").expect("create").remove(0);
  println!("run creado {} ({} contenedores)", run.id, run.container_count);

  let steps = [(StepId::ScanQr, json!({"qrValue": "QR-0001", "qrValidated": true, "validatedAt": "2025-03-01T08:00:00Z"})),
               (StepId::InspectionInfo,
                json!({"orderNumber": "SO-100", "datePerformed": "2025-03-01", "timePerformed": "08:30", "inspector": "ana"}))];
  for (step, payload) in steps {
    let r = svc.record_step("demo", &run.id, step, &payload, StepOutcome::Pass, "ana").expect("record");
    println!("{} -> {} / {}", step, r.status(), r.current_step_id);
  }

  // Separar un contenedor del run y volver a juntarlos
  let split = svc.split_inspection_run("demo", &run.id, 1, "ana").expect("split");
  println!("split {} ({} contenedor)", split.id, split.container_count);
  let grouped = svc.group_inspection_runs("demo", &[run.id.clone(), split.id], "ana").expect("group");
  println!("agrupado en {} ({} contenedores)", grouped.id, grouped.container_count);

  let summary = svc.summary("demo").expect("summary");
  println!("{}", serde_json::to_string_pretty(&summary).expect("json"));
  println!("actividad registrada: {}", audit.records().len());
}
