#![allow(dead_code)]
use inspection_domain::{ContainerType, InspectionState, NewRunInput, RunId, StepId, StepOutcome};
use inspection_workflow::engine::{create_inspection_runs, record_step};
use inspection_workflow::OperationContext;
use serde_json::{json, Value as JsonValue};

pub fn ctx() -> OperationContext {
  OperationContext::new("inspector@cruz")
}

pub fn input(kind: ContainerType, count: i64) -> NewRunInput {
  NewRunInput { item_key: Some("item-1".into()),
                sku: Some("ACE-55".into()),
                material_name: Some("Acetona".into()),
                container_type: kind,
                container_count: count }
}

/// Estado con un run recien creado.
pub fn state_with_run(count: i64) -> (InspectionState, RunId) {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state, &[input(ContainerType::Drum, count)], &ctx()).unwrap();
  let id = created[0].id.clone();
  (state, id)
}

pub fn scan_qr() -> JsonValue {
  json!({"qrValue": "QR-0001", "qrValidated": true, "validatedAt": "2025-03-01T08:00:00Z"})
}

pub fn inspection_info() -> JsonValue {
  json!({"orderNumber": "SO-100", "datePerformed": "2025-03-01", "timePerformed": "08:30", "inspector": "ana"})
}

pub fn packing_label(all_ok: bool) -> JsonValue {
  json!({
    "shipToOk": true,
    "companyOk": all_ok,
    "orderNumberOk": true,
    "productDescriptionOk": true,
    "gate1Outcome": if all_ok { "PASS" } else { "FAIL" },
    "mismatchReason": if all_ok { JsonValue::Null } else { json!("empresa no coincide") },
    "photos": [{"id": "ph-1", "name": "etiqueta.jpg", "url": "https://files/ph-1"}],
    "completedAt": "2025-03-01T09:00:00Z"
  })
}

pub fn product_label(all_ok: bool) -> JsonValue {
  json!({
    "gradeOk": true,
    "unOk": true,
    "pgOk": all_ok,
    "lidOk": true,
    "ghsOk": true,
    "gate2Outcome": if all_ok { "PASS" } else { "FAIL" },
    "issueReason": if all_ok { JsonValue::Null } else { json!("PG no coincide") },
    "photos": [],
    "completedAt": "2025-03-01T09:30:00Z"
  })
}

pub fn lot_number() -> JsonValue {
  json!({"lots": [{"id": "lot-1", "lotRaw": "L2025-03"}], "sameForAll": true, "completedAt": "2025-03-01T10:00:00Z"})
}

pub fn final_review(approved: bool) -> JsonValue {
  json!({
    "approvals": {"packingLabel": true, "productLabel": true, "lotNumbers": approved},
    "finalNotes": "ok",
    "completedAt": "2025-03-01T10:30:00Z"
  })
}

/// Payload valido con checklist completo para `step_id`.
pub fn passing_payload(step_id: StepId) -> JsonValue {
  match step_id {
    StepId::ScanQr => scan_qr(),
    StepId::InspectionInfo => inspection_info(),
    StepId::VerifyPackingLabel => packing_label(true),
    StepId::VerifyProductLabel => product_label(true),
    StepId::LotNumber => lot_number(),
    StepId::FinalReview => final_review(true),
  }
}

/// Registra PASS en cada paso hasta que el run quede esperando `target`.
pub fn advance_to(state: &mut InspectionState, run_id: &RunId, target: StepId) {
  while state.run(run_id).unwrap().current_step_id < target {
    let step = state.run(run_id).unwrap().current_step_id;
    record_step(state, run_id, step, &passing_payload(step), StepOutcome::Pass, &ctx()).unwrap();
  }
}

/// Lleva el run hasta `completed`.
pub fn complete(state: &mut InspectionState, run_id: &RunId) {
  advance_to(state, run_id, StepId::FinalReview);
  record_step(state, run_id, StepId::FinalReview, &final_review(true), StepOutcome::Pass, &ctx()).unwrap();
}
