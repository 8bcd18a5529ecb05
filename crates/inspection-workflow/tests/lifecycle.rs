mod common;

use common::*;
use inspection_domain::{ContainerType, HistoryKind, InspectionError, InspectionState, RunStatus, StepId, StepOutcome};
use inspection_workflow::engine::{bind_run_to_qr, cancel_inspection_run, compute_run_status_after_step,
                                  create_inspection_runs, hold_inspection_run, record_step, release_inspection_hold};
use inspection_workflow::{OperationContext, QrBinding};
use serde_json::json;

#[test]
fn created_runs_start_active_at_scan_qr() {
  let mut state = InspectionState::new();
  let inputs = vec![input(ContainerType::Drum, 0), input(ContainerType::Tote, 5)];
  let created = create_inspection_runs(&mut state, &inputs, &ctx()).unwrap();
  assert_eq!(created.len(), 2);
  assert_eq!(created[0].container_count, 1);
  assert_eq!(created[1].container_count, 5);
  for run in &created {
    assert_eq!(run.status(), RunStatus::Active);
    assert_eq!(run.current_step_id, StepId::ScanQr);
    assert!(run.steps.is_empty() && run.history.is_empty());
  }
  assert_eq!(state.totals().runs_created, 2);
  assert_eq!(state.run_order().len(), 2);

  // sin deduplicacion: repetir la llamada crea otros dos runs
  create_inspection_runs(&mut state, &inputs, &ctx()).unwrap();
  assert_eq!(state.len(), 4);
  assert_eq!(state.totals().runs_created, 4);

  assert!(matches!(create_inspection_runs(&mut state, &[], &ctx()), Err(InspectionError::Validation(_))));
}

#[test]
fn out_of_sequence_step_is_illegal() {
  let (mut state, id) = state_with_run(1);
  let before = state.clone();
  let err = record_step(&mut state, &id, StepId::VerifyProductLabel, &product_label(true), StepOutcome::Pass, &ctx())
    .unwrap_err();
  assert!(matches!(err, InspectionError::IllegalTransition(_)));
  assert_eq!(state, before);
}

#[test]
fn invalid_payload_is_rejected_before_mutation() {
  let (mut state, id) = state_with_run(1);
  let before = state.clone();
  let bad = json!({"qrValue": "", "qrValidated": true, "validatedAt": "2025-03-01T08:00:00Z"});
  let err = record_step(&mut state, &id, StepId::ScanQr, &bad, StepOutcome::Pass, &ctx()).unwrap_err();
  assert!(matches!(err, InspectionError::Validation(_)));
  assert_eq!(state, before);
}

#[test]
fn pass_advances_and_history_is_redacted() {
  let (mut state, id) = state_with_run(2);
  advance_to(&mut state, &id, StepId::VerifyPackingLabel);
  let run = record_step(&mut state, &id, StepId::VerifyPackingLabel, &packing_label(true), StepOutcome::Pass, &ctx())
    .unwrap();
  assert_eq!(run.current_step_id, StepId::VerifyProductLabel);
  assert_eq!(run.status(), RunStatus::Active);
  assert_eq!(run.history.len(), 3);

  let entry = run.history.last().unwrap();
  assert_eq!(entry.step_id, StepId::VerifyPackingLabel);
  assert_eq!(entry.kind, HistoryKind::Step);
  assert_eq!(entry.payload["photoCount"], json!(1));
  assert_eq!(entry.payload["photos"][0], json!({"id": "ph-1", "name": "etiqueta.jpg", "hasUrl": true}));
  // el payload completo queda en steps
  let stored = run.steps.get(StepId::VerifyPackingLabel).unwrap().to_json();
  assert_eq!(stored["photos"][0]["url"], json!("https://files/ph-1"));
}

#[test]
fn gate_fail_then_pass_policy() {
  let (mut state, id) = state_with_run(1);
  advance_to(&mut state, &id, StepId::VerifyPackingLabel);

  let run = record_step(&mut state, &id, StepId::VerifyPackingLabel, &packing_label(false), StepOutcome::Fail, &ctx())
    .unwrap();
  assert_eq!(run.status(), RunStatus::NeedsReverify);
  assert_eq!(run.current_step_id, StepId::VerifyPackingLabel);

  let run = record_step(&mut state, &id, StepId::VerifyPackingLabel, &packing_label(true), StepOutcome::Pass, &ctx())
    .unwrap();
  assert_eq!(run.status(), RunStatus::Active);
  assert_eq!(run.current_step_id, StepId::VerifyProductLabel);
  assert!(state.verify_invariants().is_empty());
}

#[test]
fn explicit_outcome_must_agree_with_checklist() {
  let (mut state, id) = state_with_run(1);
  advance_to(&mut state, &id, StepId::VerifyProductLabel);
  let err = record_step(&mut state, &id, StepId::VerifyProductLabel, &product_label(false), StepOutcome::Pass, &ctx())
    .unwrap_err();
  assert!(matches!(err, InspectionError::Validation(_)));

  // HOLD se admite aunque el checklist falle
  let run = record_step(&mut state, &id, StepId::VerifyProductLabel, &product_label(false), StepOutcome::Hold, &ctx())
    .unwrap();
  assert_eq!(run.status(), RunStatus::Hold);
  assert_eq!(run.current_step_id, StepId::VerifyProductLabel);
  assert_eq!(state.totals().runs_on_hold, 1);
}

#[test]
fn fail_on_non_gate_step_is_invalid() {
  assert!(matches!(compute_run_status_after_step(StepId::InspectionInfo, StepOutcome::Fail),
                   Err(InspectionError::Validation(_))));
  let t = compute_run_status_after_step(StepId::FinalReview, StepOutcome::Pass).unwrap();
  assert_eq!(t.status, RunStatus::Completed);
  assert_eq!(t.current_step_id, StepId::FinalReview);
}

#[test]
fn final_review_completes_and_workspace_completion_follows() {
  let mut state = InspectionState::new();
  let created =
    create_inspection_runs(&mut state, &[input(ContainerType::Pail, 1), input(ContainerType::Pail, 1)], &ctx()).unwrap();
  let (a, b) = (created[0].id.clone(), created[1].id.clone());

  advance_to(&mut state, &a, StepId::FinalReview);
  assert!(record_step(&mut state, &a, StepId::FinalReview, &final_review(false), StepOutcome::Pass, &ctx()).is_err());
  complete(&mut state, &a);
  assert_eq!(state.run(&a).unwrap().status(), RunStatus::Completed);
  assert_eq!(state.run(&a).unwrap().current_step_id, StepId::FinalReview);
  assert!(state.completed_at().is_none());

  cancel_inspection_run(&mut state, &b, "contenedor dañado", &ctx()).unwrap();
  assert!(state.completed_at().is_some());
  assert_eq!(state.completed_by(), Some("inspector@cruz"));
  assert_eq!(state.totals().runs_completed, 1);

  // terminal: no mas pasos
  let err = record_step(&mut state, &a, StepId::FinalReview, &final_review(true), StepOutcome::Pass, &ctx())
    .unwrap_err();
  assert!(matches!(err, InspectionError::IllegalTransition(_)));

  create_inspection_runs(&mut state, &[input(ContainerType::Pail, 1)], &ctx()).unwrap();
  assert!(state.completed_at().is_none());
  assert!(state.completed_by().is_none());
}

#[test]
fn hold_and_release_keep_current_step() {
  let (mut state, id) = state_with_run(1);
  advance_to(&mut state, &id, StepId::InspectionInfo);

  let run = hold_inspection_run(&mut state, &id, Some("  falta etiqueta  "), &ctx()).unwrap();
  assert_eq!(run.status(), RunStatus::Hold);
  assert_eq!(run.metadata_str("holdReason"), Some("falta etiqueta"));
  assert_eq!(run.metadata_str("holdSetBy"), Some("inspector@cruz"));
  assert_eq!(state.totals().runs_on_hold, 1);

  let released = release_inspection_hold(&mut state, &id, &ctx()).unwrap();
  assert_eq!(released.status(), RunStatus::Active);
  assert_eq!(released.current_step_id, StepId::InspectionInfo);
  assert!(released.metadata.contains_key("holdReleasedAt"));
  assert_eq!(state.totals().runs_on_hold, 0);

  // release sin hold no cambia nada
  let before = state.clone();
  release_inspection_hold(&mut state, &id, &ctx()).unwrap();
  assert_eq!(state, before);
}

#[test]
fn recording_on_held_run_reactivates_it() {
  let (mut state, id) = state_with_run(1);
  hold_inspection_run(&mut state, &id, None, &ctx()).unwrap();
  assert_eq!(state.run(&id).unwrap().metadata.get("holdReason"), Some(&serde_json::Value::Null));
  let run = record_step(&mut state, &id, StepId::ScanQr, &scan_qr(), StepOutcome::Pass, &ctx()).unwrap();
  assert_eq!(run.status(), RunStatus::Active);
  assert_eq!(state.totals().runs_on_hold, 0);
}

#[test]
fn hold_on_terminal_run_is_illegal() {
  let (mut state, id) = state_with_run(1);
  complete(&mut state, &id);
  let before = state.clone();
  assert!(matches!(hold_inspection_run(&mut state, &id, Some("x"), &ctx()),
                   Err(InspectionError::IllegalTransition(_))));
  assert_eq!(state, before);
}

#[test]
fn cancel_requires_reason_and_accepts_completed_runs() {
  let (mut state, id) = state_with_run(1);
  assert!(matches!(cancel_inspection_run(&mut state, &id, "   ", &ctx()), Err(InspectionError::Validation(_))));

  complete(&mut state, &id);
  assert_eq!(state.totals().runs_completed, 1);
  let run = cancel_inspection_run(&mut state, &id, "pedido anulado", &ctx()).unwrap();
  assert_eq!(run.status(), RunStatus::Canceled);
  assert_eq!(run.cancel_reason(), Some("pedido anulado"));
  assert_eq!(run.metadata_str("canceledFromStatus"), Some("completed"));
  assert_eq!(state.totals().runs_completed, 0);
}

#[test]
fn second_cancel_keeps_first_cancellation() {
  let (mut state, id) = state_with_run(1);
  advance_to(&mut state, &id, StepId::VerifyPackingLabel);
  let first = cancel_inspection_run(&mut state, &id, "pedido anulado", &ctx()).unwrap();

  let later = OperationContext::at("supervisor@cruz", first.updated_at + chrono::Duration::minutes(5));
  let again = cancel_inspection_run(&mut state, &id, "otro motivo", &later).unwrap();
  assert_eq!(again.status(), RunStatus::Canceled);
  assert_eq!(again.cancel_reason(), Some("pedido anulado"));
  assert_eq!(again.metadata_str("canceledFromStatus"), Some("active"));
  assert_eq!(again.metadata_str("canceledBy"), Some("inspector@cruz"));
  assert_eq!(again.metadata.get("canceledAt"), first.metadata.get("canceledAt"));
  assert_eq!(again.updated_at, first.updated_at);
  assert!(state.verify_invariants().is_empty());
}

#[test]
fn scan_step_binds_qr_identity() {
  let (mut state, id) = state_with_run(1);
  let payload = json!({
    "qrValue": " QR-0001 ",
    "qrValidated": true,
    "validatedAt": "2025-03-01T08:00:00Z",
    "qrCodeId": "qid",
    "shortCode": "S1"
  });
  let run = record_step(&mut state, &id, StepId::ScanQr, &payload, StepOutcome::Pass, &ctx()).unwrap();
  assert_eq!(run.qr_value.as_deref(), Some("QR-0001"));
  assert_eq!(run.qr_code_id.as_deref(), Some("qid"));
  assert_eq!(run.short_code.as_deref(), Some("S1"));
  assert_eq!(run.current_step_id, StepId::InspectionInfo);
  assert_eq!(state.run(&id).unwrap().qr_value.as_deref(), Some("QR-0001"));
}

#[test]
fn bind_qr_acts_as_scan_step() {
  let (mut state, id) = state_with_run(1);
  let qr = QrBinding { qr_value: " QR-777 ".into(), qr_code_id: Some("qr-id-1".into()), short_code: Some("A7".into()) };
  let run = bind_run_to_qr(&mut state, &id, &qr, &ctx()).unwrap();
  assert_eq!(run.qr_value.as_deref(), Some("QR-777"));
  assert_eq!(run.short_code.as_deref(), Some("A7"));
  assert_eq!(run.current_step_id, StepId::InspectionInfo);
  assert_eq!(run.status(), RunStatus::Active);
  assert!(run.steps.contains(StepId::ScanQr));
  assert_eq!(run.history.last().unwrap().kind, HistoryKind::QrBound);

  // re-vincular mas adelante solo reemplaza el QR
  advance_to(&mut state, &id, StepId::VerifyPackingLabel);
  hold_inspection_run(&mut state, &id, Some("espera"), &ctx()).unwrap();
  let qr2 = QrBinding { qr_value: "QR-778".into(), qr_code_id: None, short_code: None };
  let run = bind_run_to_qr(&mut state, &id, &qr2, &ctx()).unwrap();
  assert_eq!(run.qr_value.as_deref(), Some("QR-778"));
  assert_eq!(run.current_step_id, StepId::VerifyPackingLabel);
  assert_eq!(run.status(), RunStatus::Hold);
  assert!(state.verify_invariants().is_empty());

  let blank = QrBinding { qr_value: "  ".into(), qr_code_id: None, short_code: None };
  assert!(matches!(bind_run_to_qr(&mut state, &id, &blank, &ctx()), Err(InspectionError::Validation(_))));
}

#[test]
fn unknown_run_is_not_found() {
  let (mut state, _) = state_with_run(1);
  let ghost = inspection_domain::create_run_id();
  assert!(matches!(record_step(&mut state, &ghost, StepId::ScanQr, &scan_qr(), StepOutcome::Pass, &ctx()),
                   Err(InspectionError::NotFound(_))));
  assert!(matches!(hold_inspection_run(&mut state, &ghost, None, &ctx()), Err(InspectionError::NotFound(_))));
}
