mod common;

use common::*;
use inspection_domain::{ContainerType, HistoryKind, InspectionError, InspectionState, RunStatus, StepId, StepOutcome};
use inspection_workflow::engine::{create_inspection_runs, group_inspection_runs, hold_inspection_run, record_step,
                                  split_inspection_run};
use serde_json::json;

#[test]
fn split_then_group_round_trip() {
  let (mut state, original) = state_with_run(4);
  advance_to(&mut state, &original, StepId::VerifyPackingLabel);
  let history_len = state.run(&original).unwrap().history.len();

  let clone = split_inspection_run(&mut state, &original, 1, &ctx()).unwrap();
  let orig = state.run(&original).unwrap();
  assert_eq!(orig.container_count, 3);
  assert_eq!(clone.container_count, 1);
  assert_eq!(clone.current_step_id, orig.current_step_id);
  assert_eq!(clone.status(), orig.status());
  assert_eq!(clone.steps, orig.steps);
  assert_eq!(clone.history.len(), history_len);
  assert_eq!(clone.metadata_str("splitFromRunId"), Some(original.as_str()));
  assert_eq!(state.run_order(), &[original.clone(), clone.id.clone()]);
  assert_eq!(state.totals().runs_created, 2);

  let survivor = group_inspection_runs(&mut state, &[original.clone(), clone.id.clone()], &ctx()).unwrap();
  assert_eq!(survivor.id, original);
  assert_eq!(survivor.container_count, 4);
  // ambos historiales mas la entrada sintetica del grupo
  assert_eq!(survivor.history.len(), 2 * history_len + 1);
  assert_eq!(survivor.history.last().unwrap().kind, HistoryKind::Grouped);
  assert!(survivor.history.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
  assert_eq!(survivor.metadata.get("groupedRunIds"), Some(&json!([clone.id.as_str()])));

  assert_eq!(state.len(), 1);
  assert_eq!(state.run_order(), &[original]);
  assert_eq!(state.totals().runs_created, 2);
  assert!(state.verify_invariants().is_empty());
}

#[test]
fn split_inserts_after_original_and_inherits_hold() {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state,
                                       &[input(ContainerType::Tote, 5), input(ContainerType::Tote, 1)],
                                       &ctx()).unwrap();
  let (a, b) = (created[0].id.clone(), created[1].id.clone());
  hold_inspection_run(&mut state, &a, Some("revisión"), &ctx()).unwrap();

  let clone = split_inspection_run(&mut state, &a, 2, &ctx()).unwrap();
  assert_eq!(state.run_order(), &[a.clone(), clone.id.clone(), b]);
  assert_eq!(clone.status(), RunStatus::Hold);
  assert_eq!(state.totals().runs_on_hold, 2);
  // metadata fresca: el motivo de hold no se copia
  assert!(clone.metadata_str("holdReason").is_none());
  assert!(state.verify_invariants().is_empty());
}

#[test]
fn split_rejects_out_of_range_quantities() {
  let (mut state, single) = state_with_run(1);
  assert!(matches!(split_inspection_run(&mut state, &single, 1, &ctx()), Err(InspectionError::Validation(_))));

  let (mut state, id) = state_with_run(3);
  let before = state.clone();
  for q in [0, 3, 4, -1] {
    assert!(matches!(split_inspection_run(&mut state, &id, q, &ctx()), Err(InspectionError::Validation(_))));
  }
  assert_eq!(state, before);
  assert!(split_inspection_run(&mut state, &id, 2, &ctx()).is_ok());
}

#[test]
fn group_rejects_mismatched_runs_without_changes() {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state,
                                       &[input(ContainerType::Drum, 1), input(ContainerType::Drum, 2)],
                                       &ctx()).unwrap();
  let (a, b) = (created[0].id.clone(), created[1].id.clone());
  record_step(&mut state, &a, StepId::ScanQr, &scan_qr(), StepOutcome::Pass, &ctx()).unwrap();

  let before = state.clone();
  let err = group_inspection_runs(&mut state, &[a.clone(), b.clone()], &ctx()).unwrap_err();
  assert!(matches!(err, InspectionError::Validation(_)));
  assert_eq!(state, before);

  // mismo paso actual pero datos de paso distintos
  let other_qr = json!({"qrValue": "QR-9999", "qrValidated": true, "validatedAt": "2025-03-01T08:00:00Z"});
  record_step(&mut state, &b, StepId::ScanQr, &other_qr, StepOutcome::Pass, &ctx()).unwrap();
  let before = state.clone();
  assert!(matches!(group_inspection_runs(&mut state, &[a.clone(), b.clone()], &ctx()),
                   Err(InspectionError::Validation(_))));
  assert_eq!(state, before);
}

#[test]
fn group_rejects_different_container_type_and_bad_id_lists() {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state,
                                       &[input(ContainerType::Drum, 1), input(ContainerType::Bag, 1)],
                                       &ctx()).unwrap();
  let (a, b) = (created[0].id.clone(), created[1].id.clone());
  assert!(matches!(group_inspection_runs(&mut state, &[a.clone(), b], &ctx()), Err(InspectionError::Validation(_))));
  assert!(matches!(group_inspection_runs(&mut state, &[a.clone()], &ctx()), Err(InspectionError::Validation(_))));
  assert!(matches!(group_inspection_runs(&mut state, &[a.clone(), a.clone()], &ctx()),
                   Err(InspectionError::Validation(_))));
  let ghost = inspection_domain::create_run_id();
  assert!(matches!(group_inspection_runs(&mut state, &[a, ghost], &ctx()), Err(InspectionError::NotFound(_))));
}

#[test]
fn group_of_held_runs_decrements_hold_counter() {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state,
                                       &[input(ContainerType::Case, 1),
                                         input(ContainerType::Case, 1),
                                         input(ContainerType::Case, 1)],
                                       &ctx()).unwrap();
  let ids: Vec<_> = created.iter().map(|r| r.id.clone()).collect();
  for id in &ids {
    hold_inspection_run(&mut state, id, Some("cuarentena"), &ctx()).unwrap();
  }
  assert_eq!(state.totals().runs_on_hold, 3);

  let survivor = group_inspection_runs(&mut state, &ids, &ctx()).unwrap();
  assert_eq!(survivor.status(), RunStatus::Hold);
  assert_eq!(survivor.container_count, 3);
  assert_eq!(state.totals().runs_on_hold, 1);
  assert_eq!(state.totals().runs_created, 3);
  assert!(state.verify_invariants().is_empty());
}

#[test]
fn grouped_ids_accumulate_across_groups() {
  let mut state = InspectionState::new();
  let created = create_inspection_runs(&mut state,
                                       &[input(ContainerType::Pallet, 1),
                                         input(ContainerType::Pallet, 1),
                                         input(ContainerType::Pallet, 1)],
                                       &ctx()).unwrap();
  let ids: Vec<_> = created.iter().map(|r| r.id.clone()).collect();
  group_inspection_runs(&mut state, &[ids[1].clone(), ids[2].clone()], &ctx()).unwrap();
  let survivor = group_inspection_runs(&mut state, &[ids[0].clone(), ids[1].clone()], &ctx()).unwrap();
  assert_eq!(survivor.metadata.get("groupedRunIds"),
             Some(&json!([ids[1].as_str(), ids[2].as_str()])));
  assert_eq!(survivor.container_count, 3);
}
