use proptest::prelude::*;

mod common;

use common::*;
use inspection_domain::{normalize_with_report, ContainerType, InspectionState, RunId, RunStatus, StepId, StepOutcome};
use inspection_workflow::engine::{bind_run_to_qr, cancel_inspection_run, create_inspection_runs,
                                  group_inspection_runs, hold_inspection_run, record_step, release_inspection_hold,
                                  split_inspection_run};
use inspection_workflow::QrBinding;

/// Operacion abstracta; los indices se resuelven modulo la cantidad de
/// runs vivos al momento de aplicarla.
#[derive(Debug, Clone)]
enum Op {
  Create(u8),
  Pass(usize),
  Fail(usize),
  HoldStep(usize),
  Hold(usize),
  Release(usize),
  Cancel(usize),
  Bind(usize),
  Split(usize, i64),
  Group(usize, usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
  prop_oneof![
    (1u8..4).prop_map(Op::Create),
    any::<usize>().prop_map(Op::Pass),
    any::<usize>().prop_map(Op::Fail),
    any::<usize>().prop_map(Op::HoldStep),
    any::<usize>().prop_map(Op::Hold),
    any::<usize>().prop_map(Op::Release),
    any::<usize>().prop_map(Op::Cancel),
    any::<usize>().prop_map(Op::Bind),
    (any::<usize>(), -1i64..5).prop_map(|(i, q)| Op::Split(i, q)),
    (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Group(a, b)),
  ]
}

fn pick(state: &InspectionState, i: usize) -> Option<RunId> {
  let order = state.run_order();
  if order.is_empty() {
    None
  } else {
    Some(order[i % order.len()].clone())
  }
}

/// Aplica la operacion; los rechazos del motor se ignoran, pero deben dejar
/// el estado intacto.
fn apply(state: &mut InspectionState, op: &Op) {
  let before = state.clone();
  let ctx = ctx();
  let result = match op {
    Op::Create(n) => {
      let inputs: Vec<_> = (0..*n).map(|i| input(ContainerType::Drum, i64::from(i) + 1)).collect();
      create_inspection_runs(state, &inputs, &ctx).map(|_| ())
    }
    Op::Pass(i) | Op::Fail(i) | Op::HoldStep(i) => {
      let Some(id) = pick(state, *i) else { return };
      let step = state.run(&id).map(|r| r.current_step_id).unwrap_or(StepId::ScanQr);
      let (payload, outcome) = match op {
        Op::Fail(_) if step == StepId::VerifyPackingLabel => (packing_label(false), StepOutcome::Fail),
        Op::Fail(_) if step == StepId::VerifyProductLabel => (product_label(false), StepOutcome::Fail),
        Op::Fail(_) => (passing_payload(step), StepOutcome::Fail),
        Op::HoldStep(_) => (passing_payload(step), StepOutcome::Hold),
        _ => (passing_payload(step), StepOutcome::Pass),
      };
      record_step(state, &id, step, &payload, outcome, &ctx).map(|_| ())
    }
    Op::Hold(i) => {
      let Some(id) = pick(state, *i) else { return };
      hold_inspection_run(state, &id, Some("prop"), &ctx).map(|_| ())
    }
    Op::Release(i) => {
      let Some(id) = pick(state, *i) else { return };
      release_inspection_hold(state, &id, &ctx).map(|_| ())
    }
    Op::Cancel(i) => {
      let Some(id) = pick(state, *i) else { return };
      cancel_inspection_run(state, &id, "prop", &ctx).map(|_| ())
    }
    Op::Bind(i) => {
      let Some(id) = pick(state, *i) else { return };
      let qr = QrBinding { qr_value: format!("QR-{}", i % 7), qr_code_id: None, short_code: None };
      bind_run_to_qr(state, &id, &qr, &ctx).map(|_| ())
    }
    Op::Split(i, q) => {
      let Some(id) = pick(state, *i) else { return };
      split_inspection_run(state, &id, *q, &ctx).map(|_| ())
    }
    Op::Group(a, b) => {
      let (Some(x), Some(y)) = (pick(state, *a), pick(state, *b)) else { return };
      group_inspection_runs(state, &[x, y], &ctx).map(|_| ())
    }
  };
  if result.is_err() {
    assert_eq!(*state, before, "una operación rechazada modificó el estado: {:?}", op);
  }
}

fn check_invariants(state: &InspectionState) -> Result<(), TestCaseError> {
  let violations = state.verify_invariants();
  prop_assert!(violations.is_empty(), "{:?}", violations);
  let completed = state.runs().filter(|r| r.status() == RunStatus::Completed).count() as u64;
  let held = state.runs().filter(|r| r.status() == RunStatus::Hold).count() as u64;
  prop_assert_eq!(state.totals().runs_completed, completed);
  prop_assert_eq!(state.totals().runs_on_hold, held);
  prop_assert!(state.totals().runs_created >= state.len() as u64);
  let all_terminal = !state.is_empty()
                     && state.runs().all(|r| {
                                      r.status() == RunStatus::Completed
                                      || (r.status() == RunStatus::Canceled && r.cancel_reason().is_some())
                                    });
  prop_assert_eq!(state.completed_at().is_some(), all_terminal);
  Ok(())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn invariants_hold_for_any_operation_sequence(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut state = InspectionState::new();
        for op in &ops {
            apply(&mut state, op);
            check_invariants(&state)?;
        }
    }

    #[test]
    fn saved_state_normalizes_without_repairs(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut state = InspectionState::new();
        for op in &ops {
            apply(&mut state, op);
        }
        let saved = state.to_json().unwrap();
        let (reloaded, report) = normalize_with_report(&saved);
        prop_assert!(report.is_clean(), "{:?}", report.repairs);
        prop_assert_eq!(reloaded, state);
    }
}
