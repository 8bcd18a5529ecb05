//! inspection-domain: modelo del flujo de inspeccion de contenedores.
//!
//! Define los seis pasos y sus payloads (con el validador unico
//! `validate_step_payload`), el run de inspeccion, el contenedor de estado
//! del workspace con su normalizacion, y el agregador de totales que es la
//! unica via para cambiar el estado de un run.
mod errors;
mod normalize;
mod run;
mod state;
mod step_id;
mod step_payload;
pub mod totals;

pub use errors::{InspectionError, Result};
pub use normalize::{normalize_inspection_state, normalize_with_report, NormalizationReport};
pub use run::{create_history_id, create_run_id, ContainerType, HistoryKind, InspectionRun, NewRunInput, RunId,
              RunMetadata, RunStatus, StepHistoryEntry, StepMap};
pub use state::{InspectionState, StateSummary};
pub use step_id::{get_next_step_id, get_step_index, StepId, StepOutcome};
pub use step_payload::{redact_payload_json, validate_step_payload, Approvals, FinalReviewPayload, GateOutcome,
                       InspectionInfoPayload, LotEntry, LotNumberPayload, PackingLabelPayload, PhotoRef,
                       ProductLabelPayload, ScanQrPayload, StepPayload};
pub use totals::{apply_status_transition, refresh_workspace_completion, Totals};
