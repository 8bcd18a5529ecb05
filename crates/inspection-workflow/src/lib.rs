//! inspection-workflow: motor y servicio del flujo de inspeccion
//!
//! `engine` contiene los mutadores puros (ciclo de vida y operaciones de
//! conjunto) sobre `inspection_domain::InspectionState`. `InspectionService`
//! los envuelve en el ciclo lectura-modificacion-escritura contra un
//! `inspection_store::WorkspaceRepository`, con auditoria y revalidacion.

pub mod config;
pub mod engine;
pub mod errors;
pub mod service;

pub use config::{AuditFailurePolicy, ConcurrencyPolicy, InspectionConfig};
pub use engine::{OperationContext, QrBinding, StepTransition};
pub use errors::WorkflowError;
pub use service::{into_action_result, ActionResult, ActivityType, InspectionService};
