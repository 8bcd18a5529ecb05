//! Crate `inspection-store`: contrato de almacenamiento de workspaces
//!
//! Define los tipos compartidos (`ModuleSnapshot`, `WorkspaceMeta`,
//! `ActivityRecord`), el contrato de persistencia `WorkspaceRepository`, los
//! colaboradores externos (`AuditSink`, `RevalidationHook`) e
//! implementaciones en memoria útiles para pruebas.
//!
//! Diseño resumido:
//! - Un documento JSON por módulo dentro de cada workspace; el crate no
//!   interpreta su contenido.
//! - Locking optimista: cada workspace tiene una `version` que sube con cada
//!   escritura; `save_module` con `expected_version` devuelve
//!   `PersistResult::Conflict` si otro escritor se adelantó.
//!
//! Ejemplo rápido:
//! ```rust
//! use inspection_store::{InMemoryWorkspaceRepository, WorkspaceRepository, INSPECTION_MODULE};
//! let repo = InMemoryWorkspaceRepository::new();
//! repo.create_workspace("ws-1").unwrap();
//! let snap = repo.load_module("ws-1", INSPECTION_MODULE).unwrap();
//! assert!(snap.state.is_null());
//! ```
pub mod domain;
pub mod errors;
pub mod repository;
pub mod stubs;

pub use domain::*;
pub use errors::*;
pub use repository::*;
pub use stubs::*;
