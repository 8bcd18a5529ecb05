//! Persistencia Diesel para el trait `WorkspaceRepository`.
//! Este archivo expone el módulo `schema` y reexporta el repositorio y el
//! sink de auditoría. La implementación detallada está en
//! `workspace_persistence.rs`.

pub mod schema;
mod workspace_persistence;

#[cfg(not(feature = "pg"))]
pub use workspace_persistence::new_sqlite_for_test;
pub use workspace_persistence::{new_from_env, DieselAuditSink, DieselWorkspaceRepository, PersistenceError,
                                DEFAULT_SQLITE_URL, MIGRATIONS};
