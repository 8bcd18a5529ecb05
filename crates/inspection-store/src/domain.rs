// Archivo: domain.rs
// Propósito: tipos compartidos entre el contrato de persistencia y sus
// implementaciones: snapshot de un módulo, metadatos del workspace,
// resultado de persistencia y registro de actividad.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Clave bajo la que vive el estado de inspección dentro del workspace.
pub const INSPECTION_MODULE: &str = "inspection";

/// Estados de módulo de un workspace (`nombre -> JSON`).
pub type ModuleStates = IndexMap<String, JsonValue>;

/// Metadatos ligeros de un workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    pub id: String,
    /// Versión a nivel workspace; sube con cada escritura de cualquier módulo.
    pub version: i64,
    /// Módulos con estado persistido.
    pub modules: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

/// Estado crudo de un módulo tal como se leyó, junto con la versión del
/// workspace en ese momento.
///
/// `state` es `Null` si el módulo nunca se escribió.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub workspace_id: String,
    pub module: String,
    pub state: JsonValue,
    pub version: i64,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ModuleSnapshot {
    /// Huella blake3 (hex) del estado leído.
    pub fn digest(&self) -> String {
        state_digest(&self.state)
    }
}

/// Huella blake3 (hex) de un documento JSON.
pub fn state_digest(state: &JsonValue) -> String {
    blake3::hash(state.to_string().as_bytes()).to_hex().to_string()
}

/// Resultado de una escritura con control optimista.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistResult {
    /// Escritura aplicada; `new_version` es la versión resultante.
    Ok { new_version: i64 },
    /// La versión esperada no coincide; no se escribió nada.
    Conflict,
}

/// Entrada del registro de actividad de un workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub workspace_id: String,
    pub activity_type: String,
    pub performed_by: String,
    pub module: String,
    pub metadata: JsonValue,
    pub recorded_at: DateTime<Utc>,
}
