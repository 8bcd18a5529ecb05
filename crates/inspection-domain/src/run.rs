// run.rs
use crate::{InspectionError, StepId, StepOutcome, StepPayload};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Mapa libre de procedencia (motivos de hold/cancel, linaje de split/group).
pub type RunMetadata = IndexMap<String, JsonValue>;

/// Identificador opaco de un run.
///
/// Los ids nuevos son UUIDv7 (ordenables en el tiempo); los documentos
/// antiguos pueden traer cualquier string y se respetan tal cual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
  pub fn new(raw: impl Into<String>) -> Self {
    Self(raw.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// Genera un id de run unico y ordenable cronologicamente.
pub fn create_run_id() -> RunId {
  RunId(Uuid::now_v7().to_string())
}

/// Id para entradas de historial.
pub fn create_history_id() -> String {
  Uuid::now_v7().to_string()
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for RunId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl From<String> for RunId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
  Drum,
  Tote,
  Pallet,
  Pail,
  Carboy,
  Cylinder,
  Bag,
  Case,
  Other,
}

impl ContainerType {
  pub fn as_str(self) -> &'static str {
    match self {
      ContainerType::Drum => "drum",
      ContainerType::Tote => "tote",
      ContainerType::Pallet => "pallet",
      ContainerType::Pail => "pail",
      ContainerType::Carboy => "carboy",
      ContainerType::Cylinder => "cylinder",
      ContainerType::Bag => "bag",
      ContainerType::Case => "case",
      ContainerType::Other => "other",
    }
  }
}

impl fmt::Display for ContainerType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ContainerType {
  type Err = InspectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "drum" => Ok(ContainerType::Drum),
      "tote" => Ok(ContainerType::Tote),
      "pallet" => Ok(ContainerType::Pallet),
      "pail" => Ok(ContainerType::Pail),
      "carboy" => Ok(ContainerType::Carboy),
      "cylinder" => Ok(ContainerType::Cylinder),
      "bag" => Ok(ContainerType::Bag),
      "case" | "box" => Ok(ContainerType::Case),
      "other" => Ok(ContainerType::Other),
      other => Err(InspectionError::Validation(format!("Tipo de contenedor desconocido: {}", other))),
    }
  }
}

/// Estado de ciclo de vida del run, distinto del paso actual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Active,
  Hold,
  Completed,
  Canceled,
  NeedsReverify,
}

impl RunStatus {
  pub const ALL: [RunStatus; 5] =
    [RunStatus::Active, RunStatus::Hold, RunStatus::Completed, RunStatus::Canceled, RunStatus::NeedsReverify];

  /// `completed` y `canceled` no admiten mas pasos.
  pub fn is_terminal(self) -> bool {
    matches!(self, RunStatus::Completed | RunStatus::Canceled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RunStatus::Active => "active",
      RunStatus::Hold => "hold",
      RunStatus::Completed => "completed",
      RunStatus::Canceled => "canceled",
      RunStatus::NeedsReverify => "needs_reverify",
    }
  }
}

impl Default for RunStatus {
  fn default() -> Self {
    RunStatus::Active
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RunStatus {
  type Err = InspectionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    RunStatus::ALL.iter()
                  .copied()
                  .find(|st| st.as_str() == s.trim())
                  .ok_or_else(|| InspectionError::Validation(format!("Estado desconocido: {}", s)))
  }
}

/// Tipo de entrada de historial. Documentos antiguos no traen el campo y se
/// leen como `Step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
  #[default]
  Step,
  QrBound,
  Grouped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepHistoryEntry {
  pub id: String,
  pub run_id: RunId,
  pub step_id: StepId,
  pub outcome: StepOutcome,
  #[serde(default)]
  pub kind: HistoryKind,
  pub recorded_at: DateTime<Utc>,
  pub recorded_by: String,
  /// Copia redactada del payload.
  #[serde(default)]
  pub payload: JsonValue,
}

/// Mapa parcial `StepId -> StepPayload`, ordenado segun el flujo.
///
/// Se serializa como objeto `{ "scan_qr": {...}, ... }`; al leer, la clave
/// decide el tipo del payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap(BTreeMap<StepId, StepPayload>);

impl StepMap {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  pub fn get(&self, step_id: StepId) -> Option<&StepPayload> {
    self.0.get(&step_id)
  }

  pub fn contains(&self, step_id: StepId) -> bool {
    self.0.contains_key(&step_id)
  }

  pub fn insert(&mut self, payload: StepPayload) -> Option<StepPayload> {
    self.0.insert(payload.step_id(), payload)
  }

  pub fn remove(&mut self, step_id: StepId) -> Option<StepPayload> {
    self.0.remove(&step_id)
  }

  pub fn keys(&self) -> impl Iterator<Item = StepId> + '_ {
    self.0.keys().copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&StepId, &StepPayload)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Pasos registrados estrictamente despues de `step_id`.
  pub fn steps_after(&self, step_id: StepId) -> Vec<StepId> {
    self.0.keys().copied().filter(|s| *s > step_id).collect()
  }
}

impl Serialize for StepMap {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(self.0.iter())
  }
}

impl<'de> Deserialize<'de> for StepMap {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = BTreeMap::<StepId, JsonValue>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (step_id, value) in raw {
      let payload = StepPayload::from_json(step_id, &value).map_err(D::Error::custom)?;
      out.insert(step_id, payload);
    }
    Ok(Self(out))
  }
}

/// Datos de entrada para crear un run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRunInput {
  #[serde(default)]
  pub item_key: Option<String>,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(default)]
  pub material_name: Option<String>,
  pub container_type: ContainerType,
  /// Valores menores que 1 se elevan a 1.
  pub container_count: i64,
}

/// Una unidad de inspeccion: un lote de contenedores identicos que recorre
/// los seis pasos.
///
/// `status` solo puede cambiarse mediante el agregador de totales
/// (`totals::apply_status_transition`); fuera del crate es de solo lectura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRun {
  pub id: RunId,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qr_code_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qr_value: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub short_code: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub material_name: Option<String>,
  pub container_type: ContainerType,
  pub container_count: u32,
  pub current_step_id: StepId,
  pub(crate) status: RunStatus,
  #[serde(default)]
  pub steps: StepMap,
  #[serde(default)]
  pub history: Vec<StepHistoryEntry>,
  #[serde(default)]
  pub metadata: RunMetadata,
}

impl InspectionRun {
  /// Run recien nacido: `active`, esperando `scan_qr`, sin pasos ni
  /// historial.
  pub fn new(id: RunId, input: &NewRunInput, now: DateTime<Utc>) -> Self {
    let count = input.container_count.clamp(1, u32::MAX as i64) as u32;
    Self { id,
           created_at: now,
           updated_at: now,
           qr_code_id: None,
           qr_value: None,
           short_code: None,
           item_key: input.item_key.clone(),
           sku: input.sku.clone(),
           material_name: input.material_name.clone(),
           container_type: input.container_type,
           container_count: count,
           current_step_id: StepId::ScanQr,
           status: RunStatus::Active,
           steps: StepMap::new(),
           history: Vec::new(),
           metadata: RunMetadata::new() }
  }

  pub fn status(&self) -> RunStatus {
    self.status
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  pub fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }

  /// Copia explicita para `split`: id y timestamps nuevos, `quantity`
  /// contenedores, metadata fresca con el enlace al original. Pasos,
  /// historial, estado y paso actual se heredan.
  pub fn split_clone(&self, new_id: RunId, quantity: u32, now: DateTime<Utc>) -> Self {
    let mut metadata = RunMetadata::new();
    metadata.insert("splitFromRunId".into(), JsonValue::String(self.id.to_string()));
    metadata.insert("splitAt".into(), JsonValue::String(now.to_rfc3339()));
    Self { id: new_id,
           created_at: now,
           updated_at: now,
           qr_code_id: self.qr_code_id.clone(),
           qr_value: self.qr_value.clone(),
           short_code: self.short_code.clone(),
           item_key: self.item_key.clone(),
           sku: self.sku.clone(),
           material_name: self.material_name.clone(),
           container_type: self.container_type,
           container_count: quantity,
           current_step_id: self.current_step_id,
           status: self.status,
           steps: self.steps.clone(),
           history: self.history.clone(),
           metadata }
  }

  pub fn metadata_str(&self, key: &str) -> Option<&str> {
    self.metadata.get(key).and_then(|v| v.as_str())
  }

  /// Motivo de cancelacion no vacio, si existe.
  pub fn cancel_reason(&self) -> Option<&str> {
    self.metadata_str("cancelReason").filter(|r| !r.trim().is_empty())
  }

  /// `true` si hay datos de pasos posteriores al paso actual.
  pub fn has_future_steps(&self) -> bool {
    !self.steps.steps_after(self.current_step_id).is_empty()
  }
}
