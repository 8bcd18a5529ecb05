// step_payload.rs
//! Esquema de los seis payloads de paso y su validador.
//!
//! `validate_step_payload` es la unica puerta entre la entrada no confiable
//! (formularios, API) y el modelo de runs: parsea el candidato al tipo del
//! paso y aplica sus reglas de negocio.
use crate::{InspectionError, StepId, StepOutcome};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;

/// Resultado del checklist de un paso gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOutcome {
  Pass,
  Fail,
}

impl GateOutcome {
  pub fn from_checks(checks: &[bool]) -> Self {
    if checks.iter().all(|ok| *ok) {
      GateOutcome::Pass
    } else {
      GateOutcome::Fail
    }
  }

  pub fn as_step_outcome(self) -> StepOutcome {
    match self {
      GateOutcome::Pass => StepOutcome::Pass,
      GateOutcome::Fail => StepOutcome::Fail,
    }
  }
}

impl fmt::Display for GateOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.as_step_outcome().fmt(f)
  }
}

/// Referencia a una foto subida. El binario vive en el almacenamiento de
/// documentos; aqui solo se guarda la referencia.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanQrPayload {
  pub qr_value: String,
  pub qr_validated: bool,
  pub validated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qr_code_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub short_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionInfoPayload {
  pub order_number: String,
  /// `YYYY-MM-DD`
  pub date_performed: String,
  /// `HH:MM` o `HH:MM:SS`
  pub time_performed: String,
  pub inspector: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackingLabelPayload {
  pub ship_to_ok: bool,
  pub company_ok: bool,
  pub order_number_ok: bool,
  pub product_description_ok: bool,
  pub gate1_outcome: GateOutcome,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mismatch_reason: Option<String>,
  pub photos: Vec<PhotoRef>,
  pub completed_at: DateTime<Utc>,
}

impl PackingLabelPayload {
  pub fn derived_outcome(&self) -> GateOutcome {
    GateOutcome::from_checks(&[self.ship_to_ok, self.company_ok, self.order_number_ok, self.product_description_ok])
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLabelPayload {
  pub grade_ok: bool,
  pub un_ok: bool,
  pub pg_ok: bool,
  pub lid_ok: bool,
  pub ghs_ok: bool,
  pub gate2_outcome: GateOutcome,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub issue_reason: Option<String>,
  pub photos: Vec<PhotoRef>,
  pub completed_at: DateTime<Utc>,
}

impl ProductLabelPayload {
  pub fn derived_outcome(&self) -> GateOutcome {
    GateOutcome::from_checks(&[self.grade_ok, self.un_ok, self.pg_ok, self.lid_ok, self.ghs_ok])
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotEntry {
  pub id: String,
  pub lot_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotNumberPayload {
  pub lots: Vec<LotEntry>,
  pub same_for_all: bool,
  pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approvals {
  pub packing_label: bool,
  pub product_label: bool,
  pub lot_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReviewPayload {
  pub approvals: Approvals,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_notes: Option<String>,
  pub completed_at: DateTime<Utc>,
}

/// Union discriminada por `StepId`. La igualdad es estructural campo a
/// campo, independiente del orden de claves del JSON de origen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepPayload {
  ScanQr(ScanQrPayload),
  InspectionInfo(InspectionInfoPayload),
  VerifyPackingLabel(PackingLabelPayload),
  VerifyProductLabel(ProductLabelPayload),
  LotNumber(LotNumberPayload),
  FinalReview(FinalReviewPayload),
}

fn parse_shape<T: DeserializeOwned>(step_id: StepId, candidate: &JsonValue) -> Result<T, InspectionError> {
  if !candidate.is_object() {
    return Err(InspectionError::Validation(format!("El payload de {} debe ser un objeto", step_id)));
  }
  serde_json::from_value(candidate.clone()).map_err(|e| {
                                              InspectionError::Validation(format!("Payload inválido para {}: {}",
                                                                                  step_id, e))
                                            })
}

fn require_text(step_id: StepId, field: &str, value: &str) -> Result<(), InspectionError> {
  if value.trim().is_empty() {
    return Err(InspectionError::Validation(format!("{}: el campo '{}' es obligatorio", step_id, field)));
  }
  Ok(())
}

/// Un checklist en FAIL exige explicar el motivo.
fn check_fail_reason(step_id: StepId,
                     field: &str,
                     outcome: GateOutcome,
                     reason: Option<&str>)
                     -> Result<(), InspectionError> {
  if outcome == GateOutcome::Fail {
    require_text(step_id, field, reason.unwrap_or_default())?;
  }
  Ok(())
}

fn check_photos(step_id: StepId, photos: &[PhotoRef]) -> Result<(), InspectionError> {
  for photo in photos {
    require_text(step_id, "photos[].id", &photo.id)?;
  }
  Ok(())
}

fn check_gate(step_id: StepId, declared: GateOutcome, derived: GateOutcome) -> Result<(), InspectionError> {
  if declared != derived {
    return Err(InspectionError::Validation(format!("{}: el resultado declarado {} no coincide con el checklist ({})",
                                                   step_id, declared, derived)));
  }
  Ok(())
}

impl StepPayload {
  /// Parsea un payload ya persistido sin aplicar reglas de negocio.
  pub fn from_json(step_id: StepId, value: &JsonValue) -> Result<Self, InspectionError> {
    let payload = match step_id {
      StepId::ScanQr => StepPayload::ScanQr(parse_shape(step_id, value)?),
      StepId::InspectionInfo => StepPayload::InspectionInfo(parse_shape(step_id, value)?),
      StepId::VerifyPackingLabel => StepPayload::VerifyPackingLabel(parse_shape(step_id, value)?),
      StepId::VerifyProductLabel => StepPayload::VerifyProductLabel(parse_shape(step_id, value)?),
      StepId::LotNumber => StepPayload::LotNumber(parse_shape(step_id, value)?),
      StepId::FinalReview => StepPayload::FinalReview(parse_shape(step_id, value)?),
    };
    Ok(payload)
  }

  pub fn step_id(&self) -> StepId {
    match self {
      StepPayload::ScanQr(_) => StepId::ScanQr,
      StepPayload::InspectionInfo(_) => StepId::InspectionInfo,
      StepPayload::VerifyPackingLabel(_) => StepId::VerifyPackingLabel,
      StepPayload::VerifyProductLabel(_) => StepId::VerifyProductLabel,
      StepPayload::LotNumber(_) => StepId::LotNumber,
      StepPayload::FinalReview(_) => StepId::FinalReview,
    }
  }

  /// Resultado implicito del checklist, solo para pasos gate.
  pub fn gate_outcome(&self) -> Option<GateOutcome> {
    match self {
      StepPayload::VerifyPackingLabel(p) => Some(p.derived_outcome()),
      StepPayload::VerifyProductLabel(p) => Some(p.derived_outcome()),
      _ => None,
    }
  }

  pub fn to_json(&self) -> JsonValue {
    serde_json::to_value(self).unwrap_or(JsonValue::Null)
  }

  /// Reglas de negocio por paso.
  pub fn check_rules(&self) -> Result<(), InspectionError> {
    let step_id = self.step_id();
    match self {
      StepPayload::ScanQr(p) => {
        require_text(step_id, "qrValue", &p.qr_value)?;
        if !p.qr_validated {
          return Err(InspectionError::Validation("scan_qr: el QR no fue validado".into()));
        }
      }
      StepPayload::InspectionInfo(p) => {
        require_text(step_id, "orderNumber", &p.order_number)?;
        require_text(step_id, "inspector", &p.inspector)?;
        NaiveDate::parse_from_str(p.date_performed.trim(), "%Y-%m-%d").map_err(|_| {
          InspectionError::Validation(format!("inspection_info: fecha inválida '{}'", p.date_performed))
        })?;
        let time = p.time_performed.trim();
        NaiveTime::parse_from_str(time, "%H:%M").or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
                                                .map_err(|_| {
                                                  InspectionError::Validation(format!("inspection_info: hora \
                                                                                       inválida '{}'",
                                                                                      p.time_performed))
                                                })?;
      }
      StepPayload::VerifyPackingLabel(p) => {
        check_gate(step_id, p.gate1_outcome, p.derived_outcome())?;
        check_fail_reason(step_id, "mismatchReason", p.gate1_outcome, p.mismatch_reason.as_deref())?;
        check_photos(step_id, &p.photos)?;
      }
      StepPayload::VerifyProductLabel(p) => {
        check_gate(step_id, p.gate2_outcome, p.derived_outcome())?;
        check_fail_reason(step_id, "issueReason", p.gate2_outcome, p.issue_reason.as_deref())?;
        check_photos(step_id, &p.photos)?;
      }
      StepPayload::LotNumber(p) => {
        if p.lots.is_empty() {
          return Err(InspectionError::Validation("lot_number: se requiere al menos un lote".into()));
        }
        let mut seen = HashSet::new();
        for lot in &p.lots {
          require_text(step_id, "lots[].id", &lot.id)?;
          require_text(step_id, "lots[].lotRaw", &lot.lot_raw)?;
          if !seen.insert(lot.id.as_str()) {
            return Err(InspectionError::Validation(format!("lot_number: id de lote duplicado '{}'", lot.id)));
          }
        }
        if p.same_for_all {
          let first = p.lots[0].lot_raw.trim();
          if p.lots.iter().any(|l| l.lot_raw.trim() != first) {
            return Err(InspectionError::Validation("lot_number: sameForAll exige el mismo lote en todas las \
                                                   entradas"
                                                            .into()));
          }
        }
      }
      StepPayload::FinalReview(p) => {
        let a = &p.approvals;
        if !(a.packing_label && a.product_label && a.lot_numbers) {
          return Err(InspectionError::Validation("final_review: las tres aprobaciones son obligatorias".into()));
        }
      }
    }
    Ok(())
  }

  /// Copia apta para auditoria: los arreglos (`photos`, `lots`) se resumen
  /// a id/nombre/bandera y se agrega su conteo.
  pub fn redacted(&self) -> JsonValue {
    redact_payload_json(&self.to_json())
  }
}

/// Resume arreglos voluminosos de un payload serializado.
pub fn redact_payload_json(value: &JsonValue) -> JsonValue {
  let Some(obj) = value.as_object() else {
    return value.clone();
  };
  let mut out = serde_json::Map::new();
  for (key, v) in obj {
    match (key.as_str(), v.as_array()) {
      ("photos", Some(items)) => {
        let summary: Vec<JsonValue> = items.iter()
                                           .map(|p| {
                                             json!({
                                               "id": p.get("id").cloned().unwrap_or(JsonValue::Null),
                                               "name": p.get("name").cloned().unwrap_or(JsonValue::Null),
                                               "hasUrl": p.get("url").map(|u| !u.is_null()).unwrap_or(false),
                                             })
                                           })
                                           .collect();
        out.insert("photoCount".into(), json!(summary.len()));
        out.insert(key.clone(), JsonValue::Array(summary));
      }
      ("lots", Some(items)) => {
        let summary: Vec<JsonValue> = items.iter()
                                           .map(|l| {
                                             json!({
                                               "id": l.get("id").cloned().unwrap_or(JsonValue::Null),
                                               "lotRaw": l.get("lotRaw").cloned().unwrap_or(JsonValue::Null),
                                             })
                                           })
                                           .collect();
        out.insert("lotCount".into(), json!(summary.len()));
        out.insert(key.clone(), JsonValue::Array(summary));
      }
      _ => {
        out.insert(key.clone(), v.clone());
      }
    }
  }
  JsonValue::Object(out)
}

/// Valida un candidato no confiable para `step_id`.
///
/// Devuelve el payload tipado o `InspectionError::Validation` si faltan
/// campos o se viola una regla del paso.
pub fn validate_step_payload(step_id: StepId, candidate: &JsonValue) -> Result<StepPayload, InspectionError> {
  let payload = StepPayload::from_json(step_id, candidate)?;
  payload.check_rules()?;
  Ok(payload)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn packing(all_ok: bool, outcome: &str) -> JsonValue {
    json!({
      "shipToOk": true,
      "companyOk": all_ok,
      "orderNumberOk": true,
      "productDescriptionOk": true,
      "gate1Outcome": outcome,
      "mismatchReason": if all_ok { JsonValue::Null } else { json!("empresa distinta") },
      "photos": [{"id": "p1", "name": "label.jpg", "url": "s3://bucket/p1", "sizeBytes": 123456}],
      "completedAt": "2025-03-01T10:00:00Z"
    })
  }

  #[test]
  fn gate_outcome_must_match_checklist() {
    assert!(validate_step_payload(StepId::VerifyPackingLabel, &packing(true, "PASS")).is_ok());
    assert!(validate_step_payload(StepId::VerifyPackingLabel, &packing(false, "FAIL")).is_ok());
    let err = validate_step_payload(StepId::VerifyPackingLabel, &packing(false, "PASS")).unwrap_err();
    assert!(matches!(err, InspectionError::Validation(_)));
  }

  #[test]
  fn failed_gate_requires_reason() {
    let mut candidate = packing(false, "FAIL");
    candidate["mismatchReason"] = json!("   ");
    let err = validate_step_payload(StepId::VerifyPackingLabel, &candidate).unwrap_err();
    assert!(matches!(err, InspectionError::Validation(ref m) if m.contains("mismatchReason")));

    let product = json!({
      "gradeOk": true, "unOk": false, "pgOk": true, "lidOk": true, "ghsOk": true,
      "gate2Outcome": "FAIL",
      "photos": [],
      "completedAt": "2025-03-01T10:00:00Z"
    });
    let err = validate_step_payload(StepId::VerifyProductLabel, &product).unwrap_err();
    assert!(matches!(err, InspectionError::Validation(ref m) if m.contains("issueReason")));
  }

  #[test]
  fn missing_required_field_is_rejected() {
    let mut candidate = packing(true, "PASS");
    candidate.as_object_mut().unwrap().remove("photos");
    assert!(matches!(validate_step_payload(StepId::VerifyPackingLabel, &candidate),
                     Err(InspectionError::Validation(_))));
    assert!(validate_step_payload(StepId::ScanQr, &json!("not-an-object")).is_err());
  }

  #[test]
  fn final_review_requires_all_approvals() {
    let candidate = json!({
      "approvals": {"packingLabel": true, "productLabel": false, "lotNumbers": true},
      "completedAt": "2025-03-01T10:00:00Z"
    });
    assert!(validate_step_payload(StepId::FinalReview, &candidate).is_err());
  }

  #[test]
  fn lot_same_for_all_requires_identical_lots() {
    let candidate = json!({
      "lots": [{"id": "l1", "lotRaw": "A-1"}, {"id": "l2", "lotRaw": "B-2"}],
      "sameForAll": true,
      "completedAt": "2025-03-01T10:00:00Z"
    });
    assert!(validate_step_payload(StepId::LotNumber, &candidate).is_err());
  }

  #[test]
  fn redaction_summarizes_photos() {
    let payload = validate_step_payload(StepId::VerifyPackingLabel, &packing(true, "PASS")).unwrap();
    let red = payload.redacted();
    assert_eq!(red["photoCount"], json!(1));
    assert_eq!(red["photos"][0], json!({"id": "p1", "name": "label.jpg", "hasUrl": true}));
    assert!(red["photos"][0].get("sizeBytes").is_none());
    assert_eq!(red["shipToOk"], json!(true));
  }

  #[test]
  fn structural_equality_ignores_key_order() {
    let a = json!({"qrValue": "Q1", "qrValidated": true, "validatedAt": "2025-03-01T10:00:00Z"});
    let b = json!({"validatedAt": "2025-03-01T10:00:00Z", "qrValidated": true, "qrValue": "Q1"});
    assert_eq!(StepPayload::from_json(StepId::ScanQr, &a).unwrap(),
               StepPayload::from_json(StepId::ScanQr, &b).unwrap());
  }
}
