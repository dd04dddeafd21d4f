//! Request bodies of the ingestion routes and their structural validation.
//!
//! Every field is optional at the serde level so that a missing field is
//! reported as a `required` violation instead of a bare decode error.

use penguin_api::{ApiError, FieldViolation};
use penguin_core::{
  model::{DropType, ExternalDropType, Server},
  report::ReportMetadata,
};
use serde::Deserialize;

/// Most drops accepted in one report.
pub const MAX_DROPS: usize = 128;
/// Largest quantity of a single drop.
pub const MAX_QUANTITY: i64 = 1000;
/// Most reports in one recognition batch.
pub const MAX_BATCH: usize = 100;
const MAX_LABEL_LEN: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DropInput {
  pub drop_type: String,
  pub item_id:   String,
  pub quantity:  i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportRequest {
  pub stage_id: String,
  pub server:   String,
  pub source:   String,
  pub version:  String,
  pub drops:    Vec<DropInput>,
  pub metadata: Option<ReportMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchDrop {
  pub stage_id: String,
  pub drops:    Vec<DropInput>,
  pub metadata: Option<ReportMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchReportRequest {
  pub server:      String,
  pub source:      String,
  pub version:     String,
  pub batch_drops: Vec<BatchDrop>,
}

/// Task-level fields shared by every report of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
  pub server:  Server,
  pub source:  String,
  pub version: String,
}

/// A drop with its type already remapped; the item is still an ark id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDrop {
  pub drop_type:   DropType,
  pub ark_item_id: String,
  pub quantity:    i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
  pub ark_stage_id: String,
  pub drops:        Vec<ParsedDrop>,
  pub metadata:     ReportMetadata,
}

// ─── Field checks ────────────────────────────────────────────────────────────

fn required(field: &str, value: &str, out: &mut Vec<FieldViolation>) -> bool {
  if value.trim().is_empty() {
    out.push(FieldViolation::new(field, "required", format!("{field} is required")));
    return false;
  }
  true
}

fn printable(field: &str, value: &str, out: &mut Vec<FieldViolation>) {
  if !required(field, value, out) {
    return;
  }
  if value.len() > MAX_LABEL_LEN || !value.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
    out.push(FieldViolation::new(
      field,
      "printascii",
      format!("{field} must be at most {MAX_LABEL_LEN} printable ASCII characters"),
    ));
  }
}

fn envelope(server: &str, source: &str, version: &str, out: &mut Vec<FieldViolation>) -> Option<Envelope> {
  printable("source", source, out);
  printable("version", version, out);
  let server = if required("server", server, out) {
    match Server::parse(server) {
      Ok(s) => Some(s),
      Err(_) => {
        out.push(FieldViolation::new("server", "oneof", "server must be one of CN US JP KR"));
        None
      }
    }
  } else {
    None
  };
  Some(Envelope { server: server?, source: source.to_owned(), version: version.to_owned() })
}

fn drops(prefix: &str, input: &[DropInput], out: &mut Vec<FieldViolation>) -> Vec<ParsedDrop> {
  if input.len() > MAX_DROPS {
    out.push(FieldViolation::new(
      format!("{prefix}drops"),
      "max",
      format!("at most {MAX_DROPS} drops are accepted"),
    ));
    return Vec::new();
  }
  let mut parsed = Vec::with_capacity(input.len());
  for (i, d) in input.iter().enumerate() {
    let field = |name: &str| format!("{prefix}drops[{i}].{name}");
    let drop_type = match ExternalDropType::parse(&d.drop_type) {
      Ok(t) => Some(t.internal()),
      Err(_) => {
        out.push(FieldViolation::new(
          field("dropType"),
          "oneof",
          format!("unknown drop type {:?}", d.drop_type),
        ));
        None
      }
    };
    let has_item = required(&field("itemId"), &d.item_id, out);
    if !(1..=MAX_QUANTITY).contains(&d.quantity) {
      out.push(FieldViolation::new(
        field("quantity"),
        "lte",
        format!("quantity must be between 1 and {MAX_QUANTITY}"),
      ));
    }
    if let Some(drop_type) = drop_type
      && has_item
    {
      parsed.push(ParsedDrop { drop_type, ark_item_id: d.item_id.clone(), quantity: d.quantity });
    }
  }
  parsed
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Validate a singular report.
pub fn report(req: &ReportRequest) -> Result<(Envelope, ValidReport), ApiError> {
  let mut out = Vec::new();
  let envelope = envelope(&req.server, &req.source, &req.version, &mut out);
  required("stageId", &req.stage_id, &mut out);
  let drops = drops("", &req.drops, &mut out);
  match envelope {
    Some(envelope) if out.is_empty() => Ok((envelope, ValidReport {
      ark_stage_id: req.stage_id.clone(),
      drops,
      metadata: req.metadata.clone().unwrap_or_default(),
    })),
    _ => Err(ApiError::violations(out)),
  }
}

/// Validate the task-level fields of a recognition batch.
pub fn batch(req: &BatchReportRequest) -> Result<Envelope, ApiError> {
  let mut out = Vec::new();
  let envelope = envelope(&req.server, &req.source, &req.version, &mut out);
  if req.batch_drops.is_empty() || req.batch_drops.len() > MAX_BATCH {
    out.push(FieldViolation::new(
      "batchDrops",
      "max",
      format!("batchDrops must contain 1 to {MAX_BATCH} items"),
    ));
  }
  match envelope {
    Some(envelope) if out.is_empty() => Ok(envelope),
    _ => Err(ApiError::violations(out)),
  }
}

/// Validate one entry of a recognition batch.
pub fn batch_drop(index: usize, drop: &BatchDrop) -> Result<ValidReport, Vec<FieldViolation>> {
  let mut out = Vec::new();
  let prefix = format!("batchDrops[{index}].");
  required(&format!("{prefix}stageId"), &drop.stage_id, &mut out);
  let drops = drops(&prefix, &drop.drops, &mut out);
  if !out.is_empty() {
    return Err(out);
  }
  Ok(ValidReport {
    ark_stage_id: drop.stage_id.clone(),
    drops,
    metadata: drop.metadata.clone().unwrap_or_default(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn request(value: serde_json::Value) -> ReportRequest { serde_json::from_value(value).unwrap() }

  fn fields(err: ApiError) -> Vec<String> {
    match err {
      ApiError::InvalidRequest { violations, .. } => violations.into_iter().map(|v| v.field).collect(),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn every_external_drop_type_is_accepted() {
    let labels = ["NORMAL_DROP", "REGULAR_DROP", "SPECIAL_DROP", "EXTRA_DROP", "FURNITURE"];
    let drops: Vec<_> = labels
      .iter()
      .map(|t| json!({"dropType": t, "itemId": "30012", "quantity": 1}))
      .collect();
    let req = request(json!({
      "stageId": "main_01-07", "server": "CN", "source": "s", "version": "v", "drops": drops,
    }));
    let (envelope, report) = report(&req).unwrap();
    assert_eq!(envelope.server, Server::Cn);
    let types: Vec<_> = report.drops.iter().map(|d| d.drop_type).collect();
    assert_eq!(types, [
      DropType::Regular,
      DropType::Regular,
      DropType::Special,
      DropType::Extra,
      DropType::Furniture
    ]);
  }

  #[test]
  fn missing_fields_are_reported_together() {
    let err = report(&request(json!({}))).unwrap_err();
    assert_eq!(fields(err), ["source", "version", "server", "stageId"]);
  }

  #[test]
  fn quantities_and_labels_are_bounded() {
    let req = request(json!({
      "stageId": "main_01-07", "server": "TW", "source": "bad\u{7f}", "version": "v",
      "drops": [
        {"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 1001},
        {"dropType": "RECOGNITION_ONLY", "itemId": "30012", "quantity": 1},
      ],
    }));
    assert_eq!(fields(report(&req).unwrap_err()), [
      "source",
      "server",
      "drops[0].quantity",
      "drops[1].dropType"
    ]);
  }

  #[test]
  fn drop_count_is_capped() {
    let drops = vec![json!({"dropType": "NORMAL_DROP", "itemId": "1", "quantity": 1}); MAX_DROPS + 1];
    let req = request(json!({
      "stageId": "s", "server": "CN", "source": "s", "version": "v", "drops": drops,
    }));
    assert_eq!(fields(report(&req).unwrap_err()), ["drops"]);
  }

  #[test]
  fn batch_entries_validate_independently() {
    let req: BatchReportRequest = serde_json::from_value(json!({
      "server": "US", "source": "recognizer", "version": "v1",
      "batchDrops": [
        {"stageId": "main_01-07", "drops": [{"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 2}]},
        {"stageId": "", "drops": []},
      ],
    }))
    .unwrap();
    assert_eq!(batch(&req).unwrap().server, Server::Us);
    assert_eq!(batch_drop(0, &req.batch_drops[0]).unwrap().drops[0].quantity, 2);
    let errs = batch_drop(1, &req.batch_drops[1]).unwrap_err();
    assert_eq!(errs[0].field, "batchDrops[1].stageId");

    let empty = BatchReportRequest { server: "CN".into(), source: "s".into(), version: "v".into(), ..Default::default() };
    assert!(batch(&empty).is_err());
  }
}
