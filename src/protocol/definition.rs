// src/protocol/definition.rs
//! Phase and protocol definitions
//!
//! Definitions usually come from acquisition scripts and are untrusted, so
//! every constructor validates before anything reaches the controller.

use crate::config::constants::protocol::{MAX_PHASE_DURATION_MS, MIN_PHASE_DURATION_MS};
use crate::error::{EmgError, EmgErrorBuilder, EmgResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// One scripted segment of a protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "durationMs")]
    pub target_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl PhaseDefinition {
    pub fn new(id: &str, name: &str, target_duration_ms: u64) -> EmgResult<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EmgError::validation("phase.id", "must not be empty"));
        }
        validate_duration(target_duration_ms)?;

        let name = name.trim();
        Ok(Self {
            id: id.to_string(),
            name: if name.is_empty() { id.to_string() } else { name.to_string() },
            target_duration_ms,
            instruction: None,
        })
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Build a definition from script-originated JSON.
    ///
    /// Accepts `id`, optional `name` and `instruction`, and a duration as
    /// `durationMs` (or `duration`, also milliseconds) or `durationSeconds`.
    pub fn from_value(value: &Value) -> EmgResult<Self> {
        let builder = || EmgErrorBuilder::new("phase", "parse");
        let object = value
            .as_object()
            .ok_or_else(|| builder().validation("phase", "expected an object"))?;

        let id = match object.get("id") {
            Some(Value::String(id)) => id.as_str(),
            Some(_) => return Err(builder().validation("phase.id", "must be a string")),
            None => return Err(builder().validation("phase.id", "is required")),
        };

        let name = match object.get("name") {
            Some(Value::String(name)) => name.as_str(),
            None | Some(Value::Null) => "",
            Some(_) => return Err(builder().validation("phase.name", "must be a string")),
        };

        let millis = if let Some(ms) = object.get("durationMs").or_else(|| object.get("duration")) {
            number_field(ms, "phase.durationMs")?
        } else if let Some(secs) = object.get("durationSeconds") {
            number_field(secs, "phase.durationSeconds")? * 1000.0
        } else {
            return Err(builder().validation("phase.durationMs", "is required"));
        };

        let definition = Self::new(id, name, millis_from_f64(millis)?)?;

        match object.get("instruction") {
            Some(Value::String(text)) => Ok(definition.with_instruction(text.clone())),
            None | Some(Value::Null) => Ok(definition),
            Some(_) => Err(builder().validation("phase.instruction", "must be a string")),
        }
    }

    pub fn target_duration(&self) -> Duration {
        Duration::from_millis(self.target_duration_ms)
    }
}

fn number_field(value: &Value, field: &str) -> EmgResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| EmgError::validation(field, "must be a number"))
}

fn millis_from_f64(millis: f64) -> EmgResult<u64> {
    if !millis.is_finite() {
        return Err(EmgError::validation("phase.durationMs", "must be finite"));
    }
    let rounded = millis.round();
    if rounded < MIN_PHASE_DURATION_MS as f64 || rounded > MAX_PHASE_DURATION_MS as f64 {
        return Err(EmgError::validation(
            "phase.durationMs",
            format!(
                "{} ms outside [{}, {}]",
                millis, MIN_PHASE_DURATION_MS, MAX_PHASE_DURATION_MS
            ),
        ));
    }
    Ok(rounded as u64)
}

fn validate_duration(millis: u64) -> EmgResult<()> {
    if !(MIN_PHASE_DURATION_MS..=MAX_PHASE_DURATION_MS).contains(&millis) {
        return Err(EmgError::validation(
            "phase.durationMs",
            format!(
                "{} ms outside [{}, {}]",
                millis, MIN_PHASE_DURATION_MS, MAX_PHASE_DURATION_MS
            ),
        ));
    }
    Ok(())
}

/// Ordered list of phases run one after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub name: String,
    pub phases: Vec<PhaseDefinition>,
}

impl ProtocolDefinition {
    pub fn new(name: &str, phases: Vec<PhaseDefinition>) -> EmgResult<Self> {
        if phases.is_empty() {
            return Err(EmgError::validation("protocol.phases", "must not be empty"));
        }

        let mut seen = HashSet::new();
        for phase in &phases {
            if !seen.insert(phase.id.as_str()) {
                return Err(EmgError::validation(
                    "protocol.phases",
                    format!("duplicate phase id '{}'", phase.id),
                ));
            }
        }

        Ok(Self {
            name: name.trim().to_string(),
            phases,
        })
    }

    /// Parse `{"name": ..., "phases": [...]}` or a bare array of phases
    pub fn from_json(input: &str) -> EmgResult<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| EmgError::validation("protocol", e.to_string()))?;

        let (name, phases) = match value {
            Value::Array(phases) => (String::new(), phases),
            Value::Object(mut object) => {
                let name = match object.remove("name") {
                    Some(Value::String(name)) => name,
                    None | Some(Value::Null) => String::new(),
                    Some(_) => {
                        return Err(EmgError::validation("protocol.name", "must be a string"))
                    }
                };
                match object.remove("phases") {
                    Some(Value::Array(phases)) => (name, phases),
                    _ => {
                        return Err(EmgError::validation(
                            "protocol.phases",
                            "expected an array",
                        ))
                    }
                }
            }
            _ => {
                return Err(EmgError::validation(
                    "protocol",
                    "expected an object or an array",
                ))
            }
        };

        let phases = phases
            .iter()
            .map(PhaseDefinition::from_value)
            .collect::<EmgResult<Vec<_>>>()?;

        Self::new(&name, phases)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.phases.iter().map(|p| p.target_duration_ms).sum()
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Single continuous recording
    pub fn basic_acquisition() -> Self {
        Self {
            name: "Basic EMG Acquisition".to_string(),
            phases: vec![PhaseDefinition {
                id: "main".to_string(),
                name: "Full Recording".to_string(),
                target_duration_ms: 10_000,
                instruction: Some("Collecting data for 10 seconds".to_string()),
            }],
        }
    }

    /// MVC, rest, sub-maximal and walking protocol
    pub fn dynamic_contraction() -> Self {
        let phase = |id: &str, name: &str, secs: u64, instruction: &str| PhaseDefinition {
            id: id.to_string(),
            name: name.to_string(),
            target_duration_ms: secs * 1000,
            instruction: Some(instruction.to_string()),
        };

        Self {
            name: "Dynamic Contraction Protocol".to_string(),
            phases: vec![
                phase(
                    "mvc1",
                    "MVC 1",
                    5,
                    "Perform maximum voluntary contraction for 5 seconds",
                ),
                phase("rest1", "Rest 1", 30, "Rest for 30 seconds"),
                phase(
                    "mvc2",
                    "MVC 2",
                    5,
                    "Perform second maximum voluntary contraction for 5 seconds",
                ),
                phase("rest2", "Rest 2", 30, "Rest for 30 seconds"),
                phase(
                    "submaximal",
                    "Sub-maximal (50%)",
                    10,
                    "Perform 50% of maximum contraction for 10 seconds",
                ),
                phase(
                    "walking",
                    "Walking",
                    15,
                    "Walk at a comfortable pace for 15 seconds",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_validates() {
        assert!(PhaseDefinition::new("mvc1", "MVC 1", 5000).is_ok());
        assert!(PhaseDefinition::new("  ", "Empty", 5000).is_err());
        assert!(PhaseDefinition::new("mvc1", "MVC 1", 0).is_err());
        assert!(PhaseDefinition::new("mvc1", "MVC 1", MAX_PHASE_DURATION_MS + 1).is_err());

        let unnamed = PhaseDefinition::new("rest", "", 1000).unwrap();
        assert_eq!(unnamed.name, "rest");
    }

    #[test]
    fn test_from_value_units() {
        let ms = PhaseDefinition::from_value(&json!({"id": "a", "durationMs": 1500})).unwrap();
        assert_eq!(ms.target_duration_ms, 1500);

        let legacy = PhaseDefinition::from_value(&json!({"id": "a", "duration": 5000})).unwrap();
        assert_eq!(legacy.target_duration_ms, 5000);

        let secs = PhaseDefinition::from_value(
            &json!({"id": "a", "name": "A", "durationSeconds": 2.5, "instruction": "Relax"}),
        )
        .unwrap();
        assert_eq!(secs.target_duration_ms, 2500);
        assert_eq!(secs.name, "A");
        assert_eq!(secs.instruction.as_deref(), Some("Relax"));
    }

    #[test]
    fn test_from_value_rejects_malformed() {
        let cases = [
            json!("mvc1"),
            json!({"durationMs": 1000}),
            json!({"id": 7, "durationMs": 1000}),
            json!({"id": "a"}),
            json!({"id": "a", "durationMs": "long"}),
            json!({"id": "a", "durationMs": -5}),
            json!({"id": "a", "durationMs": 0.2}),
            json!({"id": "a", "durationMs": 1000, "instruction": 3}),
        ];
        for case in cases {
            let err = PhaseDefinition::from_value(&case).unwrap_err();
            assert!(matches!(err, EmgError::Validation { .. }), "{case}");
        }
    }

    #[test]
    fn test_protocol_from_json() {
        let protocol = ProtocolDefinition::from_json(
            r#"{"name": "Quick", "phases": [
                {"id": "baseline", "durationMs": 1000},
                {"id": "contraction", "durationSeconds": 2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(protocol.name, "Quick");
        assert_eq!(protocol.total_duration_ms(), 3000);
        assert!(protocol.phase("contraction").is_some());

        let bare = ProtocolDefinition::from_json(r#"[{"id": "main", "durationMs": 10}]"#).unwrap();
        assert_eq!(bare.phases.len(), 1);
    }

    #[test]
    fn test_protocol_rejects_duplicates_and_empty() {
        assert!(ProtocolDefinition::from_json("[]").is_err());
        assert!(ProtocolDefinition::from_json(
            r#"[{"id": "a", "durationMs": 10}, {"id": "a", "durationMs": 10}]"#
        )
        .is_err());
        assert!(ProtocolDefinition::from_json("not json").is_err());
        assert!(ProtocolDefinition::from_json("42").is_err());
    }

    #[test]
    fn test_builtin_protocols() {
        let basic = ProtocolDefinition::basic_acquisition();
        assert_eq!(basic.phases[0].id, "main");
        assert_eq!(basic.phases[0].name, "Full Recording");
        assert_eq!(basic.total_duration_ms(), 10_000);

        let dynamic = ProtocolDefinition::dynamic_contraction();
        let ids: Vec<&str> = dynamic.phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["mvc1", "rest1", "mvc2", "rest2", "submaximal", "walking"]);
        assert_eq!(dynamic.total_duration_ms(), 95_000);
    }

    #[test]
    fn test_serialized_shape_parses_back() {
        let original = ProtocolDefinition::dynamic_contraction();
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(ProtocolDefinition::from_json(&json).unwrap(), original);
    }
}
