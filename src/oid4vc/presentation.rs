// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Presentation Exchange (v2) definitions and their evaluation.
//!
//! Only field constraints are evaluated. Field paths are RFC 9535 JSONPath
//! queries.

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json_path::JsonPath;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub input_descriptors: Vec<InputDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// JSON Schema subset used as a field filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub const_: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationSubmission {
    pub id: String,
    pub definition_id: String,
    pub descriptor_map: Vec<DescriptorMapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorMapEntry {
    pub id: String,
    pub format: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMapEntry>>,
}

/// Which credential satisfied which input descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub descriptor_id: String,
    pub credential_index: usize,
}

impl PresentationDefinition {
    /// Match every input descriptor against `credentials` (decoded credential
    /// payloads). Fails naming the first descriptor no credential satisfies.
    pub fn evaluate(&self, credentials: &[Value]) -> Result<Vec<DescriptorMatch>> {
        let mut matches = Vec::with_capacity(self.input_descriptors.len());
        for descriptor in &self.input_descriptors {
            let mut found = None;
            for (index, credential) in credentials.iter().enumerate() {
                if descriptor.is_satisfied_by(credential)? {
                    found = Some(index);
                    break;
                }
            }
            let credential_index = found.ok_or_else(|| {
                anyhow!(
                    "No credential satisfies input descriptor {}",
                    descriptor.id
                )
            })?;
            matches.push(DescriptorMatch {
                descriptor_id: descriptor.id.clone(),
                credential_index,
            });
        }
        Ok(matches)
    }

    /// The submission must answer this definition and name every descriptor.
    pub fn check_submission(&self, submission: &PresentationSubmission) -> Result<()> {
        if submission.definition_id != self.id {
            bail!(
                "Presentation submission answers definition {}, expected {}",
                submission.definition_id,
                self.id
            );
        }
        for descriptor in &self.input_descriptors {
            if !submission.descriptor_map.iter().any(|e| e.id == descriptor.id) {
                bail!("Presentation submission lacks descriptor {}", descriptor.id);
            }
        }
        Ok(())
    }
}

impl InputDescriptor {
    pub fn is_satisfied_by(&self, credential: &Value) -> Result<bool> {
        for field in &self.constraints.fields {
            if !field.optional && !field.matches(credential)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Field {
    /// The first path yielding a value the filter accepts wins.
    pub fn matches(&self, credential: &Value) -> Result<bool> {
        for path in &self.path {
            let path = JsonPath::parse(path).map_err(|e| anyhow!("Invalid JSONPath {path}: {e}"))?;
            for value in path.query(credential).all() {
                let accepted = match &self.filter {
                    None => true,
                    Some(filter) => filter.accepts(value)?,
                };
                if accepted {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl Filter {
    /// Arrays are accepted when any element is.
    pub fn accepts(&self, value: &Value) -> Result<bool> {
        if let Value::Array(items) = value {
            if self.type_.as_deref() != Some("array") {
                for item in items {
                    if self.accepts(item)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
        }

        if let Some(type_) = &self.type_ {
            if !json_type_matches(type_, value) {
                return Ok(false);
            }
        }
        if let Some(expected) = &self.const_ {
            if expected != value {
                return Ok(false);
            }
        }
        if let Some(pattern) = &self.pattern {
            let Some(text) = value.as_str() else {
                return Ok(false);
            };
            let re = Regex::new(pattern).map_err(|e| anyhow!("Invalid filter pattern: {e}"))?;
            if !re.is_match(text) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn json_type_matches(type_: &str, value: &Value) -> bool {
    match type_ {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prescription_definition() -> PresentationDefinition {
        serde_json::from_value(json!({
            "id": "hospital_prescription_verification",
            "input_descriptors": [{
                "id": "PrescriptionDescriptor",
                "constraints": {"fields": [{
                    "path": ["$.type", "$.vc.type.*", "$.vct"],
                    "filter": {"type": "string", "pattern": "Prescription"}
                }]}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn field_paths_accept_filters_and_descendants() {
        let credential = json!({"vc": {"credentialSubject": {"name": "Ibuprofen", "dose": 200}}});
        let field = |path: &str| Field {
            path: vec![path.into()],
            filter: None,
            optional: false,
        };
        assert!(field("$..name").matches(&credential).unwrap());
        assert!(field("$.vc.credentialSubject[?@ > 100]").matches(&credential).unwrap());
        assert!(!field("$.vc.credentialSubject[?@ > 500]").matches(&credential).unwrap());
        assert!(!field("$.missing.deeper").matches(&credential).unwrap());
        assert!(field("vc.type").matches(&credential).is_err());
    }

    #[test]
    fn jwt_vc_payload_satisfies_prescription_descriptor() {
        let payload = json!({"vc": {"type": ["VerifiableCredential", "Prescription"]}});
        let matches = prescription_definition().evaluate(&[payload]).unwrap();
        assert_eq!(matches[0].descriptor_id, "PrescriptionDescriptor");
        assert_eq!(matches[0].credential_index, 0);
    }

    #[test]
    fn sd_jwt_vct_and_array_type_match() {
        let def = prescription_definition();
        assert!(def.evaluate(&[json!({"vct": "Prescription"})]).is_ok());
        assert!(def
            .evaluate(&[json!({"type": ["VerifiableCredential", "Prescription"]})])
            .is_ok());
    }

    #[test]
    fn other_credentials_do_not_satisfy() {
        let def = prescription_definition();
        let err = def
            .evaluate(&[json!({"vc": {"type": ["VerifiableCredential", "DriversLicense"]}})])
            .unwrap_err();
        assert!(err.to_string().contains("PrescriptionDescriptor"));
        assert!(def.evaluate(&[]).is_err());
    }

    #[test]
    fn second_credential_can_match() {
        let def = prescription_definition();
        let matches = def
            .evaluate(&[json!({"vct": "Other"}), json!({"vct": "Prescription"})])
            .unwrap();
        assert_eq!(matches[0].credential_index, 1);
    }

    #[test]
    fn submission_must_reference_definition_and_descriptors() {
        let def = prescription_definition();
        let mut submission = PresentationSubmission {
            id: "s".into(),
            definition_id: def.id.clone(),
            descriptor_map: vec![DescriptorMapEntry {
                id: "PrescriptionDescriptor".into(),
                format: "jwt_vp".into(),
                path: "$".into(),
                path_nested: None,
            }],
        };
        assert!(def.check_submission(&submission).is_ok());

        submission.descriptor_map.clear();
        assert!(def.check_submission(&submission).is_err());
        submission.definition_id = "other".into();
        assert!(def.check_submission(&submission).is_err());
    }

    #[test]
    fn const_filter_and_type_mismatch() {
        let filter = Filter {
            type_: Some("number".into()),
            pattern: None,
            const_: Some(json!(3)),
        };
        assert!(filter.accepts(&json!(3)).unwrap());
        assert!(!filter.accepts(&json!(4)).unwrap());
        assert!(!filter.accepts(&json!("3")).unwrap());
    }
}
