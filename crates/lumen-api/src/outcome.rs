use serde::{Deserialize, Serialize};

/// Operation outcome payload. Every non-2xx response carries one; success
/// responses carry one alongside the resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    pub severity: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    pub fn single(
        severity: impl Into<String>,
        code: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            issue: vec![OperationOutcomeIssue {
                severity: severity.into(),
                code: code.into(),
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    pub fn success(diagnostics: impl Into<String>) -> Self {
        Self::single("information", "informational", diagnostics)
    }

    pub fn error(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::single("error", code, diagnostics)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
