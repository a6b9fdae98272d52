use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Stored login record. Never serialized: the hash stays server-side.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: String, // free-form, compared case-sensitively
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A test case row. `project_id`/`user_id` may point at rows that no longer exist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TestCase {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TestStatus {
    pub const ALL: [TestStatus; 4] = [
        TestStatus::Pending,
        TestStatus::InProgress,
        TestStatus::Completed,
        TestStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::InProgress => "in-progress",
            TestStatus::Completed => "completed",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ApiError::Validation(format!(
                    "Invalid status '{}', expected one of: pending, in-progress, completed, failed",
                    s
                ))
            })
    }
}

/// JWT claims carried by a session token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: String, // username
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
}

/// Body accepted by `POST /projects` and `PUT /projects/:id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProjectInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Validated project fields. Absent optionals mean "default" on create and
/// "keep stored value" on update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFields {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
}

impl ProjectInput {
    pub fn validate(self) -> Result<ProjectFields, ApiError> {
        let name = required(self.name, "name")?;
        let status = match self.status {
            Some(status) if status.trim().is_empty() => {
                return Err(ApiError::Validation("Field 'status' must not be blank".into()))
            }
            Some(status) => Some(status.trim().to_string()),
            None => None,
        };
        Ok(ProjectFields {
            name,
            description: self.description,
            status,
        })
    }
}

/// Body accepted by `POST /tests` and `PUT /tests/:id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TestInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Absent: keep (or no reference on create). `null`: clear the reference.
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Option<i64>>,
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// Validated test fields. `None` references are left untouched on update;
/// `Some(None)` unassigns them.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFields {
    pub name: String,
    pub status: Option<TestStatus>,
    pub project_id: Option<Option<i64>>,
    pub user_id: Option<Option<i64>>,
}

impl TestInput {
    pub fn validate(self) -> Result<TestFields, ApiError> {
        let name = required(self.name, "name")?;
        let status = self
            .status
            .as_deref()
            .map(|s| s.trim().parse::<TestStatus>())
            .transpose()?;
        Ok(TestFields {
            name,
            status,
            project_id: self.project_id,
            user_id: self.user_id,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ApiError::Validation(format!("Field '{}' is required", field))),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Created {
    pub id: i64,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Summary returned by `GET /stats`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub pending_tests: i64,
    pub success_rate: String,
}

/// One `YYYY-MM` bucket of `GET /monthly-progress`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MonthlyProgress {
    pub month: String,
    #[serde(rename = "completadas")]
    pub completed: i64,
    #[serde(rename = "fallidas")]
    pub failed: i64,
    #[serde(rename = "pendientes")]
    pub pending: i64,
}

/// Per-project row of `GET /project-progress`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    pub project_id: i64,
    pub name: String,
    pub total_tests: i64,
    pub completed_tests: i64,
    pub success_rate: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("in-progress".parse::<TestStatus>().unwrap(), TestStatus::InProgress);
        assert_eq!(TestStatus::Failed.to_string(), "failed");
        assert!("done".parse::<TestStatus>().is_err());
        // Case-sensitive
        assert!("Completed".parse::<TestStatus>().is_err());
    }

    #[test]
    fn test_project_input_requires_name() {
        let err = ProjectInput::default().validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let blank = ProjectInput {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());

        let fields = ProjectInput {
            name: Some(" Checkout ".into()),
            description: None,
            status: Some("pending".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(fields.name, "Checkout");
        assert_eq!(fields.status.as_deref(), Some("pending"));
    }

    #[test]
    fn test_test_input_validates_status() {
        let bad = TestInput {
            name: Some("login works".into()),
            status: Some("passed".into()),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(ApiError::Validation(_))));

        let ok = TestInput {
            name: Some("login works".into()),
            project_id: Some(Some(7)),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(ok.status, None);
        assert_eq!(ok.project_id, Some(Some(7)));
    }

    #[test]
    fn test_test_input_null_differs_from_absent() {
        let input: TestInput =
            serde_json::from_value(serde_json::json!({"name": "x", "user_id": null})).unwrap();
        assert_eq!(input.user_id, Some(None));
        assert_eq!(input.project_id, None);

        // Round-trips: absent stays absent, null stays null.
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"name": "x", "user_id": null}));
    }

    #[test]
    fn test_report_field_names() {
        let month = MonthlyProgress {
            month: "2026-10".into(),
            completed: 1,
            failed: 2,
            pending: 3,
        };
        let json = serde_json::to_value(&month).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"month": "2026-10", "completadas": 1, "fallidas": 2, "pendientes": 3})
        );

        let stats = Stats {
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            pending_tests: 0,
            success_rate: "0.00%".into(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("totalTests").is_some());
        assert!(json.get("successRate").is_some());
    }
}
