//! Data models for the job queue.
//!
//! Defines job statuses, template identifiers, typed attribute payloads,
//! persisted records and the status view returned to pollers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Status of a job.
///
/// Transitions are forward-only: pending → processing → completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    ///
    /// A pending job may fail without ever being picked up, e.g. when its
    /// content disappears before the queue reaches it.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Transitions a collaborator may request. Only the processing loop starts
    /// jobs, so `Pending -> Processing` is excluded.
    pub fn can_report(&self, next: JobStatus) -> bool {
        self.can_transition_to(next)
            && !matches!((self, next), (JobStatus::Pending, JobStatus::Processing))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Built-in kinds of document-derived work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Perspectives,
    Tags,
    Language,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Perspectives, JobKind::Tags, JobKind::Language];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Perspectives => "perspectives",
            JobKind::Tags => "tags",
            JobKind::Language => "language",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "perspectives" => Some(JobKind::Perspectives),
            "tags" => Some(JobKind::Tags),
            "language" => Some(JobKind::Language),
            _ => None,
        }
    }

    /// Deterministic request id for this kind of work on a piece of content.
    ///
    /// Re-submitting the same kind for the same content yields the same id,
    /// which is what makes enqueueing idempotent.
    pub fn request_id_for(&self, content_id: &str) -> String {
        format!("req_{}_{}", self.as_str(), content_id)
    }
}

/// Request id for user-initiated custom-prompt work, never reused.
pub fn random_request_id() -> String {
    format!("req_custom_{}", uuid::Uuid::new_v4().simple())
}

/// Key into the template registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Builtin(JobKind),
    Custom(String),
}

impl TemplateId {
    pub fn custom(name: impl Into<String>) -> Self {
        TemplateId::Custom(name.into())
    }

    /// Parses a persisted template id. Names of built-in kinds always map to
    /// the built-in variant.
    pub fn parse(s: &str) -> Self {
        match JobKind::from_str(s) {
            Some(kind) => TemplateId::Builtin(kind),
            None => TemplateId::Custom(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TemplateId::Builtin(kind) => kind.as_str(),
            TemplateId::Custom(name) => name,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of the perspectives template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectivesPayload {
    pub content_id: String,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// Input of the tags template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsPayload {
    pub content_id: String,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// Input of the language detection template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePayload {
    pub content_id: String,
}

#[derive(Debug, Error)]
pub enum AttributesError {
    #[error("content id must not be empty")]
    EmptyContentId,

    #[error("content id '{0}' contains a reserved URL character")]
    InvalidContentId(String),

    #[error("prompt #{0} is blank")]
    BlankPrompt(usize),

    #[error("custom template name '{0}' is invalid")]
    InvalidTemplateName(String),

    #[error("custom payload must be a JSON object")]
    InvalidCustomPayload,

    #[error("malformed attributes: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Typed input of a job, keyed by the template that consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobAttributes {
    Perspectives(PerspectivesPayload),
    Tags(TagsPayload),
    Language(LanguagePayload),
    /// Input of a dynamically registered template; the template validates
    /// the payload itself.
    Custom { template: String, payload: Value },
}

impl JobAttributes {
    pub fn template_id(&self) -> TemplateId {
        match self {
            JobAttributes::Perspectives(_) => TemplateId::Builtin(JobKind::Perspectives),
            JobAttributes::Tags(_) => TemplateId::Builtin(JobKind::Tags),
            JobAttributes::Language(_) => TemplateId::Builtin(JobKind::Language),
            JobAttributes::Custom { template, .. } => TemplateId::Custom(template.clone()),
        }
    }

    /// Content this job works on, when there is one.
    pub fn content_id(&self) -> Option<&str> {
        match self {
            JobAttributes::Perspectives(p) => Some(&p.content_id),
            JobAttributes::Tags(p) => Some(&p.content_id),
            JobAttributes::Language(p) => Some(&p.content_id),
            JobAttributes::Custom { payload, .. } => {
                payload.get("contentId").and_then(Value::as_str)
            }
        }
    }

    pub fn validate(&self) -> Result<(), AttributesError> {
        fn check_prompts(prompts: &[String]) -> Result<(), AttributesError> {
            match prompts.iter().position(|p| p.trim().is_empty()) {
                Some(index) => Err(AttributesError::BlankPrompt(index)),
                None => Ok(()),
            }
        }

        match self {
            JobAttributes::Perspectives(p) => {
                check_content_id(&p.content_id)?;
                check_prompts(&p.prompts)
            }
            JobAttributes::Tags(p) => {
                check_content_id(&p.content_id)?;
                check_prompts(&p.prompts)
            }
            JobAttributes::Language(p) => check_content_id(&p.content_id),
            JobAttributes::Custom { template, payload } => {
                if template.trim().is_empty() || JobKind::from_str(template).is_some() {
                    return Err(AttributesError::InvalidTemplateName(template.clone()));
                }
                if !payload.is_object() {
                    return Err(AttributesError::InvalidCustomPayload);
                }
                Ok(())
            }
        }
    }

    /// Serialized form stored in the `attributes` column.
    pub fn to_json(&self) -> Result<String, AttributesError> {
        let json = match self {
            JobAttributes::Perspectives(p) => serde_json::to_string(p)?,
            JobAttributes::Tags(p) => serde_json::to_string(p)?,
            JobAttributes::Language(p) => serde_json::to_string(p)?,
            JobAttributes::Custom { payload, .. } => serde_json::to_string(payload)?,
        };
        Ok(json)
    }

    /// Rebuilds attributes from the `template_id` and `attributes` columns.
    pub fn from_stored(template_id: &str, json: &str) -> Result<Self, AttributesError> {
        let attributes = match TemplateId::parse(template_id) {
            TemplateId::Builtin(JobKind::Perspectives) => {
                JobAttributes::Perspectives(serde_json::from_str(json)?)
            }
            TemplateId::Builtin(JobKind::Tags) => JobAttributes::Tags(serde_json::from_str(json)?),
            TemplateId::Builtin(JobKind::Language) => {
                JobAttributes::Language(serde_json::from_str(json)?)
            }
            TemplateId::Custom(template) => JobAttributes::Custom {
                template,
                payload: serde_json::from_str(json)?,
            },
        };
        attributes.validate()?;
        Ok(attributes)
    }
}

fn check_content_id(content_id: &str) -> Result<(), AttributesError> {
    if content_id.trim().is_empty() {
        Err(AttributesError::EmptyContentId)
    } else if content_id.contains(['/', '?', '#']) {
        // The id becomes a single path segment of the content store URL
        Err(AttributesError::InvalidContentId(content_id.to_string()))
    } else {
        Ok(())
    }
}

/// A row about to be inserted in the status store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub request_id: String,
    pub content_id: Option<String>,
    pub template_id: String,
    pub attributes: String,
    pub created_at: i64,
}

impl NewJob {
    /// Validates and serializes `attributes` for storage.
    pub fn new(
        request_id: impl Into<String>,
        attributes: &JobAttributes,
        created_at: i64,
    ) -> Result<Self, AttributesError> {
        attributes.validate()?;
        Ok(NewJob {
            request_id: request_id.into(),
            content_id: attributes.content_id().map(str::to_string),
            template_id: attributes.template_id().to_string(),
            attributes: attributes.to_json()?,
            created_at,
        })
    }
}

/// A persisted job row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Insertion sequence, breaks ties between rows created in the same millisecond.
    pub seq: i64,
    pub request_id: String,
    pub content_id: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub template_id: Option<String>,
    pub attributes: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl JobRecord {
    /// FIFO position key.
    pub fn order_key(&self) -> (i64, i64) {
        (self.created_at, self.seq)
    }

    /// Time of the last status change, or creation time if it never changed.
    pub fn last_changed_at(&self) -> i64 {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Status of a job as seen by a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub status: JobStatus,
    /// Unix milliseconds of the last status change.
    pub timestamp: i64,
    /// Pending or processing jobs ahead of this one, -1 unless pending.
    pub jobs_before: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// A single prompt answered against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    pub prompt: String,
    pub response: String,
}

/// Value produced by a successful template run. Kept in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum JobOutput {
    Perspectives(Vec<Perspective>),
    Tags(Vec<String>),
    Language(String),
    Json(Value),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_status_is_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_status_transitions_are_forward_only() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_collaborators_cannot_start_jobs() {
        use JobStatus::*;
        assert!(!Pending.can_report(Processing));
        assert!(Pending.can_report(Failed));
        assert!(Processing.can_report(Completed));
        assert!(Processing.can_report(Failed));
        assert!(!Processing.can_report(Pending));
    }

    #[test]
    fn test_job_status_db_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_db_str(status.as_db_str()), Some(status));
        }
        assert_eq!(JobStatus::from_db_str("PENDING"), None);
    }

    #[test]
    fn test_request_id_for_kind() {
        assert_eq!(
            JobKind::Language.request_id_for("bafyABC"),
            "req_language_bafyABC"
        );
        assert_eq!(
            JobKind::Perspectives.request_id_for("cid1"),
            "req_perspectives_cid1"
        );
        assert_eq!(JobKind::Tags.request_id_for("cid1"), "req_tags_cid1");
    }

    #[test]
    fn test_random_request_ids_differ() {
        let a = random_request_id();
        let b = random_request_id();
        assert!(a.starts_with("req_custom_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_template_id_parse() {
        assert_eq!(
            TemplateId::parse("tags"),
            TemplateId::Builtin(JobKind::Tags)
        );
        assert_eq!(
            TemplateId::parse("summary"),
            TemplateId::Custom("summary".to_string())
        );
        assert_eq!(TemplateId::custom("summary").as_str(), "summary");
    }

    #[test]
    fn test_attributes_from_stored_builtin() {
        let attrs = JobAttributes::from_stored(
            "perspectives",
            r#"{"contentId":"cid1","prompts":["Who is this for?"]}"#,
        )
        .unwrap();
        assert_eq!(
            attrs,
            JobAttributes::Perspectives(PerspectivesPayload {
                content_id: "cid1".to_string(),
                prompts: vec!["Who is this for?".to_string()],
            })
        );
        assert_eq!(attrs.content_id(), Some("cid1"));
    }

    #[test]
    fn test_attributes_prompts_default_to_empty() {
        let attrs = JobAttributes::from_stored("tags", r#"{"contentId":"cid1"}"#).unwrap();
        match attrs {
            JobAttributes::Tags(p) => assert!(p.prompts.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_attributes_from_stored_rejects_malformed() {
        assert!(matches!(
            JobAttributes::from_stored("language", "not json"),
            Err(AttributesError::Malformed(_))
        ));
        assert!(matches!(
            JobAttributes::from_stored("language", r#"{"contentId":""}"#),
            Err(AttributesError::EmptyContentId)
        ));
        assert!(matches!(
            JobAttributes::from_stored("summary", "[1,2]"),
            Err(AttributesError::InvalidCustomPayload)
        ));
    }

    #[test]
    fn test_content_id_with_url_delimiters_is_rejected() {
        for cid in ["../admin", "doc?raw=1", "doc#frag", "a/b"] {
            let attrs = JobAttributes::Language(LanguagePayload {
                content_id: cid.to_string(),
            });
            assert!(
                matches!(attrs.validate(), Err(AttributesError::InvalidContentId(ref id)) if id == cid),
                "{} should be rejected",
                cid
            );
        }
        let attrs = JobAttributes::Language(LanguagePayload {
            content_id: "doc-42.v2".to_string(),
        });
        assert!(attrs.validate().is_ok());
    }

    #[test]
    fn test_blank_prompt_is_rejected() {
        let attrs = JobAttributes::Tags(TagsPayload {
            content_id: "cid".to_string(),
            prompts: vec!["fine".to_string(), "   ".to_string()],
        });
        assert!(matches!(
            attrs.validate(),
            Err(AttributesError::BlankPrompt(1))
        ));
    }

    #[test]
    fn test_custom_template_cannot_shadow_builtin() {
        let attrs = JobAttributes::Custom {
            template: "tags".to_string(),
            payload: json!({}),
        };
        assert!(matches!(
            attrs.validate(),
            Err(AttributesError::InvalidTemplateName(_))
        ));
    }

    #[test]
    fn test_new_job_serializes_attributes() {
        let attrs = JobAttributes::Custom {
            template: "summary".to_string(),
            payload: json!({"contentId": "cid9", "prompts": ["tl;dr"]}),
        };
        let job = NewJob::new("req_custom_1", &attrs, 42).unwrap();
        assert_eq!(job.template_id, "summary");
        assert_eq!(job.content_id.as_deref(), Some("cid9"));
        assert_eq!(
            JobAttributes::from_stored(&job.template_id, &job.attributes).unwrap(),
            attrs
        );
    }

    #[test]
    fn test_status_view_serialization() {
        let view = JobStatusView {
            status: JobStatus::Pending,
            timestamp: 1_700_000_000_000,
            jobs_before: 2,
            error: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            json!({"status": "pending", "timestamp": 1_700_000_000_000i64, "jobsBefore": 2})
        );
    }

    #[test]
    fn test_job_output_serialization() {
        let output = JobOutput::Language("en".to_string());
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"kind": "language", "value": "en"})
        );
    }
}
