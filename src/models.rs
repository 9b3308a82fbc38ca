use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─── Sparks ─────────────────────────────────────────────────────────────────

/// One immutable entry in a spark's edit history. Versions for a lineage
/// form a linear chain from the root (`parent_id == None`) to the head.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SparkVersion {
    pub id: String,
    pub root_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Mutable per-lineage pointer to the current version, plus the optional
/// human title. Title edits do not count as content updates and leave
/// `updated_at` untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SparkHead {
    pub root_id: String,
    pub head_id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStatus {
    Routed,
    Unrouted,
}

impl RoutingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Unrouted => "unrouted",
        }
    }
}

/// Mutable per-lineage notebook assignment. `notebook_id == None` means the
/// spark sits in the inbox; the row itself always exists for a live lineage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SparkRouting {
    pub root_id: String,
    pub notebook_id: Option<String>,
    pub routed_at: DateTime<Utc>,
}

/// Denormalized spark view consumed by the UI: head + current content +
/// routing in one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SparkWithMeta {
    pub root_id: String,
    pub head_id: String,
    pub content: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub routing_status: RoutingStatus,
    pub notebook_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSparkPayload {
    pub content: String,
    pub title: Option<String>,
    pub notebook_id: Option<String>,
}

// ─── Notebooks ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocMark {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, serde_json::Value>>,
}

/// Generic rich-text document node. Any conforming editor representation
/// round-trips through this shape provided node order, nesting, and mark
/// lists are preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocNode {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<DocNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<DocMark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub name: String,
    pub body: Option<DocNode>,
    pub parent_notebook_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directed cross-link between two notebooks, distinct from the
/// parent/child tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookReference {
    pub notebook_id: String,
    pub referenced_notebook_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookWithRelations {
    #[serde(flatten)]
    pub notebook: Notebook,
    pub child_ids: Vec<String>,
    pub reference_ids: Vec<String>,
    pub backlink_ids: Vec<String>,
    pub routed_spark_root_ids: Vec<String>,
    pub spark_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotebookPayload {
    pub name: String,
    pub parent_notebook_id: Option<String>,
}

// ─── Conversations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation belongs to exactly one notebook. `saved == false` marks it
/// ephemeral; unsaved conversations expire 30 days after their last update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub notebook_id: String,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

// ─── AI context / payloads ──────────────────────────────────────────────────

/// Grounding context for a chat turn. When `selected_text` is present it
/// takes precedence over the serialized notebook body.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    pub notebook_name: String,
    pub notebook_body: Option<String>,
    pub selected_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    pub notebook_name: String,
    pub notebook_body: Option<String>,
    pub selected_text: Option<String>,
    pub user_request: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResult {
    pub suggestion: String,
    pub original_text: Option<String>,
}
