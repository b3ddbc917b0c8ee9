use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Image,
    Video,
    Audio,
    Avatar,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [TaskKind::Image, TaskKind::Video, TaskKind::Audio, TaskKind::Avatar];

    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Image => "image",
            TaskKind::Video => "video",
            TaskKind::Audio => "audio",
            TaskKind::Avatar => "avatar",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(TaskKind::Image),
            "video" => Ok(TaskKind::Video),
            "audio" => Ok(TaskKind::Audio),
            "avatar" => Ok(TaskKind::Avatar),
            other => Err(crate::error::Error::validation(format!("unknown task kind: {}", other))),
        }
    }
}

/// Every creative action that leaves a generation record, sync or async.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Chat,
    Enhance,
    Image,
    Video,
    Audio,
    Avatar,
}

impl Feature {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Feature::Chat => "chat",
            Feature::Enhance => "enhance",
            Feature::Image => "image",
            Feature::Video => "video",
            Feature::Audio => "audio",
            Feature::Avatar => "avatar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(Feature::Chat),
            "enhance" => Some(Feature::Enhance),
            "image" => Some(Feature::Image),
            "video" => Some(Feature::Video),
            "audio" => Some(Feature::Audio),
            "avatar" => Some(Feature::Avatar),
            _ => None,
        }
    }
}

impl From<TaskKind> for Feature {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Image => Feature::Image,
            TaskKind::Video => Feature::Video,
            TaskKind::Audio => Feature::Audio,
            TaskKind::Avatar => Feature::Avatar,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Starting,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled)
    }

    /// Parse a provider status string. Replicate says `succeeded` where we say
    /// `completed`; `queued` is folded into `starting`.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status.trim().to_lowercase().as_str() {
            "starting" | "queued" | "pending" => Some(TaskStatus::Starting),
            "processing" | "running" => Some(TaskStatus::Processing),
            "succeeded" | "completed" | "success" => Some(TaskStatus::Completed),
            "failed" | "error" => Some(TaskStatus::Failed),
            "canceled" | "cancelled" | "aborted" => Some(TaskStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a provider-hosted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub kind: TaskKind,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self { id: id.into(), kind }
    }

    /// Build a handle from an id that came from outside, such as a URL path.
    /// Provider ids are non-empty runs of ASCII letters, digits, `_` and `-`;
    /// anything else would be spliced into a provider URL.
    pub fn parse(id: &str, kind: TaskKind) -> crate::error::Result<Self> {
        let valid = !id.is_empty()
            && id.len() <= 128
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(crate::error::Error::validation(format!("invalid {} task id", kind)));
        }
        Ok(Self::new(id, kind))
    }
}

/// Local mirror of a provider task as of the last poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.id.clone(), self.kind)
    }
}
