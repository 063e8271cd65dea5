use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_LABEL: &str = "ไม่ระบุ";

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub youtube_url: String,
    pub video_id: String,
    pub description: String,
    pub category: String,
    pub duration: String, // display label, not the player duration
    pub views: i64,
    pub completion_rate: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: i64,
    pub name: String,
}

/// Persisted watch state for one (student, lesson) pair.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub id: i64,
    pub student_id: i64,
    pub lesson_id: i64,
    pub watch_time: i64,
    pub total_duration: i64,
    pub completed: bool,
    pub last_watched: DateTime<Utc>,
}

/// Progress row joined with the names a tutor needs to read it.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinedProgress {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: ProgressRecord,
    pub student_name: Option<String>,
    pub lesson_title: Option<String>,
}

/// Columns written by an upsert; the key travels separately.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressFields {
    pub watch_time: i64,
    pub total_duration: i64,
    pub completed: bool,
    pub last_watched: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateLessonReq {
    pub title: String,
    pub youtube_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Validated lesson row ready for insertion.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewLessonRow {
    pub title: String,
    pub youtube_url: String,
    pub video_id: String,
    pub description: String,
    pub category: String,
    pub duration: String,
    pub views: i64,
    pub completion_rate: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PlaybackSampleReq {
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlaybackSampleResp {
    /// False when the duration was unknown and the sample was dropped.
    pub accepted: bool,
    pub watch_time: i64,
    pub completed: bool,
    pub written: bool,
    pub record: Option<ProgressRecord>,
}
