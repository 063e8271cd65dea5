use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{JoinedProgress, Lesson, NewLessonRow, ProgressFields, ProgressRecord, Student},
};

/// Row-level operations the dashboard needs from its backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Newest first.
    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError>;
    async fn create_lesson(&self, row: NewLessonRow) -> Result<Lesson, StoreError>;
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    async fn get_progress(&self, student_id: i64) -> Result<Vec<ProgressRecord>, StoreError>;
    async fn list_all_progress_joined(&self) -> Result<Vec<JoinedProgress>, StoreError>;
    /// Insert or overwrite the single row keyed by (student_id, lesson_id).
    async fn upsert_progress(
        &self,
        student_id: i64,
        lesson_id: i64,
        fields: ProgressFields,
    ) -> Result<ProgressRecord, StoreError>;
}

#[derive(Default)]
struct Tables {
    lessons: Vec<Lesson>,
    students: Vec<Student>,
    progress: HashMap<(i64, i64), ProgressRecord>,
    next_lesson_id: i64,
    next_progress_id: i64,
}

/// Process-local store, for tests and `STORE=memory` runs.
#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, name: impl Into<String>) -> Student {
        let mut t = self.tables.write().await;
        let student = Student {
            id: t.students.len() as i64 + 1,
            name: name.into(),
        };
        t.students.push(student.clone());
        student
    }
}

#[async_trait]
impl Store for MemStore {
    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        let t = self.tables.read().await;
        let mut lessons = t.lessons.clone();
        lessons.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(lessons)
    }

    async fn create_lesson(&self, row: NewLessonRow) -> Result<Lesson, StoreError> {
        let mut t = self.tables.write().await;
        t.next_lesson_id += 1;
        let lesson = Lesson {
            id: t.next_lesson_id,
            title: row.title,
            youtube_url: row.youtube_url,
            video_id: row.video_id,
            description: row.description,
            category: row.category,
            duration: row.duration,
            views: row.views,
            completion_rate: row.completion_rate,
            created_at: Utc::now(),
        };
        t.lessons.push(lesson.clone());
        Ok(lesson)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.tables.read().await.students.clone())
    }

    async fn get_progress(&self, student_id: i64) -> Result<Vec<ProgressRecord>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .progress
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn list_all_progress_joined(&self) -> Result<Vec<JoinedProgress>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<_> = t
            .progress
            .values()
            .map(|r| JoinedProgress {
                record: r.clone(),
                student_name: t
                    .students
                    .iter()
                    .find(|s| s.id == r.student_id)
                    .map(|s| s.name.clone()),
                lesson_title: t
                    .lessons
                    .iter()
                    .find(|l| l.id == r.lesson_id)
                    .map(|l| l.title.clone()),
            })
            .collect();
        rows.sort_by_key(|r| r.record.id);
        Ok(rows)
    }

    async fn upsert_progress(
        &self,
        student_id: i64,
        lesson_id: i64,
        fields: ProgressFields,
    ) -> Result<ProgressRecord, StoreError> {
        let mut t = self.tables.write().await;
        let id = match t.progress.get(&(student_id, lesson_id)) {
            Some(existing) => existing.id,
            None => {
                t.next_progress_id += 1;
                t.next_progress_id
            }
        };
        let rec = ProgressRecord {
            id,
            student_id,
            lesson_id,
            watch_time: fields.watch_time,
            total_duration: fields.total_duration,
            completed: fields.completed,
            last_watched: fields.last_watched,
        };
        t.progress.insert((student_id, lesson_id), rec.clone());
        Ok(rec)
    }
}
