use anyhow::Result;
use async_trait::async_trait;
use sqlx::{query_as, Pool, Postgres};

use crate::{
    error::StoreError,
    models::{JoinedProgress, Lesson, NewLessonRow, ProgressFields, ProgressRecord, Student},
    store::Store,
};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str) -> Result<Db> {
    let pool = Pool::<Postgres>::connect(url).await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Store backed by a Postgres pool with the bundled schema.
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const LESSON_COLS: &str = "id, title, youtube_url, video_id, description, category, duration, \
                           views, completion_rate, created_at";
const PROGRESS_COLS: &str =
    "id, student_id, lesson_id, watch_time, total_duration, completed, last_watched";

#[async_trait]
impl Store for PgStore {
    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        let sql = format!("SELECT {LESSON_COLS} FROM lessons ORDER BY created_at DESC, id DESC");
        Ok(query_as::<_, Lesson>(&sql).fetch_all(&self.db).await?)
    }

    async fn create_lesson(&self, row: NewLessonRow) -> Result<Lesson, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO lessons (title, youtube_url, video_id, description, category, duration, views, completion_rate)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            RETURNING {LESSON_COLS}
            "#
        );
        let lesson = query_as::<_, Lesson>(&sql)
            .bind(row.title)
            .bind(row.youtube_url)
            .bind(row.video_id)
            .bind(row.description)
            .bind(row.category)
            .bind(row.duration)
            .bind(row.views)
            .bind(row.completion_rate)
            .fetch_one(&self.db)
            .await?;
        Ok(lesson)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(query_as::<_, Student>("SELECT id, name FROM students ORDER BY id")
            .fetch_all(&self.db)
            .await?)
    }

    async fn get_progress(&self, student_id: i64) -> Result<Vec<ProgressRecord>, StoreError> {
        let sql =
            format!("SELECT {PROGRESS_COLS} FROM student_progress WHERE student_id=$1 ORDER BY id");
        Ok(query_as::<_, ProgressRecord>(&sql)
            .bind(student_id)
            .fetch_all(&self.db)
            .await?)
    }

    async fn list_all_progress_joined(&self) -> Result<Vec<JoinedProgress>, StoreError> {
        let rows = query_as::<_, JoinedProgress>(
            r#"
            SELECT p.id, p.student_id, p.lesson_id, p.watch_time, p.total_duration,
                   p.completed, p.last_watched,
                   s.name AS student_name, l.title AS lesson_title
            FROM student_progress p
            LEFT JOIN students s ON s.id = p.student_id
            LEFT JOIN lessons l ON l.id = p.lesson_id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn upsert_progress(
        &self,
        student_id: i64,
        lesson_id: i64,
        fields: ProgressFields,
    ) -> Result<ProgressRecord, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO student_progress (student_id, lesson_id, watch_time, total_duration, completed, last_watched)
            VALUES ($1,$2,$3,$4,$5,$6)
            ON CONFLICT (student_id, lesson_id)
            DO UPDATE SET watch_time=EXCLUDED.watch_time,
                          total_duration=EXCLUDED.total_duration,
                          completed=EXCLUDED.completed,
                          last_watched=EXCLUDED.last_watched
            RETURNING {PROGRESS_COLS}
            "#
        );
        let rec = query_as::<_, ProgressRecord>(&sql)
            .bind(student_id)
            .bind(lesson_id)
            .bind(fields.watch_time)
            .bind(fields.total_duration)
            .bind(fields.completed)
            .bind(fields.last_watched)
            .fetch_one(&self.db)
            .await?;
        Ok(rec)
    }
}
