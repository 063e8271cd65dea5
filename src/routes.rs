use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use crate::{
    error::{ApiError, StoreError},
    models::*,
    progress::{self, Sample, Saved},
    stats,
    store::Store,
    video,
};

pub type SharedStore = Arc<dyn Store>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        // tutor
        .route("/api/lessons", get(list_lessons).post(create_lesson))
        .route("/api/progress", get(list_all_progress))
        .route("/api/dashboard", get(dashboard))
        // student
        .route("/api/students", get(list_students))
        .route("/api/students/:student_id/progress", get(student_progress))
        .route("/api/students/:student_id/overview", get(student_overview))
        .route(
            "/api/students/:student_id/progress/:lesson_id",
            put(upsert_progress),
        )
        .route(
            "/api/students/:student_id/lessons/:lesson_id/samples",
            post(record_sample),
        )
        .with_state(store)
}

async fn list_lessons(State(store): State<SharedStore>) -> Json<Vec<Lesson>> {
    Json(or_empty("lessons", store.list_lessons().await))
}

async fn create_lesson(
    State(store): State<SharedStore>,
    Json(req): Json<CreateLessonReq>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    let title = req.title.trim();
    let url = req.youtube_url.trim();
    if title.is_empty() || url.is_empty() {
        return Err(ApiError::BadRequest("title and youtube_url are required".into()));
    }

    let video_id = video::extract_video_id(url);
    if video_id.is_empty() {
        tracing::warn!(url, "no video id in lesson url");
    }
    let row = NewLessonRow {
        title: title.to_string(),
        youtube_url: url.to_string(),
        video_id,
        description: req.description,
        category: req.category,
        duration: req
            .duration
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DURATION_LABEL.to_string()),
        views: 0,
        completion_rate: 0.0,
    };

    let lesson = store.create_lesson(row).await?;
    tracing::info!(lesson_id = lesson.id, "lesson created");
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn list_students(State(store): State<SharedStore>) -> Json<Vec<Student>> {
    Json(or_empty("students", store.list_students().await))
}

async fn student_progress(
    State(store): State<SharedStore>,
    Path(student_id): Path<i64>,
) -> Json<Vec<ProgressRecord>> {
    Json(or_empty("progress", store.get_progress(student_id).await))
}

async fn student_overview(
    State(store): State<SharedStore>,
    Path(student_id): Path<i64>,
) -> Json<stats::StudentProgressView> {
    let lessons = or_empty("lessons", store.list_lessons().await);
    let rows = or_empty("progress", store.get_progress(student_id).await);
    Json(stats::student_progress_view(student_id, &lessons, &rows))
}

async fn list_all_progress(State(store): State<SharedStore>) -> Json<Vec<JoinedProgress>> {
    Json(or_empty("joined progress", store.list_all_progress_joined().await))
}

async fn dashboard(State(store): State<SharedStore>) -> Json<stats::Dashboard> {
    let lessons = or_empty("lessons", store.list_lessons().await);
    let students = or_empty("students", store.list_students().await);
    let rows: Vec<ProgressRecord> = or_empty("joined progress", store.list_all_progress_joined().await)
        .into_iter()
        .map(|j| j.record)
        .collect();
    Json(stats::dashboard(&lessons, &students, &rows))
}

async fn upsert_progress(
    State(store): State<SharedStore>,
    Path((student_id, lesson_id)): Path<(i64, i64)>,
    Json(fields): Json<ProgressFields>,
) -> Result<Json<ProgressRecord>, ApiError> {
    if fields.watch_time < 0 || fields.watch_time > fields.total_duration {
        return Err(ApiError::BadRequest(
            "watch_time must be between 0 and total_duration".into(),
        ));
    }

    let existing = store
        .get_progress(student_id)
        .await?
        .into_iter()
        .find(|r| r.lesson_id == lesson_id);
    if let Some(prev) = &existing {
        if fields.watch_time < prev.watch_time || (prev.completed && !fields.completed) {
            return Err(ApiError::BadRequest(
                "progress cannot move backwards".into(),
            ));
        }
    }
    Ok(Json(store.upsert_progress(student_id, lesson_id, fields).await?))
}

/// One player tick: reconcile against the saved row and write if the gate fires.
async fn record_sample(
    State(store): State<SharedStore>,
    Path((student_id, lesson_id)): Path<(i64, i64)>,
    Json(req): Json<PlaybackSampleReq>,
) -> Result<Json<PlaybackSampleResp>, ApiError> {
    let existing = store
        .get_progress(student_id)
        .await?
        .into_iter()
        .find(|r| r.lesson_id == lesson_id);

    let sample = Sample {
        current_time: req.current_time,
        duration: req.duration,
    };
    let Some(decision) = progress::reconcile(sample, existing.as_ref().map(Saved::from)) else {
        return Ok(Json(PlaybackSampleResp {
            accepted: false,
            watch_time: existing.as_ref().map_or(0, |r| r.watch_time),
            completed: existing.as_ref().is_some_and(|r| r.completed),
            written: false,
            record: existing,
        }));
    };

    let record = if decision.should_write {
        let rec = store
            .upsert_progress(student_id, lesson_id, decision.fields(Utc::now()))
            .await?;
        tracing::debug!(student_id, lesson_id, watch_time = rec.watch_time, "progress saved");
        Some(rec)
    } else {
        existing
    };

    Ok(Json(PlaybackSampleResp {
        accepted: true,
        watch_time: decision.watch_time,
        completed: decision.completed,
        written: decision.should_write,
        record,
    }))
}

// --- helpers ---
fn or_empty<T>(what: &str, res: Result<Vec<T>, StoreError>) -> Vec<T> {
    res.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to fetch {what}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::store::MemStore;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_of<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn seeded() -> (Router, Arc<MemStore>) {
        let mem = Arc::new(MemStore::new());
        mem.add_student("Ann").await;
        (router(mem.clone()), mem)
    }

    #[tokio::test]
    async fn create_lesson_requires_title_and_url() {
        let (app, _) = seeded().await;
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({"title": "  ", "youtube_url": "https://youtu.be/x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_lesson_tolerates_bad_url() {
        let (app, _) = seeded().await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({"title": "Fractions", "youtube_url": "not a link", "category": "math"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let lesson: Lesson = json_of(&body);
        assert_eq!(lesson.video_id, "");
        assert_eq!(lesson.duration, DEFAULT_DURATION_LABEL);

        let (_, body) = call(&app, Method::GET, "/api/lessons", None).await;
        let lessons: Vec<Lesson> = json_of(&body);
        assert_eq!(lessons.len(), 1);
    }

    #[tokio::test]
    async fn samples_write_only_when_gated() {
        let (app, mem) = seeded().await;
        let uri = "/api/students/1/lessons/7/samples";

        let (_, body) = call(&app, Method::POST, uri, Some(json!({"current_time": 0.0, "duration": 0.0}))).await;
        let r: PlaybackSampleResp = json_of(&body);
        assert!(!r.accepted && !r.written);

        let (_, body) = call(&app, Method::POST, uri, Some(json!({"current_time": 500.0, "duration": 600.0}))).await;
        let r: PlaybackSampleResp = json_of(&body);
        assert!(r.written);
        assert_eq!(r.watch_time, 10);

        let (_, body) = call(&app, Method::POST, uri, Some(json!({"current_time": 13.2, "duration": 600.0}))).await;
        let r: PlaybackSampleResp = json_of(&body);
        assert!(!r.written);
        assert_eq!(r.watch_time, 13);

        let rows = mem.get_progress(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].watch_time, 10);
        assert_eq!(rows[0].total_duration, 600);
    }

    #[tokio::test]
    async fn dashboard_and_overview_reflect_progress() {
        let (app, mem) = seeded().await;
        call(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({"title": "A", "youtube_url": "https://youtu.be/a"})),
        )
        .await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/students/1/progress/1",
            Some(json!({"watch_time": 60, "total_duration": 60, "completed": true, "last_watched": "2024-05-01T10:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mem.get_progress(1).await.unwrap().len(), 1);

        let (_, body) = call(&app, Method::GET, "/api/dashboard", None).await;
        let d: Value = json_of(&body);
        assert_eq!(d["total_lessons"], 1);
        assert_eq!(d["total_views"], 1);
        assert_eq!(d["avg_completion_rate"], 100.0);
        assert_eq!(d["students"][0]["progress"], 100);

        let (_, body) = call(&app, Method::GET, "/api/students/1/overview", None).await;
        let o: Value = json_of(&body);
        assert_eq!(o["lessons"][0]["percentage"], 100);
        assert_eq!(o["lessons"][0]["completed"], true);
    }

    #[tokio::test]
    async fn upsert_rejects_watch_time_past_duration() {
        let (app, _) = seeded().await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/students/1/progress/1",
            Some(json!({"watch_time": 61, "total_duration": 60, "completed": false, "last_watched": "2024-05-01T10:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upsert_refuses_to_lower_saved_progress() {
        let (app, mem) = seeded().await;
        let uri = "/api/students/1/progress/3";
        let (status, _) = call(
            &app,
            Method::PUT,
            uri,
            Some(json!({"watch_time": 600, "total_duration": 600, "completed": true, "last_watched": "2024-05-01T10:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        for body in [
            json!({"watch_time": 5, "total_duration": 600, "completed": false, "last_watched": "2024-05-02T10:00:00Z"}),
            json!({"watch_time": 600, "total_duration": 600, "completed": false, "last_watched": "2024-05-02T10:00:00Z"}),
        ] {
            let (status, _) = call(&app, Method::PUT, uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let rows = mem.get_progress(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].watch_time, 600);
        assert!(rows[0].completed);
    }

    struct DownStore;

    #[async_trait]
    impl Store for DownStore {
        async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
            Err(StoreError::EmptyResponse)
        }
        async fn create_lesson(&self, _row: NewLessonRow) -> Result<Lesson, StoreError> {
            Err(StoreError::EmptyResponse)
        }
        async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
            Err(StoreError::EmptyResponse)
        }
        async fn get_progress(&self, _student_id: i64) -> Result<Vec<ProgressRecord>, StoreError> {
            Err(StoreError::EmptyResponse)
        }
        async fn list_all_progress_joined(&self) -> Result<Vec<JoinedProgress>, StoreError> {
            Err(StoreError::EmptyResponse)
        }
        async fn upsert_progress(
            &self,
            _student_id: i64,
            _lesson_id: i64,
            _fields: ProgressFields,
        ) -> Result<ProgressRecord, StoreError> {
            Err(StoreError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn reads_degrade_to_empty_and_writes_fail_generically() {
        let app = router(Arc::new(DownStore));

        for uri in ["/api/lessons", "/api/students", "/api/progress", "/api/students/1/progress"] {
            let (status, body) = call(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, b"[]", "{uri}");
        }

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({"title": "A", "youtube_url": "https://youtu.be/a"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"failed to save changes");
    }
}
