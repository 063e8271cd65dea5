// Store over a hosted PostgREST row API (Supabase-style `/rest/v1`).

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::StoreError,
    models::{JoinedProgress, Lesson, NewLessonRow, ProgressFields, ProgressRecord, Student},
    store::Store,
};

pub struct PostgrestStore {
    http: Client,
    base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct NameRef {
    name: String,
}

#[derive(Deserialize)]
struct TitleRef {
    title: String,
}

#[derive(Deserialize)]
struct JoinedRow {
    #[serde(flatten)]
    record: ProgressRecord,
    students: Option<NameRef>,
    lessons: Option<TitleRef>,
}

impl From<JoinedRow> for JoinedProgress {
    fn from(r: JoinedRow) -> Self {
        JoinedProgress {
            record: r.record,
            student_name: r.students.map(|s| s.name),
            lesson_title: r.lessons.map(|l| l.title),
        }
    }
}

#[derive(Serialize)]
struct ProgressUpsert<'a> {
    student_id: i64,
    lesson_id: i64,
    #[serde(flatten)]
    fields: &'a ProgressFields,
}

impl PostgrestStore {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = Client::builder().gzip(true).build()?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
    }

    async fn rows<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Vec<T>, StoreError> {
        let res = checked(self.authed(req).send().await?).await?;
        Ok(res.json().await?)
    }

    async fn one<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        prefer: &str,
    ) -> Result<T, StoreError> {
        self.rows::<T>(req.header("Prefer", prefer))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyResponse)
    }
}

async fn checked(res: Response) -> Result<Response, StoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}

#[async_trait]
impl Store for PostgrestStore {
    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        let req = self
            .http
            .get(self.table("lessons"))
            .query(&[("select", "*"), ("order", "created_at.desc,id.desc")]);
        self.rows(req).await
    }

    async fn create_lesson(&self, row: NewLessonRow) -> Result<Lesson, StoreError> {
        let req = self.http.post(self.table("lessons")).json(&[row]);
        self.one(req, "return=representation").await
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let req = self
            .http
            .get(self.table("students"))
            .query(&[("select", "id,name"), ("order", "id.asc")]);
        self.rows(req).await
    }

    async fn get_progress(&self, student_id: i64) -> Result<Vec<ProgressRecord>, StoreError> {
        let filter = format!("eq.{student_id}");
        let req = self.http.get(self.table("student_progress")).query(&[
            ("select", "*"),
            ("student_id", filter.as_str()),
            ("order", "id.asc"),
        ]);
        self.rows(req).await
    }

    async fn list_all_progress_joined(&self) -> Result<Vec<JoinedProgress>, StoreError> {
        let req = self
            .http
            .get(self.table("student_progress"))
            .query(&[("select", "*,students(name),lessons(title)"), ("order", "id.asc")]);
        let rows: Vec<JoinedRow> = self.rows(req).await?;
        Ok(rows.into_iter().map(JoinedProgress::from).collect())
    }

    async fn upsert_progress(
        &self,
        student_id: i64,
        lesson_id: i64,
        fields: ProgressFields,
    ) -> Result<ProgressRecord, StoreError> {
        let body = ProgressUpsert {
            student_id,
            lesson_id,
            fields: &fields,
        };
        let req = self
            .http
            .post(self.table("student_progress"))
            .query(&[("on_conflict", "student_id,lesson_id")])
            .json(&[body]);
        self.one(req, "resolution=merge-duplicates,return=representation")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let s = PostgrestStore::new("https://demo.supabase.co/", "anon").unwrap();
        assert_eq!(s.table("lessons"), "https://demo.supabase.co/rest/v1/lessons");
    }

    #[test]
    fn embedded_join_rows_decode() {
        let raw = r#"[{
            "id": 3, "student_id": 1, "lesson_id": 9, "watch_time": 40,
            "total_duration": 120, "completed": false,
            "last_watched": "2024-05-01T10:00:00.123456+00:00",
            "students": {"name": "Ann"}, "lessons": null
        }]"#;
        let rows: Vec<JoinedRow> = serde_json::from_str(raw).unwrap();
        let joined: JoinedProgress = rows.into_iter().next().unwrap().into();
        assert_eq!(joined.record.watch_time, 40);
        assert_eq!(joined.student_name.as_deref(), Some("Ann"));
        assert_eq!(joined.lesson_title, None);
    }

    #[test]
    fn upsert_body_is_flat() {
        let fields = ProgressFields {
            watch_time: 12,
            total_duration: 60,
            completed: false,
            last_watched: crate::stats::fixtures::at(0),
        };
        let v = serde_json::to_value(ProgressUpsert {
            student_id: 1,
            lesson_id: 2,
            fields: &fields,
        })
        .unwrap();
        assert_eq!(v["student_id"], 1);
        assert_eq!(v["watch_time"], 12);
        assert!(v.get("fields").is_none());
    }
}
