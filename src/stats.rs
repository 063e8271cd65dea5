use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Lesson, ProgressRecord, Student};

/// Rows with any watched time at all.
pub fn total_views(rows: &[ProgressRecord]) -> usize {
    rows.iter().filter(|r| r.watch_time > 0).count()
}

/// Mean of per-lesson `sum(watched) / sum(duration) * 100`.
///
/// Lessons whose summed duration is zero do not count towards the mean.
pub fn average_completion_rate(rows: &[ProgressRecord]) -> f64 {
    let mut per_lesson: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
    for r in rows {
        let e = per_lesson.entry(r.lesson_id).or_default();
        e.0 = e.0.saturating_add(r.watch_time);
        e.1 = e.1.saturating_add(r.total_duration);
    }

    let rates: Vec<f64> = per_lesson
        .values()
        .filter(|(_, total)| *total > 0)
        .map(|(watched, total)| *watched as f64 / *total as f64 * 100.0)
        .collect();

    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

pub fn overall_progress(completed: usize, total_lessons: usize) -> i64 {
    if total_lessons == 0 {
        return 0;
    }
    (completed as f64 / total_lessons as f64 * 100.0).round() as i64
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StudentOverview {
    pub id: i64,
    pub name: String,
    pub progress: i64,
    pub lessons_completed: usize,
    pub total_lessons: usize,
}

pub fn student_overview(
    student: &Student,
    rows: &[ProgressRecord],
    total_lessons: usize,
) -> StudentOverview {
    let lessons_completed = rows
        .iter()
        .filter(|r| r.student_id == student.id && r.completed)
        .count();
    StudentOverview {
        id: student.id,
        name: student.name.clone(),
        progress: overall_progress(lessons_completed, total_lessons),
        lessons_completed,
        total_lessons,
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub total_lessons: usize,
    pub total_students: usize,
    pub total_views: usize,
    pub avg_completion_rate: f64,
    pub students: Vec<StudentOverview>,
}

pub fn dashboard(lessons: &[Lesson], students: &[Student], rows: &[ProgressRecord]) -> Dashboard {
    Dashboard {
        total_lessons: lessons.len(),
        total_students: students.len(),
        total_views: total_views(rows),
        avg_completion_rate: average_completion_rate(rows),
        students: students
            .iter()
            .map(|s| student_overview(s, rows, lessons.len()))
            .collect(),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LessonProgress {
    pub lesson_id: i64,
    pub title: String,
    pub category: String,
    pub percentage: i64,
    pub completed: bool,
    pub watch_time: i64,
    pub total_duration: i64,
    pub last_watched: Option<DateTime<Utc>>,
}

pub fn lesson_progress(lesson: &Lesson, rows: &[ProgressRecord]) -> LessonProgress {
    let rec = rows.iter().find(|r| r.lesson_id == lesson.id);
    let (watch_time, total_duration) = rec.map_or((0, 0), |r| (r.watch_time, r.total_duration));
    let percentage = if total_duration > 0 {
        (watch_time as f64 / total_duration as f64 * 100.0).round() as i64
    } else {
        0
    };
    LessonProgress {
        lesson_id: lesson.id,
        title: lesson.title.clone(),
        category: lesson.category.clone(),
        percentage,
        completed: rec.is_some_and(|r| r.completed),
        watch_time,
        total_duration,
        last_watched: rec.map(|r| r.last_watched),
    }
}

/// Student-side view: overall percentage plus one entry per lesson.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StudentProgressView {
    pub student_id: i64,
    pub progress: i64,
    pub lessons_completed: usize,
    pub total_lessons: usize,
    pub lessons: Vec<LessonProgress>,
}

pub fn student_progress_view(
    student_id: i64,
    lessons: &[Lesson],
    rows: &[ProgressRecord],
) -> StudentProgressView {
    let lessons_completed = rows.iter().filter(|r| r.completed).count();
    StudentProgressView {
        student_id,
        progress: overall_progress(lessons_completed, lessons.len()),
        lessons_completed,
        total_lessons: lessons.len(),
        lessons: lessons.iter().map(|l| lesson_progress(l, rows)).collect(),
    }
}
