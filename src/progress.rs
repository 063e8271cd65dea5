// Watch-progress reconciliation: raw player time -> persisted watched time.

use chrono::{DateTime, Utc};

use crate::models::{ProgressFields, ProgressRecord};

/// Most seconds of credit a single sample may add over the saved value.
pub const MAX_JUMP_SECONDS: i64 = 10;
/// Minimum change in saved seconds that justifies a write.
pub const WRITE_DELTA_SECONDS: i64 = 5;
/// Share of the duration that marks a lesson as completed.
pub const COMPLETION_PERCENT: f64 = 90.0;

/// What the store currently holds for the pair, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Saved {
    pub watch_time: i64,
    pub completed: bool,
}

impl From<&ProgressRecord> for Saved {
    fn from(r: &ProgressRecord) -> Self {
        Saved {
            watch_time: r.watch_time,
            completed: r.completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Rounded raw position, for the local view only.
    pub position: i64,
    pub watch_time: i64,
    pub total_duration: i64,
    pub completed: bool,
    pub should_write: bool,
}

impl Decision {
    pub fn fields(&self, now: DateTime<Utc>) -> ProgressFields {
        ProgressFields {
            watch_time: self.watch_time,
            total_duration: self.total_duration,
            completed: self.completed,
            last_watched: now,
        }
    }
}

fn round_secs(v: f64) -> i64 {
    if v.is_finite() && v > 0.0 {
        v.round() as i64
    } else {
        0
    }
}

/// Reconcile one sample against the saved state.
///
/// Returns `None` when the duration is not known yet; the caller must treat
/// that as "nothing happened".
pub fn reconcile(sample: Sample, existing: Option<Saved>) -> Option<Decision> {
    if !sample.duration.is_finite() || sample.duration <= 0.0 {
        return None;
    }

    let position = round_secs(sample.current_time);
    let total_duration = round_secs(sample.duration);
    let saved = existing.unwrap_or_default();

    let mut watch_time = saved.watch_time;
    if position > saved.watch_time {
        watch_time = position.min(saved.watch_time.saturating_add(MAX_JUMP_SECONDS));
    }
    watch_time = watch_time.min(total_duration);

    let completed =
        saved.completed || (watch_time as f64 / sample.duration) * 100.0 >= COMPLETION_PERCENT;

    let should_write = existing.is_none()
        || (saved.watch_time - watch_time).abs() >= WRITE_DELTA_SECONDS
        || completed != saved.completed;

    Some(Decision {
        position,
        watch_time,
        total_duration,
        completed,
        should_write,
    })
}
