//! Client-side viewing session: one player, one sampling timer, one sample
//! stream per selected lesson.
//!
//! A [`Playback`] owns the player and its timer together. Dropping it stops
//! the timer and destroys the player, so every exit path (pause, lesson
//! switch, session drop) releases both.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, RwLock},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    models::ProgressRecord,
    progress::{reconcile, Sample, Saved},
    store::Store,
};

pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Embedded player states; only `Playing` drives sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    /// Map the IFrame API's numeric state codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::Cued),
            _ => None,
        }
    }
}

/// The external time source.
pub trait Player: Send + Sync {
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn destroy(&self);
}

/// Builds players. The returned channel resolves once that instance is ready.
pub trait PlayerFactory: Send + Sync {
    fn load(&self, video_id: &str) -> oneshot::Receiver<Arc<dyn Player>>;
}

pub struct Playback {
    player: Arc<dyn Player>,
    samples: mpsc::UnboundedSender<Sample>,
    period: Duration,
    timer: Option<JoinHandle<()>>,
}

impl Playback {
    pub fn new(player: Arc<dyn Player>, samples: mpsc::UnboundedSender<Sample>) -> Self {
        Self::with_period(player, samples, SAMPLE_PERIOD)
    }

    pub fn with_period(
        player: Arc<dyn Player>,
        samples: mpsc::UnboundedSender<Sample>,
        period: Duration,
    ) -> Self {
        Self {
            player,
            samples,
            period,
            timer: None,
        }
    }

    pub fn on_state_change(&mut self, state: PlayerState) {
        if state == PlayerState::Playing {
            self.start_timer();
        } else {
            self.stop_timer();
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.timer.is_some()
    }

    fn start_timer(&mut self) {
        if self.timer.is_some() {
            return;
        }
        let player = Arc::clone(&self.player);
        let tx = self.samples.clone();
        let period = self.period;
        self.timer = Some(tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // first tick is immediate
            loop {
                tick.tick().await;
                let sample = Sample {
                    current_time: player.current_time(),
                    duration: player.duration(),
                };
                if tx.send(sample).is_err() {
                    break;
                }
            }
        }));
        tracing::debug!("sampling started");
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!("sampling stopped");
        }
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop_timer();
        self.player.destroy();
    }
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("player for video {0:?} never became ready")]
    PlayerUnavailable(String),
}

/// What the UI shows under the player right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchView {
    pub position: i64,
    pub duration: i64,
}

struct Active {
    lesson_id: i64,
    playback: Playback,
    worker: JoinHandle<()>,
}

impl Drop for Active {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// One student's viewing session over the lesson list.
pub struct WatchSession {
    student_id: i64,
    store: Arc<dyn Store>,
    factory: Arc<dyn PlayerFactory>,
    records: Arc<RwLock<HashMap<i64, ProgressRecord>>>,
    view: Arc<RwLock<WatchView>>,
    active: Option<Active>,
}

impl WatchSession {
    /// Load the student's saved progress. A failed read starts from nothing.
    pub async fn open(
        student_id: i64,
        store: Arc<dyn Store>,
        factory: Arc<dyn PlayerFactory>,
    ) -> Self {
        let rows = store.get_progress(student_id).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, student_id, "failed to load progress");
            Vec::new()
        });
        let records = rows.into_iter().map(|r| (r.lesson_id, r)).collect();
        Self {
            student_id,
            store,
            factory,
            records: Arc::new(RwLock::new(records)),
            view: Arc::new(RwLock::new(WatchView::default())),
            active: None,
        }
    }

    pub fn current_lesson(&self) -> Option<i64> {
        self.active.as_ref().map(|a| a.lesson_id)
    }

    pub async fn view(&self) -> WatchView {
        *self.view.read().await
    }

    pub async fn record(&self, lesson_id: i64) -> Option<ProgressRecord> {
        self.records.read().await.get(&lesson_id).cloned()
    }

    /// Tear down the current player, then load one for `lesson_id`.
    pub async fn select_lesson(&mut self, lesson_id: i64, video_id: &str) -> Result<(), WatchError> {
        self.close();

        let saved = self.record(lesson_id).await;
        *self.view.write().await = WatchView {
            position: saved.as_ref().map_or(0, |r| r.watch_time),
            duration: saved.as_ref().map_or(0, |r| r.total_duration),
        };

        let player = self
            .factory
            .load(video_id)
            .await
            .map_err(|_| WatchError::PlayerUnavailable(video_id.to_string()))?;
        tracing::info!(student_id = self.student_id, lesson_id, video_id, "player ready");

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(process_samples(
            self.student_id,
            lesson_id,
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.records),
            Arc::clone(&self.view),
        ));
        self.active = Some(Active {
            lesson_id,
            playback: Playback::new(player, tx),
            worker,
        });
        Ok(())
    }

    pub fn on_state_change(&mut self, state: PlayerState) {
        if let Some(active) = self.active.as_mut() {
            active.playback.on_state_change(state);
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.playback.is_sampling())
    }

    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(lesson_id = active.lesson_id, "closing playback");
        }
    }
}

async fn process_samples(
    student_id: i64,
    lesson_id: i64,
    mut rx: mpsc::UnboundedReceiver<Sample>,
    store: Arc<dyn Store>,
    records: Arc<RwLock<HashMap<i64, ProgressRecord>>>,
    view: Arc<RwLock<WatchView>>,
) {
    while let Some(sample) = rx.recv().await {
        let saved = records.read().await.get(&lesson_id).map(Saved::from);
        let Some(decision) = reconcile(sample, saved) else {
            continue;
        };

        *view.write().await = WatchView {
            position: decision.position,
            duration: decision.total_duration,
        };

        if !decision.should_write {
            continue;
        }
        let fields = decision.fields(Utc::now());
        let store = Arc::clone(&store);
        let records = Arc::clone(&records);
        tokio::spawn(async move {
            match store.upsert_progress(student_id, lesson_id, fields).await {
                Ok(rec) => {
                    records.write().await.insert(lesson_id, rec);
                }
                Err(e) => {
                    tracing::error!(error = %e, student_id, lesson_id, "failed to save progress");
                }
            }
        });
    }
}
