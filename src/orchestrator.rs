//! # Popup Orchestrator
//! Ties the pieces together for one visit:
//! settle delay → fetch both streams → filter → categorize → resolve → suppression check.
//!
//! `PopupEngine::decide` is the synchronous core and has no I/O besides the
//! suppression read. `PopupEngine::start` runs the full cycle on a tokio task and
//! hands back a `PopupHandle` that owns teardown and dismissal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::candidate::PopupCandidate;
use crate::categorize::categorize;
use crate::config::PopupConfig;
use crate::content::{fetch_both, ContentSource, Fetched};
use crate::resolver::{resolve, IndexPicker, RandomPicker, Tier};
use crate::suppression::SuppressionStore;
use crate::validate::{filter_events, filter_notices, DEFAULT_NOTICE_MAX_AGE_DAYS};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Source of "now". Injected so TTL and recency checks can be pinned in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("popup_evaluations_total", "Popup evaluations run.");
        describe_counter!(
            "popup_resolved_total",
            "Evaluations that produced a candidate, by tier."
        );
        describe_counter!(
            "popup_suppressed_total",
            "Candidates withheld by the suppression window."
        );
        describe_counter!("popup_dismissals_total", "Popups dismissed by the user.");
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupState {
    Idle,
    Evaluating,
    Resolved(Option<PopupCandidate>),
    /// Torn down before a decision was reached.
    Cancelled,
}

impl PopupState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PopupState::Resolved(_) | PopupState::Cancelled)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub show: bool,
    pub candidate: Option<PopupCandidate>,
    #[serde(serialize_with = "tier_number")]
    pub tier: Option<Tier>,
}

fn tier_number<S: serde::Serializer>(tier: &Option<Tier>, s: S) -> Result<S::Ok, S::Error> {
    match tier {
        Some(t) => s.serialize_some(&t.number()),
        None => s.serialize_none(),
    }
}

pub struct PopupEngine {
    source: Arc<dyn ContentSource>,
    store: SuppressionStore,
    picker: Arc<dyn IndexPicker>,
    clock: Clock,
    settle_delay: Duration,
    notice_max_age_days: i64,
}

impl PopupEngine {
    pub fn new(source: Arc<dyn ContentSource>, store: SuppressionStore) -> Self {
        Self {
            source,
            store,
            picker: Arc::new(RandomPicker),
            clock: system_clock(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            notice_max_age_days: DEFAULT_NOTICE_MAX_AGE_DAYS,
        }
    }

    pub fn from_config(
        cfg: &PopupConfig,
        source: Arc<dyn ContentSource>,
        store: SuppressionStore,
    ) -> Self {
        Self::new(source, store)
            .with_settle_delay(cfg.settle_delay())
            .with_notice_max_age_days(cfg.notice_max_age_days)
    }

    pub fn with_picker(mut self, picker: Arc<dyn IndexPicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_notice_max_age_days(mut self, days: i64) -> Self {
        self.notice_max_age_days = days;
        self
    }

    pub fn store(&self) -> &SuppressionStore {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Filter, categorize, resolve, then ask the engine's own store about the winner.
    pub fn decide(&self, fetched: Fetched, now: DateTime<Utc>) -> Evaluation {
        self.decide_with(&self.store, fetched, now)
    }

    /// Same as `decide`, checking suppression against `store`. The HTTP surface
    /// passes a store over the requesting visitor's cookies.
    pub fn decide_with(
        &self,
        store: &SuppressionStore,
        fetched: Fetched,
        now: DateTime<Utc>,
    ) -> Evaluation {
        ensure_metrics_described();
        counter!("popup_evaluations_total").increment(1);

        let notices = filter_notices(fetched.notices, now, self.notice_max_age_days);
        let events = categorize(filter_events(fetched.events));

        let Some(res) = resolve(&notices, &events, self.picker.as_ref()) else {
            tracing::debug!(target: "popup", "no eligible candidate");
            return Evaluation {
                show: false,
                candidate: None,
                tier: None,
            };
        };

        counter!("popup_resolved_total", "tier" => res.tier.label()).increment(1);

        let cand = res.candidate;
        if !store.should_show(&cand.id, cand.kind, now) {
            counter!("popup_suppressed_total").increment(1);
            tracing::info!(target: "popup", id = %cand.id, kind = cand.kind.as_str(), tier = res.tier.number(), "candidate suppressed");
            return Evaluation {
                show: false,
                candidate: None,
                tier: Some(res.tier),
            };
        }

        tracing::info!(target: "popup", id = %cand.id, kind = cand.kind.as_str(), tier = res.tier.number(), "popup selected");
        Evaluation {
            show: true,
            candidate: Some(cand),
            tier: Some(res.tier),
        }
    }

    /// Fetch and decide immediately, without the settle delay.
    pub async fn evaluate_now(&self) -> Evaluation {
        self.evaluate_with(&self.store).await
    }

    pub async fn evaluate_with(&self, store: &SuppressionStore) -> Evaluation {
        let fetched = fetch_both(self.source.as_ref()).await;
        self.decide_with(store, fetched, self.now())
    }

    /// Run one full cycle in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> PopupHandle {
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(PopupState::Idle);
        let tx = Arc::new(tx);

        let engine = Arc::clone(self);
        let task_token = token.clone();
        let task_tx = Arc::clone(&tx);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(engine.settle_delay) => {}
            }

            let started = task_tx.send_if_modified(|s| match s {
                PopupState::Idle => {
                    *s = PopupState::Evaluating;
                    true
                }
                _ => false,
            });
            if !started {
                return;
            }

            let fetched = tokio::select! {
                biased;
                _ = task_token.cancelled() => return,
                f = fetch_both(engine.source.as_ref()) => f,
            };
            if task_token.is_cancelled() {
                return;
            }
            let eval = engine.decide(fetched, engine.now());

            // A teardown that raced us has already marked the state Cancelled.
            task_tx.send_if_modified(|s| match s {
                PopupState::Evaluating => {
                    *s = PopupState::Resolved(eval.candidate);
                    true
                }
                _ => false,
            });
        });

        PopupHandle {
            state_tx: tx,
            state_rx: rx,
            token,
            store: self.store.clone(),
            clock: Arc::clone(&self.clock),
            dismissed: AtomicBool::new(false),
        }
    }
}

/// Owned by the display side for the lifetime of one page view.
/// Dropping it tears the evaluation down.
pub struct PopupHandle {
    state_tx: Arc<watch::Sender<PopupState>>,
    state_rx: watch::Receiver<PopupState>,
    token: CancellationToken,
    store: SuppressionStore,
    clock: Clock,
    dismissed: AtomicBool,
}

impl PopupHandle {
    pub fn state(&self) -> PopupState {
        self.state_rx.borrow().clone()
    }

    /// Candidate to display, if the cycle resolved to one.
    pub fn candidate(&self) -> Option<PopupCandidate> {
        match &*self.state_rx.borrow() {
            PopupState::Resolved(c) => c.clone(),
            _ => None,
        }
    }

    /// Wait until the cycle resolves or is cancelled.
    pub async fn settled(&self) -> PopupState {
        let mut rx = self.state_rx.clone();
        let out = match rx.wait_for(PopupState::is_terminal).await {
            Ok(s) => (*s).clone(),
            Err(_) => self.state(),
        };
        out
    }

    /// Teardown. Idempotent; a resolved state is left as is.
    pub fn cancel(&self) {
        self.token.cancel();
        self.state_tx.send_if_modified(|s| match s {
            PopupState::Idle | PopupState::Evaluating => {
                *s = PopupState::Cancelled;
                true
            }
            _ => false,
        });
    }

    /// Record that the user closed the shown popup.
    /// Returns `Ok(false)` when nothing was shown or it was already dismissed.
    pub fn dismiss(&self) -> Result<bool> {
        let Some(cand) = self.candidate() else {
            return Ok(false);
        };
        if self
            .dismissed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        if let Err(e) = self.store.write(&cand.id, cand.kind, (self.clock)()) {
            self.dismissed.store(false, Ordering::Release);
            return Err(e);
        }
        ensure_metrics_described();
        counter!("popup_dismissals_total").increment(1);
        Ok(true)
    }
}

impl Drop for PopupHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateKind, EventCandidate, EventStatus, NoticeCandidate};
    use crate::content::fixture::FixtureContentSource;
    use crate::resolver::FixedPicker;
    use crate::storage::MemoryKv;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    fn engine(src: FixtureContentSource) -> PopupEngine {
        let store = SuppressionStore::new(Arc::new(MemoryKv::new()), 8 * 3600);
        PopupEngine::new(Arc::new(src), store)
            .with_picker(Arc::new(FixedPicker(0)))
            .with_clock(Arc::new(t0))
    }

    fn notice(id: &str, age_days: i64) -> NoticeCandidate {
        NoticeCandidate {
            id: id.into(),
            title: id.into(),
            image_url: Some("flyer.png".into()),
            description: None,
            created_at: Some(t0() - ChronoDuration::days(age_days)),
        }
    }

    fn event(id: &str, status: EventStatus) -> EventCandidate {
        EventCandidate {
            id: id.into(),
            title: id.into(),
            image_url: Some("e.jpg".into()),
            description: None,
            status,
        }
    }

    #[test]
    fn decide_picks_notice_when_no_events() {
        let e = engine(FixtureContentSource::default());
        let eval = e.decide(
            Fetched {
                notices: vec![notice("n1", 3)],
                events: vec![],
            },
            t0(),
        );
        assert!(eval.show);
        assert_eq!(eval.tier, Some(Tier::Notice));
        assert_eq!(eval.candidate.unwrap().kind, CandidateKind::Notice);
    }

    #[test]
    fn decide_reports_suppression() {
        let e = engine(FixtureContentSource::default());
        e.store()
            .write("u1", CandidateKind::Event, t0() - ChronoDuration::hours(1))
            .unwrap();
        let eval = e.decide(
            Fetched {
                notices: vec![],
                events: vec![event("u1", EventStatus::Upcoming)],
            },
            t0(),
        );
        assert!(!eval.show);
        assert!(eval.candidate.is_none());
        assert_eq!(eval.tier, Some(Tier::Upcoming));
    }

    #[test]
    fn evaluation_json_shape() {
        let eval = Evaluation {
            show: true,
            candidate: None,
            tier: Some(Tier::Ongoing),
        };
        let v = serde_json::to_value(&eval).unwrap();
        assert_eq!(v["tier"], 2);
        assert_eq!(v["show"], true);
    }

    #[test]
    fn decide_with_checks_the_given_store_only() {
        let e = engine(FixtureContentSource::default());
        e.store()
            .write("r1", CandidateKind::Event, t0() - ChronoDuration::hours(1))
            .unwrap();
        let other = SuppressionStore::new(Arc::new(MemoryKv::new()), 8 * 3600);
        let fetched = || Fetched {
            notices: vec![],
            events: vec![event("r1", EventStatus::Running)],
        };
        assert!(e.decide_with(&other, fetched(), t0()).show);
        assert!(!e.decide(fetched(), t0()).show);
    }

    #[tokio::test]
    async fn evaluate_now_uses_source() {
        let src = FixtureContentSource::new(vec![], vec![event("r1", EventStatus::Running)]);
        let eval = engine(src).evaluate_now().await;
        assert_eq!(eval.candidate.unwrap().id, "r1");
    }
}
