//! # Priority Resolver
//! Pure mapping `(notices, categorized events)` → at most one `PopupCandidate`.
//! No I/O; randomness comes in through an `IndexPicker` so tests can pin it.
//!
//! Policy, first match wins:
//! 1. running AND upcoming events → random pick over both (notices ignored)
//! 2. running events only → first running event
//! 3. upcoming events only → random upcoming event
//! 4. no events → first notice
//! 5. nothing → no popup

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::candidate::{EventCandidate, NoticeCandidate, PopupCandidate};
use crate::categorize::CategorizedEvents;

/// Chooses an index in `0..len`. `len` is never zero when called by the resolver.
pub trait IndexPicker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

/// Thread-local RNG, used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPicker;

impl IndexPicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Reproducible picker over a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededPicker {
    rng: Mutex<StdRng>,
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl IndexPicker for SeededPicker {
    fn pick(&self, len: usize) -> usize {
        let mut g = match self.rng.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        g.random_range(0..len)
    }
}

/// Always returns the same index (clamped by the resolver).
#[derive(Debug, Clone, Copy)]
pub struct FixedPicker(pub usize);

impl IndexPicker for FixedPicker {
    fn pick(&self, _len: usize) -> usize {
        self.0
    }
}

/// Which row of the decision table produced the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    MixedEvents,
    Ongoing,
    Upcoming,
    Notice,
}

impl Tier {
    pub fn number(&self) -> u8 {
        match self {
            Tier::MixedEvents => 1,
            Tier::Ongoing => 2,
            Tier::Upcoming => 3,
            Tier::Notice => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::MixedEvents => "mixed_events",
            Tier::Ongoing => "ongoing",
            Tier::Upcoming => "upcoming",
            Tier::Notice => "notice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub candidate: PopupCandidate,
    pub tier: Tier,
}

pub fn resolve(
    notices: &[NoticeCandidate],
    events: &CategorizedEvents,
    picker: &dyn IndexPicker,
) -> Option<Resolution> {
    let ongoing = &events.ongoing;
    let upcoming = &events.upcoming;

    if !ongoing.is_empty() && !upcoming.is_empty() {
        let pool: Vec<&EventCandidate> = ongoing.iter().chain(upcoming.iter()).collect();
        let chosen = pool[pick_clamped(picker, pool.len())];
        return Some(Resolution {
            candidate: chosen.into(),
            tier: Tier::MixedEvents,
        });
    }

    if let Some(first) = ongoing.first() {
        return Some(Resolution {
            candidate: first.into(),
            tier: Tier::Ongoing,
        });
    }

    if !upcoming.is_empty() {
        let chosen = &upcoming[pick_clamped(picker, upcoming.len())];
        return Some(Resolution {
            candidate: chosen.into(),
            tier: Tier::Upcoming,
        });
    }

    notices.first().map(|n| Resolution {
        candidate: n.into(),
        tier: Tier::Notice,
    })
}

fn pick_clamped(picker: &dyn IndexPicker, len: usize) -> usize {
    picker.pick(len).min(len - 1)
}
