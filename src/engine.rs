use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ControlError;
use crate::source::ImageRecord;

/// Length of the wipe between two images.
pub const DEFAULT_TRANSITION: Duration = Duration::from_millis(1200);

/// Upper bound on how many recently shown indices are remembered and avoided.
const MAX_RECENT: usize = 10;

/// Auto-advance periods offered by the speed selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum PlaybackInterval {
    Three,
    #[default]
    Five,
    Eight,
    Ten,
}

impl PlaybackInterval {
    pub const ALL: [Self; 4] = [Self::Three, Self::Five, Self::Eight, Self::Ten];

    pub const fn as_millis(self) -> u64 {
        match self {
            Self::Three => 3_000,
            Self::Five => 5_000,
            Self::Eight => 8_000,
            Self::Ten => 10_000,
        }
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    /// Label shown in the speed selector.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Three => "3s",
            Self::Five => "5s",
            Self::Eight => "8s",
            Self::Ten => "10s",
        }
    }
}

impl TryFrom<u64> for PlaybackInterval {
    type Error = ControlError;

    fn try_from(ms: u64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_millis() == ms)
            .ok_or(ControlError::UnsupportedInterval(ms))
    }
}

impl From<PlaybackInterval> for u64 {
    fn from(interval: PlaybackInterval) -> Self {
        interval.as_millis()
    }
}

/// Read-only view of the engine published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub current_index: usize,
    pub next_index: Option<usize>,
    pub is_transitioning: bool,
    pub is_playing: bool,
    pub interval_ms: u64,
    pub image_count: usize,
    pub transition_ms: u64,
}

/// Slide rotation state machine.
///
/// The engine never looks at a clock. Whoever owns it decides when ticks happen
/// and calls [`SlideshowEngine::complete_transition`] once the transition
/// duration has elapsed; see `tasks::slideshow`.
///
/// Rules:
/// - At most one transition is in flight; `begin_transition` is a no-op otherwise.
/// - `current_index` only changes when a transition completes.
/// - Selection avoids the most recent `min(len / 3, 10)` shown indices and the
///   current one, falling back to "anything but current" when that leaves nothing.
#[derive(Debug)]
pub struct SlideshowEngine {
    images: Arc<[ImageRecord]>,
    current_index: usize,
    next_index: Option<usize>,
    is_transitioning: bool,
    is_playing: bool,
    interval: PlaybackInterval,
    recent_history: VecDeque<usize>,
    rng: StdRng,
}

impl SlideshowEngine {
    pub fn new(images: impl Into<Arc<[ImageRecord]>>, initial_index: usize, seed: Option<u64>) -> Self {
        let images = images.into();
        let current_index = if initial_index < images.len() {
            initial_index
        } else {
            if !images.is_empty() {
                warn!(initial_index, len = images.len(), "initial index out of range; starting at 0");
            }
            0
        };
        let mut recent_history = VecDeque::with_capacity(MAX_RECENT + 1);
        if !images.is_empty() {
            recent_history.push_back(current_index);
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            images,
            current_index,
            next_index: None,
            is_transitioning: false,
            is_playing: true,
            interval: PlaybackInterval::default(),
            recent_history,
            rng,
        }
    }

    pub fn with_interval(mut self, interval: PlaybackInterval) -> Self {
        self.interval = interval;
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn next_index(&self) -> Option<usize> {
        self.next_index
    }

    pub fn is_transitioning(&self) -> bool {
        self.is_transitioning
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn interval(&self) -> PlaybackInterval {
        self.interval
    }

    pub fn recent_history(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.recent_history.iter().copied()
    }

    pub fn current(&self) -> Option<&ImageRecord> {
        self.images.get(self.current_index)
    }

    /// How many trailing history entries selection must avoid.
    fn recent_count(&self) -> usize {
        (self.images.len() / 3).min(MAX_RECENT)
    }

    /// Longest history kept after an advance.
    fn history_cap(&self) -> usize {
        self.images.len().saturating_sub(1).min(MAX_RECENT)
    }

    /// Pick the index to show next. Returns `None` only for an empty slideshow.
    ///
    /// Consumes randomness but leaves the visible state untouched.
    pub fn select_next_index(&mut self) -> Option<usize> {
        let len = self.images.len();
        if len == 0 {
            return None;
        }
        let skip = self.recent_history.len().saturating_sub(self.recent_count());
        let avoid: Vec<usize> = self.recent_history.iter().skip(skip).copied().collect();

        let candidates: Vec<usize> = (0..len)
            .filter(|idx| *idx != self.current_index && !avoid.contains(idx))
            .collect();
        if let Some(choice) = candidates.choose(&mut self.rng) {
            return Some(*choice);
        }

        let fallback: Vec<usize> = (0..len).filter(|idx| *idx != self.current_index).collect();
        Some(
            fallback
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(self.current_index),
        )
    }

    /// Start a transition toward `new_index`. Returns `false` when one is already running.
    pub fn begin_transition(&mut self, new_index: usize) -> bool {
        if self.is_transitioning {
            debug!(requested = new_index, "transition in flight; ignoring");
            return false;
        }
        if new_index >= self.images.len() {
            warn!(requested = new_index, len = self.images.len(), "transition target out of range");
            return false;
        }
        self.next_index = Some(new_index);
        self.is_transitioning = true;
        true
    }

    /// Settle an in-flight transition. Returns the new current index, if one settled.
    pub fn complete_transition(&mut self) -> Option<usize> {
        let next = self.next_index.take()?;
        self.current_index = next;
        self.is_transitioning = false;
        Some(next)
    }

    /// Select and start the next transition, recording it in the history.
    ///
    /// Returns the chosen index, or `None` when the slideshow is empty or a
    /// transition is already in flight.
    pub fn advance(&mut self) -> Option<usize> {
        if self.is_transitioning {
            debug!("advance requested during transition; ignoring");
            return None;
        }
        let next = self.select_next_index()?;
        if !self.begin_transition(next) {
            return None;
        }
        self.recent_history.push_back(next);
        let cap = self.history_cap();
        while self.recent_history.len() > cap {
            self.recent_history.pop_front();
        }
        Some(next)
    }

    /// Flip playback. Returns the new playing state.
    pub fn toggle_playback(&mut self) -> bool {
        self.is_playing = !self.is_playing;
        self.is_playing
    }

    pub fn set_interval(&mut self, interval: PlaybackInterval) {
        self.interval = interval;
    }

    /// Whether a timer tick right now should advance the show.
    pub fn should_auto_advance(&self) -> bool {
        self.is_playing && self.images.len() > 1 && !self.is_transitioning
    }

    pub fn snapshot(&self, transition: Duration) -> EngineSnapshot {
        EngineSnapshot {
            current_index: self.current_index,
            next_index: self.next_index,
            is_transitioning: self.is_transitioning,
            is_playing: self.is_playing,
            interval_ms: self.interval.as_millis(),
            image_count: self.images.len(),
            transition_ms: u64::try_from(transition.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
