use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use natter_services::{ServiceResult, TopicPrediction};

use crate::scheduler::{self, ArmedTimer, Scheduler, TimerHandle, TimerId};
use crate::transcript::Transcript;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub sample_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl PollerConfig {
    /// Zero values fall back to the defaults.
    pub fn new(interval: Duration, sample_size: usize) -> Self {
        Self {
            interval: if interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                interval
            },
            sample_size: if sample_size == 0 {
                DEFAULT_SAMPLE_SIZE
            } else {
                sample_size
            },
        }
    }
}

/// Identifies one Sampling visit so late classifier answers can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollCycleId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Scheduled(TimerId),
    Sampling(PollCycleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub running: bool,
    pub pending_timer: Option<TimerId>,
    pub phase: PollPhase,
}

/// Deduplicated classifier label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer was cancelled or superseded before it fired.
    Stale,
    /// No peer-authored messages to classify; the poller went Idle.
    EmptySample,
    Sample {
        cycle: PollCycleId,
        samples: Vec<String>,
    },
}

pub struct ClassifiedCycle {
    pub topics: Vec<Topic>,
    pub next: ArmedTimer,
}

/// Idle -> Scheduled -> Sampling -> Idle | Scheduled.
///
/// The poller never awaits anything itself. Arming returns an [`ArmedTimer`] the owner
/// must drive, and the owner reports back through `on_timer_fired` / `on_classified`.
/// At most one [`TimerHandle`] is held; re-arming cancels the previous one first.
pub struct TopicPoller {
    config: PollerConfig,
    phase: PollPhase,
    pending_timer: Option<TimerHandle>,
    scheduler: Arc<dyn Scheduler>,
    next_timer_id: u64,
    next_cycle_id: u64,
}

impl TopicPoller {
    pub fn new(config: PollerConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            config,
            phase: PollPhase::Idle,
            pending_timer: None,
            scheduler,
            next_timer_id: 1,
            next_cycle_id: 1,
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Takes effect from the next armed timer.
    pub fn reconfigure(&mut self, config: PollerConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase != PollPhase::Idle
    }

    pub fn state(&self) -> PollState {
        PollState {
            running: self.is_running(),
            pending_timer: self.pending_timer.as_ref().map(TimerHandle::id),
            phase: self.phase,
        }
    }

    /// Single start/stop control: starts from Idle, stops otherwise.
    pub fn toggle(&mut self) -> Option<ArmedTimer> {
        if self.is_running() {
            self.stop();
            None
        } else {
            tracing::info!(
                interval_ms = self.config.interval.as_millis() as u64,
                sample_size = self.config.sample_size,
                "topic poller started"
            );
            Some(self.arm())
        }
    }

    pub fn stop(&mut self) {
        self.cancel_pending_timer();
        if self.is_running() {
            tracing::info!(phase = ?self.phase, "topic poller stopped");
        }
        self.phase = PollPhase::Idle;
    }

    pub fn on_timer_fired(&mut self, timer: TimerId, transcript: &Transcript) -> TickOutcome {
        if self.phase != PollPhase::Scheduled(timer) {
            tracing::debug!(?timer, phase = ?self.phase, "ignoring stale poller tick");
            return TickOutcome::Stale;
        }
        self.pending_timer = None;

        let samples = transcript.recent_peer_texts(self.config.sample_size);
        if samples.is_empty() {
            tracing::info!("no peer messages to classify; topic poller going idle");
            self.phase = PollPhase::Idle;
            return TickOutcome::EmptySample;
        }

        let cycle = PollCycleId(self.next_cycle_id);
        self.next_cycle_id = self.next_cycle_id.saturating_add(1);
        self.phase = PollPhase::Sampling(cycle);
        tracing::debug!(?cycle, sample_count = samples.len(), "sampling transcript");

        TickOutcome::Sample { cycle, samples }
    }

    /// Returns `None` when the answer belongs to a cycle that was stopped meanwhile.
    pub fn on_classified(
        &mut self,
        cycle: PollCycleId,
        result: ServiceResult<Vec<TopicPrediction>>,
    ) -> Option<ClassifiedCycle> {
        if self.phase != PollPhase::Sampling(cycle) {
            tracing::debug!(?cycle, phase = ?self.phase, "dropping classification for stale cycle");
            return None;
        }

        let topics = match result {
            Ok(predictions) => distinct_topics(predictions),
            Err(error) => {
                // A degraded classifier must not halt the cycle.
                tracing::warn!(?cycle, error = %error, "topic classification failed");
                Vec::new()
            }
        };

        Some(ClassifiedCycle {
            topics,
            next: self.arm(),
        })
    }

    fn arm(&mut self) -> ArmedTimer {
        self.cancel_pending_timer();

        let id = TimerId::new(self.next_timer_id);
        self.next_timer_id = self.next_timer_id.saturating_add(1);

        let (handle, armed) = scheduler::arm(self.scheduler.as_ref(), id, self.config.interval);
        self.pending_timer = Some(handle);
        self.phase = PollPhase::Scheduled(id);
        armed
    }

    fn cancel_pending_timer(&mut self) {
        if let Some(handle) = self.pending_timer.take() {
            handle.cancel();
        }
    }
}

impl Drop for TopicPoller {
    fn drop(&mut self) {
        self.cancel_pending_timer();
    }
}

/// Labels in first-seen order, each at most once. Blank labels are skipped.
pub fn distinct_topics(predictions: Vec<TopicPrediction>) -> Vec<Topic> {
    let mut seen = HashSet::new();
    predictions
        .into_iter()
        .map(|prediction| prediction.prediction)
        .filter(|label| !label.trim().is_empty())
        .filter(|label| seen.insert(label.clone()))
        .map(Topic::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use natter_services::ServiceError;

    use super::*;
    use crate::message::Message;
    use crate::scheduler::manual::ManualScheduler;

    fn poller() -> (TopicPoller, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let poller = TopicPoller::new(PollerConfig::default(), scheduler.clone());
        (poller, scheduler)
    }

    fn scheduled_timer(poller: &TopicPoller) -> TimerId {
        match poller.phase() {
            PollPhase::Scheduled(timer) => timer,
            phase => panic!("expected Scheduled, got {phase:?}"),
        }
    }

    #[test]
    fn toggle_starts_then_stops() {
        let (mut poller, scheduler) = poller();

        let armed = poller.toggle().expect("toggle from idle arms a timer");
        assert_eq!(poller.state().pending_timer, Some(armed.id));
        assert!(poller.state().running);
        assert_eq!(scheduler.armed_delays(), [DEFAULT_POLL_INTERVAL]);

        assert!(poller.toggle().is_none());
        assert_eq!(poller.phase(), PollPhase::Idle);
        assert_eq!(poller.state().pending_timer, None);
    }

    #[test]
    fn stopping_twice_stays_idle_without_timer() {
        let (mut poller, _scheduler) = poller();
        poller.toggle();

        poller.stop();
        assert_eq!(
            poller.state(),
            PollState {
                running: false,
                pending_timer: None,
                phase: PollPhase::Idle,
            }
        );

        poller.stop();
        assert_eq!(
            poller.state(),
            PollState {
                running: false,
                pending_timer: None,
                phase: PollPhase::Idle,
            }
        );
    }

    #[test]
    fn tick_for_superseded_timer_is_stale() {
        let (mut poller, _scheduler) = poller();
        let first = poller.toggle().expect("armed").id;
        poller.stop();
        poller.toggle();

        let mut transcript = Transcript::new();
        transcript.append(Message::peer("hi"));

        assert_eq!(poller.on_timer_fired(first, &transcript), TickOutcome::Stale);
        assert!(matches!(poller.phase(), PollPhase::Scheduled(_)));
    }

    #[test]
    fn empty_sample_returns_to_idle() {
        let (mut poller, _scheduler) = poller();
        poller.toggle();
        let timer = scheduled_timer(&poller);

        let mut transcript = Transcript::new();
        transcript.append(Message::local("only my own words"));

        assert_eq!(
            poller.on_timer_fired(timer, &transcript),
            TickOutcome::EmptySample
        );
        assert!(!poller.state().running);
        assert_eq!(poller.state().pending_timer, None);
    }

    #[test]
    fn sample_takes_configured_number_of_peer_messages() {
        let scheduler = Arc::new(ManualScheduler::default());
        let mut poller = TopicPoller::new(
            PollerConfig::new(Duration::from_millis(10), 2),
            scheduler.clone(),
        );
        poller.toggle();
        let timer = scheduled_timer(&poller);

        let mut transcript = Transcript::new();
        for text in ["a", "b", "c"] {
            transcript.append(Message::peer(text));
            transcript.append(Message::local("me"));
        }

        match poller.on_timer_fired(timer, &transcript) {
            TickOutcome::Sample { samples, .. } => assert_eq!(samples, ["b", "c"]),
            outcome => panic!("expected a sample, got {outcome:?}"),
        }
        assert!(matches!(poller.phase(), PollPhase::Sampling(_)));
        assert_eq!(poller.state().pending_timer, None);
        assert_eq!(scheduler.armed_delays(), [Duration::from_millis(10)]);
    }

    #[test]
    fn classifier_failure_still_rearms() {
        let (mut poller, _scheduler) = poller();
        poller.toggle();
        let timer = scheduled_timer(&poller);
        let mut transcript = Transcript::new();
        transcript.append(Message::peer("hello"));

        let TickOutcome::Sample { cycle, .. } = poller.on_timer_fired(timer, &transcript) else {
            panic!("expected a sample");
        };
        let classified = poller
            .on_classified(
                cycle,
                Err(ServiceError::TransportClosed { stage: "test" }),
            )
            .expect("current cycle is accepted");

        assert!(classified.topics.is_empty());
        assert_eq!(poller.phase(), PollPhase::Scheduled(classified.next.id));
    }

    #[test]
    fn answer_after_stop_is_dropped() {
        let (mut poller, _scheduler) = poller();
        poller.toggle();
        let timer = scheduled_timer(&poller);
        let mut transcript = Transcript::new();
        transcript.append(Message::peer("hello"));
        let TickOutcome::Sample { cycle, .. } = poller.on_timer_fired(timer, &transcript) else {
            panic!("expected a sample");
        };

        poller.toggle();

        assert!(
            poller
                .on_classified(cycle, Ok(vec![TopicPrediction::new("greeting")]))
                .is_none()
        );
        assert_eq!(poller.phase(), PollPhase::Idle);
    }

    #[test]
    fn distinct_topics_keep_first_seen_order() {
        let topics = distinct_topics(vec![
            TopicPrediction::new("sports"),
            TopicPrediction::new("sports"),
            TopicPrediction::new(" "),
            TopicPrediction::new("music"),
        ]);

        assert_eq!(topics, [Topic::new("sports"), Topic::new("music")]);
    }

    #[test]
    fn zero_config_values_fall_back_to_defaults() {
        assert_eq!(PollerConfig::new(Duration::ZERO, 0), PollerConfig::default());
    }
}
