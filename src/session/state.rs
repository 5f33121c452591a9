//! Capture session state machine.
//!
//! One session per camera screen. Transitions are applied through a single
//! `watch` sender, which serializes them and lets the UI observe every change.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::identify::{CascadeProgress, IdentificationResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    /// Live preview; detection runs.
    #[default]
    Idle,
    /// A frame was snapshotted; nothing sent yet.
    Frozen,
    QueryingTier1,
    QueryingTier2,
    /// Remote tiers exhausted; trying the local hint.
    FallingBack,
    /// A query is ready and waiting for the caller to consume it.
    Resolved(Arc<IdentificationResult>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Trigger,
    /// No frame was available to snapshot.
    Abort,
    StartTier1,
    Escalate,
    RemoteExhausted,
    Resolve(Arc<IdentificationResult>),
    NoHint,
    Consume,
    /// The capture task ended without resolving (panicked or was aborted).
    Cancel,
}

impl SessionState {
    /// The state after `event`, or `None` when the event is not valid here.
    pub fn next(&self, event: &SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Idle, E::Trigger) => S::Frozen,
            (S::Frozen, E::Abort) => S::Idle,
            (S::Frozen, E::StartTier1) => S::QueryingTier1,
            (S::QueryingTier1, E::Escalate) => S::QueryingTier2,
            (S::QueryingTier1 | S::QueryingTier2, E::RemoteExhausted) => S::FallingBack,
            (S::QueryingTier1 | S::QueryingTier2 | S::FallingBack, E::Resolve(result)) => {
                S::Resolved(Arc::clone(result))
            }
            (S::FallingBack, E::NoHint) => S::Idle,
            (S::Resolved(_), E::Consume) => S::Idle,
            (S::Frozen | S::QueryingTier1 | S::QueryingTier2 | S::FallingBack, E::Cancel) => {
                S::Idle
            }
            _ => return None,
        };
        Some(next)
    }

    /// Live detection runs only while idle.
    pub fn pauses_detection(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Frozen => "frozen",
            SessionState::QueryingTier1 => "querying_tier1",
            SessionState::QueryingTier2 => "querying_tier2",
            SessionState::FallingBack => "falling_back",
            SessionState::Resolved(_) => "resolved",
        }
    }
}

pub struct CaptureSession {
    state: watch::Sender<SessionState>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self { state }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_detection_paused(&self) -> bool {
        self.state.borrow().pauses_detection()
    }

    /// Apply `event`. Returns false, leaving the state untouched, when the
    /// event is not valid in the current state.
    pub fn apply(&self, event: SessionEvent) -> bool {
        self.state.send_if_modified(|state| match state.next(&event) {
            Some(next) => {
                debug!("Session {} -> {}", state.name(), next.name());
                *state = next;
                true
            }
            None => false,
        })
    }

    /// Idle -> Frozen. Only one capture runs at a time; a trigger while a
    /// capture is in flight is ignored.
    pub fn try_freeze(&self) -> bool {
        let frozen = self.apply(SessionEvent::Trigger);
        if !frozen {
            metrics::counter!("session.triggers_ignored").increment(1);
            debug!("Capture trigger ignored in state {}", self.state.borrow().name());
        }
        frozen
    }

    /// Resolved -> Idle, handing the result to the caller.
    pub fn consume(&self) -> Option<Arc<IdentificationResult>> {
        let mut taken = None;
        self.state.send_if_modified(|state| {
            let SessionState::Resolved(result) = state else {
                return false;
            };
            taken = Some(Arc::clone(result));
            *state = SessionState::Idle;
            true
        });
        taken
    }

    fn apply_or_warn(&self, event: SessionEvent) {
        let name = event_name(&event);
        if !self.apply(event) {
            warn!(
                "Ignoring session event {} in state {}",
                name,
                self.state.borrow().name()
            );
        }
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Trigger => "trigger",
        SessionEvent::Abort => "abort",
        SessionEvent::StartTier1 => "start_tier1",
        SessionEvent::Escalate => "escalate",
        SessionEvent::RemoteExhausted => "remote_exhausted",
        SessionEvent::Resolve(_) => "resolve",
        SessionEvent::NoHint => "no_hint",
        SessionEvent::Consume => "consume",
        SessionEvent::Cancel => "cancel",
    }
}

impl CascadeProgress for CaptureSession {
    fn tier_started(&self, tier: u8) {
        let event = if tier <= 1 {
            SessionEvent::StartTier1
        } else {
            SessionEvent::Escalate
        };
        self.apply_or_warn(event);
    }

    fn falling_back(&self) {
        self.apply_or_warn(SessionEvent::RemoteExhausted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::Provenance;

    fn result() -> Arc<IdentificationResult> {
        Arc::new(IdentificationResult {
            brand: "Acme".into(),
            model: "X1".into(),
            category: String::new(),
            raw_label: String::new(),
            confidence: 0.9,
            provenance: Provenance::Tier1,
            search_terms: vec!["Acme".into(), "X1".into()],
        })
    }

    #[test]
    fn happy_path_cycle() {
        let session = CaptureSession::new();
        assert!(!session.is_detection_paused());
        assert!(session.try_freeze());
        assert!(session.is_detection_paused());
        assert!(session.apply(SessionEvent::StartTier1));
        assert!(session.apply(SessionEvent::Resolve(result())));

        let consumed = session.consume().expect("resolved result");
        assert_eq!(consumed.brand, "Acme");
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.consume().is_none());
    }

    #[test]
    fn second_trigger_is_ignored() {
        let session = CaptureSession::new();
        assert!(session.try_freeze());
        session.tier_started(1);
        assert_eq!(session.state(), SessionState::QueryingTier1);

        assert!(!session.try_freeze());
        assert_eq!(session.state(), SessionState::QueryingTier1);
    }

    #[test]
    fn fallback_without_hint_returns_to_idle() {
        let session = CaptureSession::new();
        session.try_freeze();
        session.tier_started(1);
        session.tier_started(2);
        assert_eq!(session.state(), SessionState::QueryingTier2);
        session.falling_back();
        assert_eq!(session.state(), SessionState::FallingBack);
        assert!(session.apply(SessionEvent::NoHint));
        assert!(!session.is_detection_paused());
    }

    #[test]
    fn invalid_events_leave_state_alone() {
        let s = SessionState::Idle;
        assert_eq!(s.next(&SessionEvent::Escalate), None);
        assert_eq!(s.next(&SessionEvent::Consume), None);
        assert_eq!(SessionState::QueryingTier2.next(&SessionEvent::Escalate), None);
        assert_eq!(SessionState::Frozen.next(&SessionEvent::Resolve(result())), None);
    }

    #[test]
    fn cancel_only_unwinds_unresolved_captures() {
        for state in [
            SessionState::Frozen,
            SessionState::QueryingTier1,
            SessionState::QueryingTier2,
            SessionState::FallingBack,
        ] {
            assert_eq!(state.next(&SessionEvent::Cancel), Some(SessionState::Idle));
        }
        assert_eq!(SessionState::Idle.next(&SessionEvent::Cancel), None);
        assert_eq!(SessionState::Resolved(result()).next(&SessionEvent::Cancel), None);
    }

    #[tokio::test]
    async fn watchers_observe_transitions() {
        let session = CaptureSession::new();
        let mut rx = session.subscribe();
        session.try_freeze();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionState::Frozen);
    }
}
