//! Resource lifecycle state machine for mxsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of a cached resource. Tasks feed it the current persisted state
//! (read inside a cache transaction) plus the event they are about to cause,
//! and get back either the state to persist, an instruction to remove the
//! entity, or an error if the transition is illegal.
//!
//! ```text
//!   (absent) ──RegisterRequested──► REGISTERING ──RegisterConfirmed──► REGISTERED
//!                                     │    ▲                              │   │
//!                           RegisterFailed │                              │   │
//!                                     ▼    │                              │   │
//!                               UNREGISTERED ◄───────── RegisterRequested ┘   │
//!                                                                             │
//!                          (removed) ◄──RemovalConfirmed── UNREGISTERING ◄────┘
//!                                                                  RemovalRequested
//! ```
//!
//! A failed re-registration of a `REGISTERED` resource goes back to
//! `REGISTERED`: the remote side rejected the request as a whole and still
//! holds the earlier registration.

use mxsync_types::ResourceState;
use thiserror::Error;

/// Lifecycle of one resource - NO I/O, just state transitions.
///
/// `None` means the resource is not present in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifecycle {
    state: Option<ResourceState>,
}

impl ResourceLifecycle {
    /// Lifecycle of a resource that is not cached.
    pub fn absent() -> Self {
        Self { state: None }
    }

    /// Lifecycle of a cached resource in the given state.
    pub fn from_state(state: ResourceState) -> Self {
        Self { state: Some(state) }
    }

    /// Lifecycle from an optional persisted state.
    pub fn from_optional(state: Option<ResourceState>) -> Self {
        Self { state }
    }

    /// Current state, `None` if absent.
    pub fn state(&self) -> Option<ResourceState> {
        self.state
    }

    /// Process an event and return the new lifecycle plus the transition
    /// the caller must persist.
    ///
    /// This is a pure function. The caller is responsible for writing the
    /// result inside a cache transaction.
    pub fn on_event(self, event: ResourceEvent) -> Result<(Self, Transition), TransitionError> {
        use ResourceState::*;

        let next = match (self.state, event) {
            (None, ResourceEvent::RegisterRequested)
            | (Some(Unregistered), ResourceEvent::RegisterRequested)
            | (Some(Registering), ResourceEvent::RegisterRequested)
            | (Some(Registered), ResourceEvent::RegisterRequested) => Some(Registering),

            (Some(Registering), ResourceEvent::RegisterConfirmed) => Some(Registered),
            // The remote side still holds whatever it held before the request.
            (Some(Registering), ResourceEvent::RegisterFailed { previous }) => match previous {
                Some(Registered) => Some(Registered),
                _ => Some(Unregistered),
            },

            (Some(Registered), ResourceEvent::RemovalRequested)
            | (Some(Unregistering), ResourceEvent::RemovalRequested) => Some(Unregistering),

            (Some(Unregistering), ResourceEvent::RemovalConfirmed) => None,

            (from, event) => return Err(TransitionError { from, event }),
        };

        let transition = match next {
            Some(state) => Transition::Persist(state),
            None => Transition::Remove,
        };
        Ok((Self { state: next }, transition))
    }

    /// Check whether an event would be accepted without applying it.
    pub fn accepts(&self, event: ResourceEvent) -> bool {
        self.on_event(event).is_ok()
    }
}

impl Default for ResourceLifecycle {
    fn default() -> Self {
        Self::absent()
    }
}

/// Events that drive a resource lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A registration is about to be sent.
    RegisterRequested,
    /// The remote side confirmed the registration.
    RegisterConfirmed,
    /// The remote side rejected the registration.
    RegisterFailed {
        /// State cached before the registration was requested.
        previous: Option<ResourceState>,
    },
    /// A removal is about to be sent.
    RemovalRequested,
    /// The remote side confirmed the removal.
    RemovalConfirmed,
}

/// What the caller must write after a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Store the entity with this state.
    Persist(ResourceState),
    /// Delete the entity.
    Remove,
}

/// An event was not legal from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {event:?} from {}", display_state(.from))]
pub struct TransitionError {
    /// State the lifecycle was in (`None` = absent).
    pub from: Option<ResourceState>,
    /// Rejected event.
    pub event: ResourceEvent,
}

fn display_state(state: &Option<ResourceState>) -> &'static str {
    match state {
        Some(s) => s.as_str(),
        None => "ABSENT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    #[test]
    fn starts_absent() {
        assert_eq!(ResourceLifecycle::default().state(), None);
    }

    #[test]
    fn registration_happy_path() {
        let lc = ResourceLifecycle::absent();

        let (lc, t) = lc.on_event(ResourceEvent::RegisterRequested).unwrap();
        assert_eq!(t, Transition::Persist(Registering));

        let (lc, t) = lc.on_event(ResourceEvent::RegisterConfirmed).unwrap();
        assert_eq!(t, Transition::Persist(Registered));
        assert_eq!(lc.state(), Some(Registered));
    }

    #[test]
    fn failed_registration_falls_back_to_unregistered() {
        let lc = ResourceLifecycle::from_state(Registering);
        let (lc, t) = lc
            .on_event(ResourceEvent::RegisterFailed { previous: None })
            .unwrap();
        assert_eq!(t, Transition::Persist(Unregistered));

        // And can be retried from there
        let (_, t) = lc.on_event(ResourceEvent::RegisterRequested).unwrap();
        assert_eq!(t, Transition::Persist(Registering));
    }

    #[test]
    fn failed_reregistration_restores_registered() {
        let (lc, _) = ResourceLifecycle::from_state(Registered)
            .on_event(ResourceEvent::RegisterRequested)
            .unwrap();
        let (lc, t) = lc
            .on_event(ResourceEvent::RegisterFailed {
                previous: Some(Registered),
            })
            .unwrap();
        assert_eq!(t, Transition::Persist(Registered));

        // Still removable
        assert!(lc.accepts(ResourceEvent::RemovalRequested));
    }

    #[test]
    fn failed_resumed_registration_is_unregistered() {
        for previous in [Some(Unregistered), Some(Registering)] {
            let (_, t) = ResourceLifecycle::from_state(Registering)
                .on_event(ResourceEvent::RegisterFailed { previous })
                .unwrap();
            assert_eq!(t, Transition::Persist(Unregistered));
        }
    }

    #[test]
    fn removal_happy_path() {
        let lc = ResourceLifecycle::from_state(Registered);

        let (lc, t) = lc.on_event(ResourceEvent::RemovalRequested).unwrap();
        assert_eq!(t, Transition::Persist(Unregistering));

        let (lc, t) = lc.on_event(ResourceEvent::RemovalConfirmed).unwrap();
        assert_eq!(t, Transition::Remove);
        assert_eq!(lc.state(), None);
    }

    #[test]
    fn removal_may_resume_from_unregistering() {
        assert!(ResourceLifecycle::from_state(Unregistering)
            .accepts(ResourceEvent::RemovalRequested));
    }

    #[test]
    fn removal_rejected_while_not_registered() {
        for state in [Registering, Unregistered] {
            let err = ResourceLifecycle::from_state(state)
                .on_event(ResourceEvent::RemovalRequested)
                .unwrap_err();
            assert_eq!(err.from, Some(state));
            assert_eq!(err.event, ResourceEvent::RemovalRequested);
        }
    }

    #[test]
    fn removal_of_absent_is_rejected() {
        assert!(!ResourceLifecycle::absent().accepts(ResourceEvent::RemovalRequested));
    }

    #[test]
    fn removal_confirmation_requires_unregistering() {
        assert!(!ResourceLifecycle::from_state(Registered).accepts(ResourceEvent::RemovalConfirmed));
    }

    #[test]
    fn registration_may_resume_from_registering() {
        let (_, t) = ResourceLifecycle::from_state(Registering)
            .on_event(ResourceEvent::RegisterRequested)
            .unwrap();
        assert_eq!(t, Transition::Persist(Registering));
    }

    #[test]
    fn registration_rejected_while_removing() {
        assert!(
            !ResourceLifecycle::from_state(Unregistering).accepts(ResourceEvent::RegisterRequested)
        );
    }

    #[test]
    fn transition_error_display_names_states() {
        let err = ResourceLifecycle::absent()
            .on_event(ResourceEvent::RemovalConfirmed)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal transition RemovalConfirmed from ABSENT"
        );
    }
}
