//! Pure call-state transition
//!
//! `(state, event) -> (state, actions)` with no I/O. The loop dispatches the
//! returned actions in order before it dequeues the next event, so everything
//! here can be reasoned about (and tested) without any services attached.

use crate::event::{Action, CallState, Event, Phase};

/// Advance the call state by one event.
///
/// Turn boundaries come entirely from the recognizer: a non-empty
/// `RecognizerEndOfTurn` while listening starts an agent turn, and a
/// `RecognizerStartOfTurn` while responding is a barge-in that cancels it.
pub fn transition(state: CallState, event: Event) -> (CallState, Vec<Action>) {
    match event {
        Event::StreamStart { stream_sid } => (
            CallState {
                phase: Phase::Listening,
                stream_sid: Some(stream_sid),
            },
            Vec::new(),
        ),

        Event::StreamStop => {
            let actions = if state.phase == Phase::Responding {
                vec![Action::ResetAgentTurn]
            } else {
                Vec::new()
            };
            (state, actions)
        }

        Event::Media { audio } => (state, vec![Action::FeedRecognizer { audio }]),

        Event::RecognizerEndOfTurn { transcript } => {
            if !transcript.is_empty() && state.phase == Phase::Listening {
                (
                    CallState {
                        phase: Phase::Responding,
                        ..state
                    },
                    vec![Action::StartAgentTurn { transcript }],
                )
            } else {
                (state, Vec::new())
            }
        }

        Event::RecognizerStartOfTurn => {
            if state.phase == Phase::Responding {
                (
                    CallState {
                        phase: Phase::Listening,
                        ..state
                    },
                    vec![Action::ResetAgentTurn],
                )
            } else {
                (state, Vec::new())
            }
        }

        Event::AgentTurnDone => (
            CallState {
                phase: Phase::Listening,
                ..state
            },
            Vec::new(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listening(sid: &str) -> CallState {
        CallState {
            phase: Phase::Listening,
            stream_sid: Some(sid.to_string()),
        }
    }

    fn responding(sid: &str) -> CallState {
        CallState {
            phase: Phase::Responding,
            stream_sid: Some(sid.to_string()),
        }
    }

    #[test]
    fn stream_start_resets_phase_and_assigns_sid() {
        for prior in [CallState::default(), responding("old")] {
            let (state, actions) = transition(
                prior,
                Event::StreamStart {
                    stream_sid: "MZ123".into(),
                },
            );
            assert_eq!(state.phase, Phase::Listening);
            assert_eq!(state.stream_sid.as_deref(), Some("MZ123"));
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn media_always_feeds_recognizer_and_leaves_state_unchanged() {
        let audio = vec![0u8; 160];
        for prior in [listening("A"), responding("A")] {
            let (state, actions) = transition(
                prior.clone(),
                Event::Media {
                    audio: audio.clone(),
                },
            );
            assert_eq!(state, prior);
            assert_eq!(
                actions,
                vec![Action::FeedRecognizer {
                    audio: audio.clone()
                }]
            );
        }
    }

    #[test]
    fn end_of_turn_starts_agent_turn_only_from_listening() {
        let (state, actions) = transition(
            listening("A"),
            Event::RecognizerEndOfTurn {
                transcript: "Hello".into(),
            },
        );
        assert_eq!(state.phase, Phase::Responding);
        assert_eq!(
            actions,
            vec![Action::StartAgentTurn {
                transcript: "Hello".into()
            }]
        );
    }

    #[test]
    fn end_of_turn_while_responding_is_ignored() {
        let (state, actions) = transition(
            responding("A"),
            Event::RecognizerEndOfTurn {
                transcript: "Hello".into(),
            },
        );
        assert_eq!(state.phase, Phase::Responding);
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_transcript_never_starts_a_turn() {
        let (state, actions) = transition(
            listening("A"),
            Event::RecognizerEndOfTurn {
                transcript: String::new(),
            },
        );
        assert_eq!(state.phase, Phase::Listening);
        assert!(actions.is_empty());
    }

    #[test]
    fn start_of_turn_while_responding_is_barge_in() {
        let (state, actions) = transition(responding("A"), Event::RecognizerStartOfTurn);
        assert_eq!(state.phase, Phase::Listening);
        assert_eq!(actions, vec![Action::ResetAgentTurn]);
    }

    #[test]
    fn start_of_turn_while_listening_is_ignored() {
        let (state, actions) = transition(listening("A"), Event::RecognizerStartOfTurn);
        assert_eq!(state.phase, Phase::Listening);
        assert!(actions.is_empty());
    }

    #[test]
    fn stream_stop_resets_only_an_active_turn() {
        let (state, actions) = transition(responding("A"), Event::StreamStop);
        assert_eq!(state.phase, Phase::Responding);
        assert_eq!(actions, vec![Action::ResetAgentTurn]);

        let (state, actions) = transition(listening("A"), Event::StreamStop);
        assert_eq!(state.phase, Phase::Listening);
        assert!(actions.is_empty());
    }

    #[test]
    fn agent_turn_done_returns_to_listening_and_is_idempotent() {
        let (state, actions) = transition(responding("A"), Event::AgentTurnDone);
        assert_eq!(state.phase, Phase::Listening);
        assert!(actions.is_empty());

        let (state, actions) = transition(state, Event::AgentTurnDone);
        assert_eq!(state.phase, Phase::Listening);
        assert!(actions.is_empty());
    }

    /// Exhaustive sweep: a single step never asks for both a start and a
    /// reset, and the start/reset actions only appear on their edges.
    #[test]
    fn start_and_reset_are_mutually_exclusive() {
        let events = [
            Event::StreamStart {
                stream_sid: "B".into(),
            },
            Event::StreamStop,
            Event::Media { audio: vec![0; 16] },
            Event::RecognizerStartOfTurn,
            Event::RecognizerEndOfTurn {
                transcript: "hi".into(),
            },
            Event::RecognizerEndOfTurn {
                transcript: String::new(),
            },
            Event::AgentTurnDone,
        ];

        for prior in [listening("A"), responding("A"), CallState::default()] {
            for event in &events {
                let (state, actions) = transition(prior.clone(), event.clone());
                let starts = actions
                    .iter()
                    .filter(|a| matches!(a, Action::StartAgentTurn { .. }))
                    .count();
                let resets = actions
                    .iter()
                    .filter(|a| matches!(a, Action::ResetAgentTurn))
                    .count();
                assert!(starts + resets <= 1, "event {:?}", event);
                if starts == 1 {
                    assert_eq!(prior.phase, Phase::Listening);
                    assert_eq!(state.phase, Phase::Responding);
                }
                if resets == 1 {
                    assert_eq!(prior.phase, Phase::Responding);
                }
            }
        }
    }
}
