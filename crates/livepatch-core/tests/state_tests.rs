use livepatch_core::{allowed_transitions, validate_transition, SessionError, SessionState};
use proptest::prelude::*;

fn state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Idle),
        Just(SessionState::Watching),
        Just(SessionState::Compiling),
        Just(SessionState::Patching),
    ]
}

#[test]
fn test_idle_transitions() {
    assert!(validate_transition(SessionState::Idle, SessionState::Watching).is_ok());
    assert!(validate_transition(SessionState::Idle, SessionState::Compiling).is_ok());

    assert!(validate_transition(SessionState::Idle, SessionState::Patching).is_err());
}

#[test]
fn test_patching_only_reached_through_compiling() {
    for from in SessionState::ALL {
        let reaches = allowed_transitions(from).contains(&SessionState::Patching);
        assert_eq!(reaches, from == SessionState::Compiling, "{from}");
    }
}

#[test]
fn test_rejection_names_both_states() {
    let err = validate_transition(SessionState::Watching, SessionState::Patching).unwrap_err();
    assert!(matches!(
        err,
        SessionError::IllegalTransition {
            from: SessionState::Watching,
            to: SessionState::Patching
        }
    ));
    assert_eq!(err.to_string(), "illegal state transition: watching -> patching");
}

proptest! {
    #[test]
    fn prop_validation_matches_allowed(from in state(), to in state()) {
        let allowed = allowed_transitions(from);
        prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
    }

    #[test]
    fn prop_busy_states_can_always_rest(from in state()) {
        if from.is_busy() {
            let allowed = allowed_transitions(from);
            prop_assert!(allowed.contains(&SessionState::Idle));
            prop_assert!(allowed.contains(&SessionState::Watching));
        }
    }

    #[test]
    fn prop_no_self_transitions(from in state()) {
        prop_assert!(validate_transition(from, from).is_err());
    }
}
