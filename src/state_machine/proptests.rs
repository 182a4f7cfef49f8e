//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::state::*;
use super::transition::*;
use super::*;
use crate::gateway::{AnalystFailure, AnalystReply, ContentItem, Role, Warning};
use proptest::prelude::*;
use serde_json::json;

const MODELS: [&str; 2] = ["@DB.S.M/a.yaml", "@DB.S.M/b.yaml"];

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-conv", MODELS.iter().map(ToString::to_string).collect())
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_warnings() -> impl Strategy<Value = Option<Vec<Warning>>> {
    proptest::option::of(proptest::collection::vec(
        "[a-z ]{1,20}".prop_map(|message| Warning { message }),
        0..3,
    ))
}

fn arb_content() -> impl Strategy<Value = Vec<ContentItem>> {
    proptest::collection::vec(
        prop_oneof![
            "[a-zA-Z ]{1,30}".prop_map(ContentItem::text),
            "SELECT [a-z]{1,8}".prop_map(ContentItem::sql),
            proptest::collection::vec("[a-z ]{1,20}", 1..3)
                .prop_map(|suggestions| ContentItem::Suggestions { suggestions }),
        ],
        1..4,
    )
}

fn arb_reply_event() -> impl Strategy<Value = Event> {
    ("[a-z0-9]{6}", arb_content(), arb_warnings()).prop_map(|(request_id, content, warnings)| {
        Event::AnalystReplied {
            reply: AnalystReply {
                raw: json!({ "request_id": request_id }),
                content,
                request_id,
                warnings,
            },
        }
    })
}

fn arb_failure_event() -> impl Strategy<Value = Event> {
    (400u16..600, "[a-z0-9]{6}", "[a-z ]{1,20}", arb_warnings()).prop_map(
        |(status, request_id, message, warnings)| {
            let mut raw = json!({
                "request_id": request_id,
                "error_code": "E",
                "message": message,
            });
            if let Some(warnings) = &warnings {
                raw["warnings"] = json!(warnings);
            }
            Event::AnalystFailed {
                failure: AnalystFailure::from_api(status, raw),
            }
        },
    )
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z ]{0,30}".prop_map(|text| Event::UserTurn { text }),
        "[a-zA-Z ]{1,30}".prop_map(|text| Event::SuggestionSelected { text }),
        Just(Event::SuggestionConsumed),
        Just(Event::Reset),
        (0..MODELS.len()).prop_map(|i| Event::SelectModel {
            path: MODELS[i].to_string()
        }),
        ("[a-z0-9]{6}", any::<bool>()).prop_map(|(request_id, positive)| {
            Event::FeedbackRequested {
                request_id,
                positive,
                message: String::new(),
            }
        }),
        arb_reply_event(),
        arb_failure_event(),
    ]
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn is_valid_state(state: &ConversationState) -> bool {
    // Feedback only ever refers to analyst replies still in the history
    let feedback_ok = state
        .feedback
        .keys()
        .all(|id| state.has_analyst_request(id));
    // Analyst replies never start the history
    let order_ok = state
        .messages
        .first()
        .map_or(true, |m| m.role == Role::User);
    // Busy exactly when the last message is an unanswered user turn
    let phase_ok = state.is_busy()
        == state
            .messages
            .last()
            .is_some_and(|m| m.role == Role::User);
    feedback_ok && order_ok && phase_ok
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_transitions_preserve_validity(events in proptest::collection::vec(arb_event(), 0..25)) {
        let context = test_context();
        let mut state = ConversationState::new(MODELS[0]);

        for event in events {
            if let Ok(result) = transition(&state, &context, event) {
                prop_assert!(
                    result.new_state.version >= state.version,
                    "Version went backwards"
                );
                state = result.new_state;
                prop_assert!(is_valid_state(&state), "Invalid state: {:?}", state);
            }
        }
    }

    #[test]
    fn prop_round_trip_adds_two_messages(
        text in "[a-zA-Z]{1,30}",
        reply in arb_reply_event(),
    ) {
        let context = test_context();
        let state = ConversationState::new(MODELS[0]);
        let busy = transition(&state, &context, Event::UserTurn { text: text.clone() }).unwrap().new_state;
        let done = transition(&busy, &context, reply).unwrap().new_state;

        prop_assert_eq!(done.messages.len(), state.messages.len() + 2);
        prop_assert_eq!(done.messages[0].role, Role::User);
        prop_assert_eq!(done.messages[1].role, Role::Analyst);
        prop_assert_eq!(&done.messages[0].content, &vec![ContentItem::text(text)]);
        prop_assert_eq!(done.phase, ConvState::Idle);
    }

    #[test]
    fn prop_warnings_reflect_latest_request_only(
        first in arb_warnings(),
        second in arb_warnings(),
    ) {
        let context = test_context();
        let mut state = ConversationState::new(MODELS[0]);
        for (i, warnings) in [first, second.clone()].into_iter().enumerate() {
            state = transition(&state, &context, Event::UserTurn { text: format!("q{i}") }).unwrap().new_state;
            let reply = AnalystReply {
                content: vec![ContentItem::text("a")],
                request_id: format!("r{i}"),
                warnings,
                raw: json!({}),
            };
            state = transition(&state, &context, Event::AnalystReplied { reply }).unwrap().new_state;
        }
        prop_assert_eq!(state.warnings, second.unwrap_or_default());
    }

    #[test]
    fn prop_reset_clears_everything_but_model(events in proptest::collection::vec(arb_event(), 0..15)) {
        let context = test_context();
        let mut state = ConversationState::new(MODELS[0]);
        for event in events {
            if let Ok(result) = transition(&state, &context, event) {
                state = result.new_state;
            }
        }

        match transition(&state, &context, Event::Reset) {
            Ok(result) => {
                let next = result.new_state;
                prop_assert!(next.messages.is_empty());
                prop_assert!(next.warnings.is_empty());
                prop_assert!(next.feedback.is_empty());
                prop_assert!(next.active_suggestion.is_none());
                prop_assert!(next.chart_selections.is_empty());
                prop_assert_eq!(next.semantic_model, state.semantic_model);
                prop_assert!(result.effects.contains(&Effect::Cleared));
            }
            Err(e) => {
                prop_assert!(state.is_busy());
                prop_assert_eq!(e, TransitionError::Busy);
            }
        }
    }

    #[test]
    fn prop_second_feedback_rejected(positive in any::<bool>(), error in proptest::option::of("[a-z]{1,10}")) {
        let context = test_context();
        let state = ConversationState::new(MODELS[0]);
        let state = transition(&state, &context, Event::UserTurn { text: "q".into() }).unwrap().new_state;
        let reply = AnalystReply {
            content: vec![ContentItem::text("a")],
            request_id: "r1".into(),
            warnings: None,
            raw: json!({}),
        };
        let state = transition(&state, &context, Event::AnalystReplied { reply }).unwrap().new_state;

        let request = Event::FeedbackRequested { request_id: "r1".into(), positive, message: String::new() };
        let state = transition(&state, &context, request.clone()).unwrap().new_state;
        let state = transition(&state, &context, Event::FeedbackCompleted { request_id: "r1".into(), error }).unwrap().new_state;

        prop_assert_eq!(
            transition(&state, &context, request).unwrap_err(),
            TransitionError::FeedbackAlreadySubmitted("r1".into())
        );
    }

    #[test]
    fn prop_busy_rejects_user_input(text in "[a-zA-Z]{1,30}") {
        let context = test_context();
        let state = ConversationState::new(MODELS[0]);
        let busy = transition(&state, &context, Event::UserTurn { text: text.clone() }).unwrap().new_state;

        for event in [
            Event::UserTurn { text: text.clone() },
            Event::SuggestionSelected { text },
            Event::Reset,
            Event::SelectModel { path: MODELS[1].to_string() },
        ] {
            prop_assert_eq!(transition(&busy, &context, event).unwrap_err(), TransitionError::Busy);
        }
    }

    #[test]
    fn prop_every_change_publishes(events in proptest::collection::vec(arb_event(), 1..15)) {
        let context = test_context();
        let mut state = ConversationState::new(MODELS[0]);
        for event in events {
            if let Ok(result) = transition(&state, &context, event) {
                let changed = result.new_state.version != state.version;
                prop_assert_eq!(changed, result.effects.contains(&Effect::Publish));
                state = result.new_state;
            }
        }
    }
}
