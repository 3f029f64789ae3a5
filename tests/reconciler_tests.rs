use voicebridge::{GenerationStage, Message, Role, StopReason, TranscriptReconciler};

fn message(role: Role, content: &str) -> Message {
    Message {
        role,
        content: content.to_string(),
    }
}

/// Apply one of the three lifecycle calls for a fixed generation.
fn apply(reconciler: &mut TranscriptReconciler, id: &str, call: u8) {
    match call {
        0 => reconciler.on_text_start(id, Role::Assistant, GenerationStage::Speculative),
        1 => reconciler.on_text_output(id, Role::Assistant, "hello there"),
        2 => reconciler.on_text_stop(id, StopReason::EndTurn),
        _ => unreachable!(),
    }
}

#[test]
fn test_all_six_orderings_resolve_identically() {
    let orderings: [[u8; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for ordering in orderings {
        let mut reconciler = TranscriptReconciler::new();
        for call in ordering {
            apply(&mut reconciler, "gen-1", call);
        }

        assert_eq!(
            reconciler.messages(),
            vec![message(Role::Assistant, "hello there")],
            "ordering {:?} diverged",
            ordering
        );
    }
}

#[test]
fn test_nothing_resolves_before_all_fields_known() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Speculative);
    assert!(reconciler.messages().is_empty());

    reconciler.on_text_output("gen-1", Role::Assistant, "partial");
    // Speculative with no stop reason: still provisional
    assert!(reconciler.messages().is_empty());

    reconciler.on_text_stop("gen-1", StopReason::EndTurn);
    assert_eq!(reconciler.messages().len(), 1);
}

#[test]
fn test_final_stage_resolves_without_stop_reason() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::User, GenerationStage::Final);
    reconciler.on_text_output("gen-1", Role::User, "what time is it");

    assert_eq!(
        reconciler.messages(),
        vec![message(Role::User, "what time is it")]
    );
}

#[test]
fn test_fragments_accumulate_within_one_generation() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_output("gen-1", Role::Assistant, "it is");
    reconciler.on_text_output("gen-1", Role::Assistant, "three o'clock");
    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Final);

    assert_eq!(
        reconciler.messages(),
        vec![message(Role::Assistant, "it is three o'clock")]
    );
}

#[test]
fn test_same_role_entries_merge_with_single_space() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-1", Role::Assistant, "foo");
    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-2", Role::Assistant, "bar");

    assert_eq!(reconciler.messages(), vec![message(Role::Assistant, "foo bar")]);
}

#[test]
fn test_role_change_starts_new_message_even_when_empty() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::User, GenerationStage::Final);
    reconciler.on_text_output("gen-1", Role::User, "");

    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-2", Role::Assistant, "hi");

    assert_eq!(
        reconciler.messages(),
        vec![message(Role::User, ""), message(Role::Assistant, "hi")]
    );
}

#[test]
fn test_interleaved_generations_keep_independent_state() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-a", Role::User, GenerationStage::Speculative);
    reconciler.on_text_start("gen-b", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-b", Role::Assistant, "answer");
    reconciler.on_text_output("gen-a", Role::User, "question");
    reconciler.on_text_stop("gen-a", StopReason::EndTurn);
    reconciler.on_text_stop("gen-b", StopReason::EndTurn);

    assert_eq!(
        reconciler.messages(),
        vec![
            message(Role::User, "question"),
            message(Role::Assistant, "answer")
        ]
    );
}

#[test]
fn test_interruption_discards_content_and_suppresses_assistant() {
    let mut reconciler = TranscriptReconciler::new();

    // Barge-in: the assistant was cut off mid-utterance
    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-1", Role::Assistant, "hello");
    reconciler.on_text_stop("gen-1", StopReason::Interrupted);

    assert!(reconciler.messages().is_empty());

    // A fully final assistant entry right after the barge-in is still stale
    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-2", Role::Assistant, "world");
    reconciler.on_text_stop("gen-2", StopReason::EndTurn);

    assert!(reconciler.messages().is_empty());
}

#[test]
fn test_user_entry_clears_interruption_suppression() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-1", Role::Assistant, "hello");
    reconciler.on_text_stop("gen-1", StopReason::Interrupted);

    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-2", Role::Assistant, "dropped");

    reconciler.on_text_start("gen-3", Role::User, GenerationStage::Final);
    reconciler.on_text_output("gen-3", Role::User, "stop talking");

    reconciler.on_text_start("gen-4", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-4", Role::Assistant, "okay");

    assert_eq!(
        reconciler.messages(),
        vec![
            message(Role::User, "stop talking"),
            message(Role::Assistant, "okay")
        ]
    );
}

#[test]
fn test_partial_turn_contributes_content() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-1", Role::Assistant, "first half");
    reconciler.on_text_stop("gen-1", StopReason::PartialTurn);

    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-2", Role::Assistant, "second half");
    reconciler.on_text_stop("gen-2", StopReason::EndTurn);

    assert_eq!(
        reconciler.messages(),
        vec![message(Role::Assistant, "first half second half")]
    );
}

#[test]
fn test_seed_places_system_message_first() {
    let mut reconciler = TranscriptReconciler::new();
    reconciler.seed(Role::System, "You are helpful");

    reconciler.on_text_start("gen-1", Role::User, GenerationStage::Final);
    reconciler.on_text_output("gen-1", Role::User, "hi");

    assert_eq!(
        reconciler.messages(),
        vec![
            message(Role::System, "You are helpful"),
            message(Role::User, "hi")
        ]
    );
}

#[test]
fn test_clear_resets_everything() {
    let mut reconciler = TranscriptReconciler::new();

    reconciler.seed(Role::System, "prompt");
    reconciler.on_text_start("gen-1", Role::Assistant, GenerationStage::Speculative);
    reconciler.on_text_output("gen-1", Role::Assistant, "x");
    reconciler.on_text_stop("gen-1", StopReason::Interrupted);

    reconciler.clear();

    assert!(reconciler.messages().is_empty());

    // Suppression flag must not leak across sessions
    reconciler.on_text_start("gen-2", Role::Assistant, GenerationStage::Final);
    reconciler.on_text_output("gen-2", Role::Assistant, "fresh");
    assert_eq!(reconciler.messages(), vec![message(Role::Assistant, "fresh")]);
}

#[test]
fn test_replay_is_deterministic() {
    let run = || {
        let mut reconciler = TranscriptReconciler::new();
        reconciler.seed(Role::System, "sys");
        reconciler.on_text_output("a", Role::User, "one");
        reconciler.on_text_start("b", Role::Assistant, GenerationStage::Speculative);
        reconciler.on_text_start("a", Role::User, GenerationStage::Final);
        reconciler.on_text_output("b", Role::Assistant, "two");
        reconciler.on_text_stop("b", StopReason::EndTurn);
        reconciler.messages()
    };

    assert_eq!(run(), run());
}
