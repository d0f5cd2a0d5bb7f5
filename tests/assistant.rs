//! Turn loop integration tests
//!
//! Runs the assistant against scripted collaborators, no audio or network

use xiaodou::assistant::DEFAULT_FALLBACK_PHRASE;
use xiaodou::{
    Assistant, Error, HistoryConfig, HistoryManager, Role, SpeechOutcome, TurnOutcome, Utterance,
};

mod common;

use common::{FakeGenerator, FakeSpeaker, ScriptedListener};

fn history() -> HistoryManager {
    HistoryManager::new(HistoryConfig::default())
}

#[tokio::test]
async fn test_recognized_turn_records_both_messages() {
    let generator = FakeGenerator::new([Ok("你好，有什么可以帮你？".to_string())]);
    let speaker = FakeSpeaker::new();
    let listener = ScriptedListener::new([Utterance::Recognized("你好".to_string())]);

    let mut assistant = Assistant::new(listener, generator.clone(), speaker.clone(), history());
    let outcome = assistant.run_turn().await.unwrap();

    match outcome {
        TurnOutcome::Replied { reply, speech } => {
            assert_eq!(reply, "你好，有什么可以帮你？");
            assert_eq!(speech, SpeechOutcome::Spoken);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let history = assistant.history();
    assert_eq!(history.len(), 2);
    let roles: Vec<Role> = history.messages().map(|m| m.role()).collect();
    assert_eq!(roles, [Role::User, Role::Assistant]);

    assert_eq!(speaker.spoken(), ["你好，有什么可以帮你？"]);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_generator_sees_user_message_last() {
    let generator = FakeGenerator::new([Ok("first".to_string()), Ok("second".to_string())]);
    let listener = ScriptedListener::new([
        Utterance::Recognized("one".to_string()),
        Utterance::Recognized("two".to_string()),
    ]);

    let mut assistant = Assistant::new(listener, generator.clone(), FakeSpeaker::new(), history());
    assistant.run_turn().await.unwrap();
    assistant.run_turn().await.unwrap();

    let calls = generator.calls.borrow();
    let second = &calls[1];
    let contents: Vec<&str> = second.iter().map(|m| m.content()).collect();
    assert_eq!(contents, ["one", "first", "two"]);
}

#[tokio::test]
async fn test_sentinels_skip_the_turn() {
    let generator = FakeGenerator::new(Vec::<xiaodou::Result<String>>::new());
    let speaker = FakeSpeaker::new();
    let listener = ScriptedListener::new([
        Utterance::NoMatch,
        Utterance::Canceled,
        Utterance::Unknown,
    ]);

    let mut assistant = Assistant::new(listener, generator.clone(), speaker.clone(), history());

    for expected in [Utterance::NoMatch, Utterance::Canceled, Utterance::Unknown] {
        match assistant.run_turn().await.unwrap() {
            TurnOutcome::Skipped(utterance) => assert_eq!(utterance, expected),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert!(assistant.history().is_empty());
    assert_eq!(generator.call_count(), 0);
    assert!(speaker.spoken().is_empty());
}

#[tokio::test]
async fn test_generation_failure_speaks_fallback() {
    let generator = FakeGenerator::new([Err(Error::Chat("503 Service Unavailable".to_string()))]);
    let speaker = FakeSpeaker::new();
    let listener = ScriptedListener::new([Utterance::Recognized("今天天气怎么样".to_string())]);

    let mut assistant = Assistant::new(listener, generator, speaker.clone(), history());
    let outcome = assistant.run_turn().await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Fallback { error: Error::Chat(_) }));
    assert_eq!(speaker.spoken(), [DEFAULT_FALLBACK_PHRASE]);

    let last = assistant.history().last().unwrap();
    assert_eq!(last.role(), Role::User);
    assert_eq!(last.content(), "今天天气怎么样");
    assert_eq!(assistant.history().len(), 1);
}

#[tokio::test]
async fn test_custom_fallback_phrase() {
    let generator = FakeGenerator::new([Err(Error::Chat("boom".to_string()))]);
    let speaker = FakeSpeaker::new();
    let listener = ScriptedListener::new([Utterance::Recognized("hello".to_string())]);

    let mut assistant = Assistant::new(listener, generator, speaker.clone(), history())
        .with_fallback_phrase("Sorry, please say that again");
    assistant.run_turn().await.unwrap();

    assert_eq!(speaker.spoken(), ["Sorry, please say that again"]);
}

#[tokio::test]
async fn test_synthesis_failure_still_records_reply() {
    let generator = FakeGenerator::new([Ok("reply text".to_string())]);
    let speaker = FakeSpeaker::failing();
    let listener = ScriptedListener::new([Utterance::Recognized("hello".to_string())]);

    let mut assistant = Assistant::new(listener, generator, speaker.clone(), history());
    let outcome = assistant.run_turn().await.unwrap();

    match outcome {
        TurnOutcome::Replied { speech, .. } => {
            assert!(matches!(speech, SpeechOutcome::Failed(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Unlike generation failures, synthesis failures get no fallback phrase
    assert_eq!(speaker.spoken(), ["reply text"]);

    let last = assistant.history().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.content(), "reply text");
}

#[tokio::test]
async fn test_listener_error_ends_the_loop() {
    let generator = FakeGenerator::new([Ok("ok".to_string())]);
    let speaker = FakeSpeaker::new();
    let listener = ScriptedListener::new([Utterance::NoMatch, Utterance::Recognized("hi".to_string())]);

    let mut assistant = Assistant::new(listener, generator.clone(), speaker, history());
    let err = assistant.run().await.unwrap_err();

    assert!(matches!(err, Error::Audio(_)));
    assert_eq!(generator.call_count(), 1);
    assert_eq!(assistant.history().len(), 2);
}

#[tokio::test]
async fn test_history_stays_bounded_across_turns() {
    let replies: Vec<xiaodou::Result<String>> = (0..5).map(|i| Ok(format!("reply {i}"))).collect();
    let generator = FakeGenerator::new(replies);
    let listener = ScriptedListener::new((0..5).map(|i| Utterance::Recognized(format!("ask {i}"))));
    let history = HistoryManager::new(HistoryConfig {
        max_len: 3,
        ..HistoryConfig::default()
    });

    let mut assistant = Assistant::new(listener, generator, FakeSpeaker::new(), history);
    for _ in 0..5 {
        assistant.run_turn().await.unwrap();
    }

    let contents: Vec<&str> = assistant.history().messages().map(|m| m.content()).collect();
    assert_eq!(contents, ["reply 3", "ask 4", "reply 4"]);
}
