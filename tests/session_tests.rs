mod common;

use bytes::Bytes;
use common::{
    drain, json_config, session_with_events, stream_config, RecordingSink, ScriptedBackend,
};
use ski_sage_lib::api::TransportError;
use ski_sage_lib::models::{Message, ModelType};
use ski_sage_lib::session::{SessionEvent, SessionPhase, FAILURE_NOTICE};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn streamed_fragments_are_joined_in_order() {
    let backend = ScriptedBackend::stream(vec![
        "data: Fresh",
        " powder\r\nevent: message\ndata:  all",
        " day \n",
        ": keep-alive\n",
        "data: [DONE]\n",
        "data: after the end\n",
    ]);
    let (mut session, mut events) = session_with_events(backend.clone(), stream_config(Duration::ZERO));
    let mut sink = RecordingSink::default();

    session.submit("Is it snowing?", ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(
        session.messages(),
        &[
            Message::user("Is it snowing?"),
            Message::assistant("Fresh powder  all day"),
        ]
    );
    assert!(!session.is_loading());
    assert_eq!(session.current_streaming_message(), "");
    assert_eq!(session.phase(), SessionPhase::Idle);

    let streamed: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::StreamingMessage(text) if !text.is_empty() => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, vec!["Fresh powder".to_string(), "Fresh powder  all day".to_string()]);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "Is it snowing?");
    assert_eq!(requests[0].chat_id, None);
}

#[tokio::test]
async fn coalesced_rendering_still_shows_and_keeps_every_fragment() {
    let backend = ScriptedBackend::stream(vec![
        "data: one\n",
        "data: two\n",
        "data: three\n",
        "data: [DONE]\n",
    ]);
    let (mut session, mut events) =
        session_with_events(backend, stream_config(Duration::from_secs(3600)));
    let mut sink = RecordingSink::default();

    session.submit("count", ModelType::Map, &mut sink).await;

    assert_eq!(session.messages().last(), Some(&Message::assistant("one two three")));
    let streamed: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::StreamingMessage(text) if !text.is_empty() => Some(text),
            _ => None,
        })
        .collect();
    // First fragment renders at once; the rest are flushed together at the end.
    assert_eq!(streamed, vec!["one".to_string(), "one two three".to_string()]);
}

#[tokio::test]
async fn whitespace_submission_changes_nothing() {
    let backend = ScriptedBackend::json(200, r#"{"response":"unused"}"#);
    let (mut session, mut events) = session_with_events(backend.clone(), json_config());
    let mut sink = RecordingSink::default();

    session.set_input("   \n\t ");
    session.handle_submit(ModelType::Encyclopedia, &mut sink).await;
    session.submit("", ModelType::Encyclopedia, &mut sink).await;

    assert!(session.messages().is_empty());
    assert!(!session.is_loading());
    assert!(backend.requests().is_empty());
    assert!(sink.updates.is_empty());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn handle_submit_consumes_the_input_buffer() {
    let backend = ScriptedBackend::json(200, r#"{"response":"Wax it."}"#);
    let (mut session, _events) = session_with_events(backend, json_config());
    let mut sink = RecordingSink::default();

    session.set_input("How do I wax skis?");
    session.handle_submit(ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(session.input(), "");
    assert_eq!(
        session.messages(),
        &[Message::user("How do I wax skis?"), Message::assistant("Wax it.")]
    );
}

#[tokio::test]
async fn server_error_appends_a_single_failure_notice() {
    let backend = ScriptedBackend::json(500, r#"{"message":"model unavailable"}"#);
    let (mut session, mut events) = session_with_events(backend, json_config());
    let mut sink = RecordingSink::default();

    session.submit("Best skis for powder?", ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(
        session.messages(),
        &[Message::user("Best skis for powder?"), Message::assistant(FAILURE_NOTICE)]
    );
    assert!(!session.is_loading());
    match session.last_error() {
        Some(TransportError::Status { status, detail }) => {
            assert_eq!(*status, 500);
            assert_eq!(detail, "model unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed(_))));
    assert_eq!(events.last(), Some(&SessionEvent::MessagesChanged(session.messages().to_vec())));
}

#[tokio::test]
async fn stream_error_discards_the_partial_reply() {
    let (backend, tx) = ScriptedBackend::live_stream();
    tx.send(Ok(Bytes::from_static(b"data: half an ans"))).unwrap();
    tx.send(Ok(Bytes::from_static(b"wer\n"))).unwrap();
    tx.send(Err(TransportError::MalformedBody("connection reset".to_string())))
        .unwrap();
    let (mut session, _events) = session_with_events(backend, stream_config(Duration::ZERO));
    let mut sink = RecordingSink::default();

    session.submit("q", ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(session.messages(), &[Message::user("q"), Message::assistant(FAILURE_NOTICE)]);
    assert_eq!(session.current_streaming_message(), "");
    assert_eq!(session.stream_state().accumulated_text, "");
    assert!(!session.is_loading());
}

#[tokio::test]
async fn stream_closed_without_marker_keeps_what_arrived() {
    let backend = ScriptedBackend::stream(vec!["data: groomers are ", "\ndata: fast"]);
    let (mut session, _events) = session_with_events(backend, stream_config(Duration::ZERO));
    let mut sink = RecordingSink::default();

    session.submit("conditions?", ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(session.messages().last(), Some(&Message::assistant("groomers are  fast")));
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn empty_stream_is_a_failure() {
    let backend = ScriptedBackend::stream(vec!["event: ping\n"]);
    let (mut session, _events) = session_with_events(backend, stream_config(Duration::ZERO));
    let mut sink = RecordingSink::default();

    session.submit("hello?", ModelType::Encyclopedia, &mut sink).await;

    assert_eq!(session.messages().last(), Some(&Message::assistant(FAILURE_NOTICE)));
    assert!(matches!(session.last_error(), Some(TransportError::EmptyStream)));
}

#[tokio::test]
async fn teardown_mid_stream_freezes_all_state() {
    let (backend, tx) = ScriptedBackend::live_stream();
    let (mut session, mut events) = session_with_events(backend, stream_config(Duration::ZERO));
    let scope = session.scope();
    let mut sink = RecordingSink::default();

    let driver = async {
        tx.send(Ok(Bytes::from_static(b"data: first\n"))).unwrap();
        while let Some(event) = events.recv().await {
            if event == SessionEvent::StreamingMessage("first".to_string()) {
                break;
            }
        }
        scope.teardown();
        tx.send(Ok(Bytes::from_static(b"data: second\n"))).unwrap();
        tx.send(Ok(Bytes::from_static(b"data: [DONE]\n"))).unwrap();
    };
    tokio::join!(session.submit("q", ModelType::Encyclopedia, &mut sink), driver);

    assert_eq!(session.messages(), &[Message::user("q")]);
    assert_eq!(session.current_streaming_message(), "first");
    assert_eq!(session.stream_state().accumulated_text, "first");
    assert!(drain(&mut events).is_empty());

    // A torn-down session also refuses new work.
    session.submit("again", ModelType::Encyclopedia, &mut sink).await;
    assert_eq!(session.messages(), &[Message::user("q")]);
}

#[tokio::test]
async fn teardown_during_completion_grace_drops_the_reply() {
    let backend = ScriptedBackend::stream(vec!["data: late\n", "data: [DONE]\n"]);
    let mut config = stream_config(Duration::ZERO);
    config.completion_grace = Duration::from_millis(200);
    let (mut session, mut events) = session_with_events(backend, config);
    let scope = session.scope();
    let mut sink = RecordingSink::default();

    let driver = async {
        while let Some(event) = events.recv().await {
            if event == SessionEvent::StreamingMessage("late".to_string()) {
                break;
            }
        }
        scope.teardown();
    };
    tokio::join!(session.submit("q", ModelType::Encyclopedia, &mut sink), driver);

    assert_eq!(session.messages(), &[Message::user("q")]);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn attached_transcript_is_handed_to_the_sink() {
    let backend = ScriptedBackend::json(200, r#"{"response":"Try rockered powder skis."}"#);
    let (mut session, _events) = session_with_events(backend.clone(), json_config());
    let mut sink = RecordingSink::default();
    let id = Uuid::new_v4();
    session.associate(Some(id), Vec::new());

    session.submit("Best skis for powder?", ModelType::Map, &mut sink).await;

    assert_eq!(sink.updates.len(), 2);
    assert_eq!(sink.updates[0], (id, vec![Message::user("Best skis for powder?")]));
    assert_eq!(sink.updates[1].1, session.messages().to_vec());
    assert_eq!(backend.requests()[0].chat_id, Some(id));
    assert_eq!(backend.requests()[0].model_type, ModelType::Map);
}
