#![cfg(feature = "tokio")]

use workflow_commands::{
    AsyncLineSplitter, Event, EventKind, MaskSet, OptionValue, SplitLimits, StreamInterpreter,
};

async fn interpret_stdout(input: &[u8]) -> Vec<Event> {
    let mut splitter = AsyncLineSplitter::new(input, SplitLimits::default().max_line_bytes);
    let mut interpreter = StreamInterpreter::primary(MaskSet::new());
    let mut events = Vec::new();
    while let Some(line) = splitter.next_line().await {
        let line = line.expect("line");
        events.extend(interpreter.interpret(&line));
    }
    events
}

#[tokio::test]
async fn debug_command_becomes_command_event() {
    let events = interpret_stdout(b"::debug::ichiro\n").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Command);
    assert_eq!(events[0].text, "debug");
    assert_eq!(events[0].data.as_deref(), Some("ichiro"));
    assert_eq!(events[0].properties, None);
}

#[tokio::test]
async fn error_annotation_gets_defaults() {
    let events = interpret_stdout(b"::error file=foo.yml,line=10::Wrong\r\n").await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.command_name(), Some("error"));
    assert_eq!(event.data.as_deref(), Some("Wrong"));
    let props = event.properties.as_ref().expect("properties");
    assert_eq!(props.get("file"), Some(&OptionValue::Text("foo.yml".into())));
    assert_eq!(props.get("line"), Some(&OptionValue::Integer(10)));
    assert_eq!(props.get("endLine"), Some(&OptionValue::Integer(1)));
    for absent in ["col", "endColumn", "title"] {
        assert!(!props.contains_key(absent), "{absent} should be absent");
    }
    assert_eq!(event.size, "::error file=foo.yml,line=10::Wrong".len());
}

#[tokio::test]
async fn masks_apply_only_after_registration() {
    let events = interpret_stdout(
        b"my name is ichiro\n::add-mask::ichiro\nmy name is ichiro\n::debug::ichiro says hi\n",
    )
    .await;
    let texts: Vec<(&str, Option<&str>)> = events
        .iter()
        .map(|e| (e.text.as_str(), e.data.as_deref()))
        .collect();
    assert_eq!(
        texts,
        vec![
            ("my name is ichiro", None),
            ("my name is ***", None),
            ("debug", Some("*** says hi")),
        ]
    );
}

#[tokio::test]
async fn stop_commands_makes_add_mask_inert_until_resumed() {
    let events = interpret_stdout(
        b"::stop-commands::TOKEN\n::add-mask::x\n::TOKEN::\n::add-mask::y\nx y\n",
    )
    .await;
    let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["::add-mask::x", "x ***"]);
    assert!(events.iter().all(|e| e.kind == EventKind::Stdout));
}
