use content_bridge_core::{
    event_channel, BridgeConfig, CallValue, FileContentResolver, MethodCall, MethodResponse,
    RequestDispatcher, StreamEvent,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn file_dispatcher() -> (RequestDispatcher, crossbeam_channel::Receiver<StreamEvent>) {
    let (sink, events) = event_channel();
    let dispatcher = RequestDispatcher::new(
        &BridgeConfig::default(),
        Arc::new(FileContentResolver::new()),
        Arc::new(sink),
    );
    (dispatcher, events)
}

#[test]
fn get_content_reads_local_file_with_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    fs::write(&path, b"quarterly numbers").unwrap();
    let (dispatcher, _events) = file_dispatcher();

    let response = dispatcher.handle(&MethodCall::new(
        "getContent",
        file_uri(&path).into(),
    ));
    let value = response.value().unwrap();
    assert_eq!(value.get("fileName"), Some(&CallValue::from("report.txt")));
    assert_eq!(value.get("mimeType"), Some(&CallValue::from("text/plain")));
    let address = value.get("address").and_then(CallValue::as_int).unwrap() as u64;
    assert_eq!(
        dispatcher.arena().read_buffer(address).unwrap(),
        b"quarterly numbers"
    );
}

#[test]
fn save_content_to_file_copies_bytes_and_returns_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("photo.png");
    let destination = dir.path().join("copy.bin");
    let payload: Vec<u8> = (0..200_000u32).map(|n| (n % 251) as u8).collect();
    fs::write(&source, &payload).unwrap();
    let (dispatcher, _events) = file_dispatcher();

    let response = dispatcher.handle(&MethodCall::new(
        "saveContentToFile",
        CallValue::map([
            ("uri", file_uri(&source).into()),
            ("filePath", destination.display().to_string().into()),
        ]),
    ));
    let value = response.value().unwrap();
    assert_eq!(value.get("fileName"), Some(&CallValue::from("photo.png")));
    assert_eq!(value.get("mimeType"), Some(&CallValue::from("image/png")));
    assert_eq!(fs::read(&destination).unwrap(), payload);
}

#[test]
fn write_then_stream_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    let uri = file_uri(&path);
    let (dispatcher, events) = file_dispatcher();

    for (mode, bytes) in [("w", &b"alpha"[..]), ("wa", &b"-beta"[..])] {
        let response = dispatcher.handle(&MethodCall::new(
            "writeContent",
            CallValue::map([
                ("uri", uri.as_str().into()),
                ("mode", mode.into()),
                ("bytes", bytes.to_vec().into()),
            ]),
        ));
        assert!(response.is_success(), "{response:?}");
    }

    let started = dispatcher.handle(&MethodCall::new(
        "streamContent",
        CallValue::map([("uri", uri.as_str().into()), ("bufferSize", CallValue::Int(3))]),
    ));
    let id = started
        .value()
        .and_then(|value| value.get("id"))
        .and_then(CallValue::as_int)
        .unwrap() as u64;

    let mut streamed = Vec::new();
    loop {
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            StreamEvent::Data { offset, data, .. } => {
                streamed.extend_from_slice(&data);
                dispatcher.acknowledge(id, offset).unwrap();
            }
            StreamEvent::Close { total_size, .. } => {
                assert_eq!(total_size, 10);
                break;
            }
            StreamEvent::Abort { cause, .. } => panic!("unexpected abort: {cause}"),
        }
    }
    assert_eq!(streamed, b"alpha-beta");
}

#[test]
fn missing_local_file_is_reported_as_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _events) = file_dispatcher();
    let response = dispatcher.handle(&MethodCall::new(
        "getContentMetadata",
        file_uri(&dir.path().join("absent.txt")).into(),
    ));
    // Metadata is extension-derived, so a missing file still answers.
    assert!(response.is_success(), "{response:?}");

    let fetched = dispatcher.handle(&MethodCall::new(
        "getContent",
        file_uri(&dir.path().join("absent.txt")).into(),
    ));
    assert!(matches!(fetched, MethodResponse::Error { .. }));
}

#[test]
fn encoded_uris_and_bare_paths_reach_files_with_spaces_and_non_ascii_names() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _events) = file_dispatcher();

    for name in ["my file.txt", "naïve café.txt"] {
        let path = dir.path().join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        let encoded = url::Url::from_file_path(&path).unwrap().to_string();
        let bare = path.display().to_string();

        for uri in [encoded, bare] {
            let response = dispatcher.handle(&MethodCall::new("getContent", uri.as_str().into()));
            let value = response
                .value()
                .unwrap_or_else(|| panic!("{uri} should load: {response:?}"));
            assert_eq!(value.get("fileName"), Some(&CallValue::from(name)));
            let address = value.get("address").and_then(CallValue::as_int).unwrap();
            assert_eq!(
                dispatcher.arena().read_buffer(address as u64).unwrap(),
                name.as_bytes()
            );
            let released =
                dispatcher.handle(&MethodCall::new("releaseBuffer", CallValue::Int(address)));
            assert!(released.is_success());
        }
    }
}
