//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `content_bridge_core` linkage.
//! - Exercise bulk fetch, metadata and acked streaming for one URI.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `content_bridge_cli [uri] [buffer_size]`. Without a URI an
//! in-memory demo document is used.

use content_bridge_core::{
    event_channel, BridgeConfig, CallValue, ContentResolver, FileContentResolver,
    MemoryContentResolver, MethodCall, RequestDispatcher, StreamEvent,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const DEMO_URI: &str = "mem://demo/greeting.txt";
const DEFAULT_BUFFER_SIZE: i64 = 16;
const EVENT_WAIT: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    println!("content_bridge_core ping={}", content_bridge_core::ping());
    println!(
        "content_bridge_core version={}",
        content_bridge_core::core_version()
    );

    let mut args = std::env::args().skip(1);
    let uri = args.next();
    let buffer_size = match args.next().map(|raw| raw.parse::<i64>()) {
        None => DEFAULT_BUFFER_SIZE,
        Some(Ok(size)) => size,
        Some(Err(err)) => {
            eprintln!("invalid buffer_size: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(uri, buffer_size) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(uri: Option<String>, buffer_size: i64) -> Result<(), String> {
    let (resolver, uri): (Arc<dyn ContentResolver>, String) = match uri {
        Some(uri) => (Arc::new(FileContentResolver::new()), uri),
        None => {
            let demo = MemoryContentResolver::new();
            demo.insert_with_metadata(
                DEMO_URI,
                b"hello from the content bridge demo".to_vec(),
                Some("text/plain"),
                Some("greeting.txt"),
            );
            (Arc::new(demo), DEMO_URI.to_string())
        }
    };
    let config = BridgeConfig::from_env().map_err(|err| format!("config: {err}"))?;
    let (sink, events) = event_channel();
    let dispatcher = RequestDispatcher::new(&config, resolver, Arc::new(sink));

    let metadata = dispatcher.handle(&MethodCall::new(
        "getContentMetadata",
        CallValue::Str(uri.clone()),
    ));
    println!("metadata={}", to_json(&metadata)?);

    let fetched = dispatcher.handle(&MethodCall::new("getContent", CallValue::Str(uri.clone())));
    let value = fetched
        .value()
        .ok_or_else(|| format!("getContent failed: {}", to_json(&fetched).unwrap_or_default()))?;
    let address = value.get("address").and_then(CallValue::as_int).unwrap_or_default();
    println!(
        "bulk length={}",
        value.get("length").and_then(CallValue::as_int).unwrap_or_default()
    );
    let released = dispatcher.handle(&MethodCall::new("releaseBuffer", CallValue::Int(address)));
    println!("release={}", to_json(&released)?);

    let started = dispatcher.handle(&MethodCall::new(
        "streamContent",
        CallValue::map([
            ("uri", CallValue::Str(uri)),
            ("bufferSize", CallValue::Int(buffer_size)),
        ]),
    ));
    let id = started
        .value()
        .and_then(|value| value.get("id"))
        .and_then(CallValue::as_int)
        .ok_or_else(|| format!("streamContent failed: {}", to_json(&started).unwrap_or_default()))?;
    let id = u64::try_from(id).map_err(|_| format!("invalid session id {id}"))?;

    loop {
        let event = events
            .recv_timeout(EVENT_WAIT)
            .map_err(|err| format!("stream {id}: {err}"))?;
        println!("{}", to_json(&event)?);
        match event {
            StreamEvent::Data { offset, .. } => dispatcher
                .acknowledge(id, offset)
                .map_err(|err| format!("ack: {err}"))?,
            StreamEvent::Close { .. } => return Ok(()),
            StreamEvent::Abort { cause, .. } => return Err(format!("stream aborted: {cause}")),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|err| format!("serialize: {err}"))
}
