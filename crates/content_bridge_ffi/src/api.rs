//! FFI content-bridge API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the bridge operations to Dart via FRB.
//! - Route every call through one process-wide `RequestDispatcher`, so the
//!   failure boundary and buffer cleanup are shared by all entry points.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures come back as envelopes with `ok == false` and a diagnostic
//!   message; no Rust error crosses the boundary.
//! - Stream events are pulled with `next_stream_event` in push order.
//! - The bridge serves `file:` handles unless the embedding host installs its
//!   own resolver with `install_content_resolver` before the first call.

use content_bridge_core::{
    core_version as core_version_inner, default_log_level, event_channel,
    init_logging as init_logging_inner, ping as ping_inner, BridgeConfig, CallValue,
    ContentResolver, FileContentResolver, MethodCall, MethodResponse, RequestDispatcher,
    StreamEvent,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const EVENT_WAIT_MAX_MS: u32 = 60_000;

struct Bridge {
    dispatcher: RequestDispatcher,
    events: Receiver<StreamEvent>,
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

impl Bridge {
    fn start(resolver: Arc<dyn ContentResolver>) -> Self {
        let config = BridgeConfig::from_env().unwrap_or_else(|err| {
            warn!("event=bridge_config module=ffi status=error action=use_defaults error={err}");
            BridgeConfig::default()
        });
        let (sink, events) = event_channel();
        Self {
            dispatcher: RequestDispatcher::new(&config, resolver, Arc::new(sink)),
            events,
        }
    }
}

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(|| Bridge::start(Arc::new(FileContentResolver::new())))
}

/// Installs the host resolver behind the process-wide bridge.
///
/// For native hosts embedding this crate (for example a platform layer that
/// serves `content://` handles). Not exported to Dart.
///
/// # Errors
/// - The bridge already started; it keeps the resolver it started with.
#[flutter_rust_bridge::frb(ignore)]
pub fn install_content_resolver(resolver: Arc<dyn ContentResolver>) -> Result<(), String> {
    let mut pending = Some(resolver);
    BRIDGE.get_or_init(|| {
        Bridge::start(
            pending
                .take()
                .unwrap_or_else(|| Arc::new(FileContentResolver::new())),
        )
    });
    match pending {
        None => Ok(()),
        Some(_) => Err("bridge already started; resolver not installed".to_string()),
    }
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive); empty
///   selects the build-mode default (`debug` or `info`).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(effective_log_level(&level), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Bulk fetch result: a native buffer the caller reads and then releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Native buffer address; 0 on failure.
    pub address: u64,
    /// Buffer length in bytes.
    pub length: u64,
    /// Allocation generation, passed back to `release_buffer`.
    pub generation: u64,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    /// Human-readable response message for diagnostics.
    pub message: String,
}

/// Metadata response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub ok: bool,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Stream start envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStartResponse {
    pub ok: bool,
    /// Session id used by every event of this session.
    pub id: Option<u64>,
    pub message: String,
}

/// One pulled stream event.
///
/// `kind` is `data|close|abort`, or `timeout` when nothing arrived in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventResponse {
    pub kind: String,
    pub id: u64,
    /// Chunk offset for `data`; bytes delivered before the failure for `abort`.
    pub offset: u64,
    pub data: Vec<u8>,
    /// Total bytes for `close`.
    pub total_size: u64,
    /// Failure cause for `abort`.
    pub message: String,
}

impl StreamEventResponse {
    fn empty(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: 0,
            offset: 0,
            data: Vec::new(),
            total_size: 0,
            message: String::new(),
        }
    }
}

/// Reads all content behind `uri` into a native buffer.
///
/// # FFI contract
/// - Sync call; blocks for the duration of the read.
/// - Never panics.
/// - On success the buffer stays live until `release_buffer`.
#[flutter_rust_bridge::frb(sync)]
pub fn get_content(uri: String) -> ContentResponse {
    let response = dispatch("getContent", CallValue::Str(uri));
    match response.value() {
        Some(value) => ContentResponse {
            ok: true,
            address: int_field(value, "address"),
            length: int_field(value, "length"),
            generation: int_field(value, "generation"),
            mime_type: str_field(value, "mimeType"),
            file_name: str_field(value, "fileName"),
            message: "Content loaded.".to_string(),
        },
        None => ContentResponse {
            ok: false,
            address: 0,
            length: 0,
            generation: 0,
            mime_type: None,
            file_name: None,
            message: failure_message("get_content", &response),
        },
    }
}

/// Writes `bytes` to `uri`; `mode` is a host mode string such as `w` or `wa`.
///
/// # FFI contract
/// - Sync call, never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn write_content(uri: String, mode: String, bytes: Vec<u8>) -> ActionResponse {
    let response = dispatch(
        "writeContent",
        CallValue::map([
            ("uri", CallValue::Str(uri)),
            ("mode", CallValue::Str(mode)),
            ("bytes", CallValue::Bytes(bytes)),
        ]),
    );
    action_response("write_content", "Content written.", &response)
}

/// Releases a buffer returned by `get_content`.
///
/// With `generation` the release is refused for a reused address.
///
/// # FFI contract
/// - Sync call, never panics.
/// - Releasing an unknown or already-released buffer returns `ok == false`.
#[flutter_rust_bridge::frb(sync)]
pub fn release_buffer(address: u64, generation: Option<u64>) -> ActionResponse {
    let Ok(address) = i64::try_from(address) else {
        return ActionResponse::failure(format!(
            "release_buffer failed: address {address:#x} out of range"
        ));
    };
    let arguments = match generation.map(i64::try_from) {
        None => CallValue::Int(address),
        Some(Ok(generation)) => CallValue::map([
            ("address", CallValue::Int(address)),
            ("generation", CallValue::Int(generation)),
        ]),
        Some(Err(_)) => {
            return ActionResponse::failure("release_buffer failed: generation out of range");
        }
    };
    let response = dispatch("releaseBuffer", arguments);
    action_response("release_buffer", "Buffer released.", &response)
}

/// Copies content behind `uri` to the local file `file_path`.
///
/// # FFI contract
/// - Sync call; blocks for the duration of the copy.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn save_content_to_file(uri: String, file_path: String) -> MetadataResponse {
    let response = dispatch(
        "saveContentToFile",
        CallValue::map([
            ("uri", CallValue::Str(uri)),
            ("filePath", CallValue::Str(file_path)),
        ]),
    );
    metadata_response("save_content_to_file", &response)
}

/// Reports MIME type and display name for `uri`.
///
/// # FFI contract
/// - Sync call, never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn get_content_metadata(uri: String) -> MetadataResponse {
    let response = dispatch("getContentMetadata", CallValue::Str(uri));
    metadata_response("get_content_metadata", &response)
}

/// Starts a chunked stream of `uri` and returns the session id.
///
/// # FFI contract
/// - Sync call; returns once the session worker is running.
/// - Never panics.
/// - Events follow through `next_stream_event`; each `data` event must be
///   acknowledged with `ack_stream_chunk` before the next one is produced.
#[flutter_rust_bridge::frb(sync)]
pub fn stream_content(uri: String, buffer_size: u32, id: Option<u64>) -> StreamStartResponse {
    let mut entries = BTreeMap::new();
    entries.insert("uri".to_string(), CallValue::Str(uri));
    entries.insert(
        "bufferSize".to_string(),
        CallValue::Int(i64::from(buffer_size)),
    );
    if let Some(id) = id {
        let Ok(id) = i64::try_from(id) else {
            return StreamStartResponse {
                ok: false,
                id: None,
                message: "stream_content failed: id out of range".to_string(),
            };
        };
        entries.insert("id".to_string(), CallValue::Int(id));
    }

    let response = dispatch("streamContent", CallValue::Map(entries));
    match response.value() {
        Some(value) => StreamStartResponse {
            ok: true,
            id: Some(int_field(value, "id")),
            message: "Stream started.".to_string(),
        },
        None => StreamStartResponse {
            ok: false,
            id: None,
            message: failure_message("stream_content", &response),
        },
    }
}

/// Acknowledges that the `data` chunk at `offset` of session `id` was consumed.
///
/// # FFI contract
/// - Sync call, non-blocking, never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn ack_stream_chunk(id: u64, offset: u64) -> ActionResponse {
    match bridge().dispatcher.acknowledge(id, offset) {
        Ok(()) => ActionResponse::success("Chunk acknowledged."),
        Err(err) => ActionResponse::failure(format!("ack_stream_chunk failed: {err}")),
    }
}

/// Pulls the next stream event, waiting up to `timeout_ms`.
///
/// # FFI contract
/// - Sync call; blocks at most `timeout_ms` (capped at 60 s).
/// - Never panics; returns kind `timeout` when no event arrived.
#[flutter_rust_bridge::frb(sync)]
pub fn next_stream_event(timeout_ms: u32) -> StreamEventResponse {
    let wait = Duration::from_millis(u64::from(timeout_ms.min(EVENT_WAIT_MAX_MS)));
    match bridge().events.recv_timeout(wait) {
        Ok(event) => to_event_response(event),
        Err(RecvTimeoutError::Timeout) => StreamEventResponse::empty("timeout"),
        Err(RecvTimeoutError::Disconnected) => StreamEventResponse {
            message: "event channel closed".to_string(),
            ..StreamEventResponse::empty("abort")
        },
    }
}

/// Name-routed entry point mirroring the dispatcher.
///
/// Input semantics:
/// - `method`: boundary call name, e.g. `getContent`.
/// - `arguments_json`: JSON arguments; arrays of integers 0..=255 are byte
///   payloads, empty input means no arguments.
///
/// # FFI contract
/// - Sync call, never panics.
/// - Returns the JSON response envelope tagged by `status`.
#[flutter_rust_bridge::frb(sync)]
pub fn handle_method_call(method: String, arguments_json: String) -> String {
    let arguments = if arguments_json.trim().is_empty() {
        Ok(CallValue::Null)
    } else {
        serde_json::from_str::<Value>(&arguments_json)
            .map_err(|err| format!("arguments are not valid JSON: {err}"))
            .and_then(call_value_from_json)
    };
    let response = match arguments {
        Ok(arguments) => dispatch(&method, arguments),
        Err(details) => MethodResponse::Error {
            code: content_bridge_core::dispatch::ERROR_CODE_EXCEPTION.to_string(),
            message: content_bridge_core::dispatch::ERROR_MESSAGE.to_string(),
            details,
        },
    };
    serde_json::to_string(&response).unwrap_or_else(|err| {
        format!(r#"{{"status":"error","code":"exception","message":"Internal error.","details":"{err}"}}"#)
    })
}

fn effective_log_level(level: &str) -> &str {
    if level.trim().is_empty() {
        default_log_level()
    } else {
        level
    }
}

fn dispatch(method: &str, arguments: CallValue) -> MethodResponse {
    bridge().dispatcher.handle(&MethodCall::new(method, arguments))
}

fn call_value_from_json(value: Value) -> Result<CallValue, String> {
    match value {
        Value::Null => Ok(CallValue::Null),
        Value::Bool(flag) => Ok(CallValue::Bool(flag)),
        Value::Number(number) => number
            .as_i64()
            .map(CallValue::Int)
            .ok_or_else(|| format!("number {number} is not a 64-bit integer")),
        Value::String(text) => Ok(CallValue::Str(text)),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| "arrays must contain bytes (0..=255)".to_string())
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(CallValue::Bytes),
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, value)| call_value_from_json(value).map(|value| (key, value)))
            .collect::<Result<BTreeMap<_, _>, String>>()
            .map(CallValue::Map),
    }
}

fn to_event_response(event: StreamEvent) -> StreamEventResponse {
    let kind = event.name();
    match event {
        StreamEvent::Data { id, offset, data } => StreamEventResponse {
            id,
            offset,
            data,
            ..StreamEventResponse::empty(kind)
        },
        StreamEvent::Close { id, total_size } => StreamEventResponse {
            id,
            total_size,
            ..StreamEventResponse::empty(kind)
        },
        StreamEvent::Abort { id, offset, cause } => StreamEventResponse {
            id,
            offset,
            message: cause,
            ..StreamEventResponse::empty(kind)
        },
    }
}

fn action_response(op: &str, message: &str, response: &MethodResponse) -> ActionResponse {
    if response.is_success() {
        ActionResponse::success(message)
    } else {
        ActionResponse::failure(failure_message(op, response))
    }
}

fn metadata_response(op: &str, response: &MethodResponse) -> MetadataResponse {
    match response.value() {
        Some(value) => MetadataResponse {
            ok: true,
            mime_type: str_field(value, "mimeType"),
            file_name: str_field(value, "fileName"),
            message: "Metadata loaded.".to_string(),
        },
        None => MetadataResponse {
            ok: false,
            mime_type: None,
            file_name: None,
            message: failure_message(op, response),
        },
    }
}

fn failure_message(op: &str, response: &MethodResponse) -> String {
    match response {
        MethodResponse::Error { details, .. } => format!("{op} failed: {details}"),
        MethodResponse::NotImplemented => format!("{op} failed: not implemented"),
        MethodResponse::Success { .. } => format!("{op} failed: unexpected response shape"),
    }
}

fn int_field(value: &CallValue, key: &str) -> u64 {
    value
        .get(key)
        .and_then(CallValue::as_int)
        .and_then(|raw| u64::try_from(raw).ok())
        .unwrap_or_default()
}

fn str_field(value: &CallValue, key: &str) -> Option<String> {
    value.get(key).and_then(CallValue::as_str).map(str::to_string)
}
