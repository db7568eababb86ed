//! Request dispatcher and its single failure boundary.

use super::value::{CallValue, MethodCall, MethodResponse};
use crate::arena::{BufferHandle, NativeBufferArena, PendingBuffer};
use crate::config::BridgeConfig;
use crate::content::{ContentAccessor, ContentHandle, ContentMetadata, ContentResolver, WriteMode};
use crate::error::{BridgeError, BridgeResult, ProtocolError};
use crate::streaming::{EventSink, SessionId, StreamTask, StreamingProtocol};
use crate::transfer::{BulkTransfer, FetchedContent};
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub const METHOD_GET_CONTENT: &str = "getContent";
pub const METHOD_WRITE_CONTENT: &str = "writeContent";
pub const METHOD_RELEASE_BUFFER: &str = "releaseBuffer";
pub const METHOD_SAVE_CONTENT_TO_FILE: &str = "saveContentToFile";
pub const METHOD_GET_CONTENT_METADATA: &str = "getContentMetadata";
pub const METHOD_STREAM_CONTENT: &str = "streamContent";

/// Known boundary calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    GetContent,
    WriteContent,
    ReleaseBuffer,
    SaveContentToFile,
    GetContentMetadata,
    StreamContent,
}

impl Route {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            METHOD_GET_CONTENT => Some(Self::GetContent),
            METHOD_WRITE_CONTENT => Some(Self::WriteContent),
            METHOD_RELEASE_BUFFER => Some(Self::ReleaseBuffer),
            METHOD_SAVE_CONTENT_TO_FILE => Some(Self::SaveContentToFile),
            METHOD_GET_CONTENT_METADATA => Some(Self::GetContentMetadata),
            METHOD_STREAM_CONTENT => Some(Self::StreamContent),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetContent => METHOD_GET_CONTENT,
            Self::WriteContent => METHOD_WRITE_CONTENT,
            Self::ReleaseBuffer => METHOD_RELEASE_BUFFER,
            Self::SaveContentToFile => METHOD_SAVE_CONTENT_TO_FILE,
            Self::GetContentMetadata => METHOD_GET_CONTENT_METADATA,
            Self::StreamContent => METHOD_STREAM_CONTENT,
        }
    }
}

/// Routes boundary calls to the arena, bulk transfer and streaming protocol.
pub struct RequestDispatcher {
    arena: Arc<NativeBufferArena>,
    accessor: ContentAccessor,
    bulk: BulkTransfer,
    streaming: StreamingProtocol,
}

impl RequestDispatcher {
    pub fn new(
        config: &BridgeConfig,
        resolver: Arc<dyn ContentResolver>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let arena = Arc::new(NativeBufferArena::new(config.max_live_bytes));
        let accessor = ContentAccessor::new(resolver);
        let bulk = BulkTransfer::new(accessor.clone(), Arc::clone(&arena), config.max_bulk_bytes);
        let streaming =
            StreamingProtocol::new(sink, config.ack_timeout, config.max_stream_buffer_size);
        Self {
            arena,
            accessor,
            bulk,
            streaming,
        }
    }

    pub fn arena(&self) -> &NativeBufferArena {
        &self.arena
    }

    pub fn streaming(&self) -> &StreamingProtocol {
        &self.streaming
    }

    /// Forwards a chunk acknowledgment to its session.
    pub fn acknowledge(&self, id: SessionId, offset: u64) -> Result<(), ProtocolError> {
        self.streaming.acknowledge(id, offset)
    }

    /// Handles one boundary call.
    ///
    /// On failure any buffer produced by this call is released before the
    /// generic error envelope is returned.
    pub fn handle(&self, call: &MethodCall) -> MethodResponse {
        let Some(route) = Route::from_name(call.method.as_str()) else {
            info!(
                "event=dispatch module=dispatch status=not_implemented method={}",
                crate::logging::sanitize_for_log(&call.method)
            );
            return MethodResponse::NotImplemented;
        };

        let started_at = Instant::now();
        let mut produced: Option<PendingBuffer> = None;
        match self.route(route, &call.arguments, &mut produced) {
            Ok(value) => {
                if let Some(pending) = produced.take() {
                    pending.hand_off();
                }
                info!(
                    "event=dispatch module=dispatch status=ok method={} duration_ms={}",
                    route.name(),
                    started_at.elapsed().as_millis()
                );
                MethodResponse::success(value)
            }
            Err(err) => {
                if let Some(pending) = produced.take() {
                    warn!(
                        "event=dispatch module=dispatch status=cleanup method={} action=release_buffer",
                        route.name()
                    );
                    pending.release();
                }
                error!(
                    "event=dispatch module=dispatch status=error method={} error_kind={} duration_ms={} error={err}",
                    route.name(),
                    err.kind().as_str(),
                    started_at.elapsed().as_millis()
                );
                MethodResponse::internal_error(&err)
            }
        }
    }

    fn route(
        &self,
        route: Route,
        args: &CallValue,
        produced: &mut Option<PendingBuffer>,
    ) -> BridgeResult<CallValue> {
        match route {
            Route::GetContent => self.get_content(args, produced),
            Route::WriteContent => self.write_content(args),
            Route::ReleaseBuffer => self.release_buffer(args),
            Route::SaveContentToFile => self.save_content_to_file(args),
            Route::GetContentMetadata => {
                let handle = uri_argument(args)?;
                Ok(metadata_value(self.accessor.query_metadata(&handle)?))
            }
            Route::StreamContent => self.stream_content(args).map(|task| {
                CallValue::map([("id", CallValue::Int(task.id() as i64))])
            }),
        }
    }

    fn get_content(
        &self,
        args: &CallValue,
        produced: &mut Option<PendingBuffer>,
    ) -> BridgeResult<CallValue> {
        let handle = uri_argument(args)?;
        let FetchedContent { buffer, metadata } = self.bulk.fetch_all(&handle)?;
        let native = buffer.buffer().copied().ok_or_else(|| {
            BridgeError::InvalidArgument("bulk fetch produced no buffer".to_string())
        })?;
        *produced = Some(buffer);

        let address = i64::try_from(native.address()).map_err(|_| {
            BridgeError::InvalidArgument(format!(
                "buffer address {:#x} does not fit a boundary integer",
                native.address()
            ))
        })?;
        let length = i64::try_from(native.length).map_err(|_| {
            BridgeError::InvalidArgument(format!(
                "buffer length {} does not fit a boundary integer",
                native.length
            ))
        })?;

        Ok(CallValue::map([
            ("address", CallValue::Int(address)),
            ("length", CallValue::Int(length)),
            ("generation", CallValue::Int(native.generation() as i64)),
            ("mimeType", CallValue::optional_str(metadata.mime_type)),
            ("fileName", CallValue::optional_str(metadata.file_name)),
        ]))
    }

    fn write_content(&self, args: &CallValue) -> BridgeResult<CallValue> {
        let handle = parse_handle(required_str(args, "uri")?)?;
        let raw_mode = required_str(args, "mode")?;
        let mode = WriteMode::parse(raw_mode).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("unsupported write mode `{raw_mode}`"))
        })?;
        let bytes = args
            .get("bytes")
            .and_then(CallValue::as_bytes)
            .ok_or_else(|| missing_argument("bytes"))?;
        self.bulk.write_content(&handle, mode, bytes)?;
        Ok(CallValue::Int(0))
    }

    fn release_buffer(&self, args: &CallValue) -> BridgeResult<CallValue> {
        let (address, generation) = match args {
            CallValue::Int(address) => (*address, None),
            CallValue::Map(_) => (
                args.get("address")
                    .and_then(CallValue::as_int)
                    .ok_or_else(|| missing_argument("address"))?,
                args.get("generation").and_then(CallValue::as_int),
            ),
            _ => return Err(missing_argument("address")),
        };
        let address = non_negative(address, "address")?;

        match generation {
            Some(generation) => self.arena.release_handle(BufferHandle {
                address,
                generation: non_negative(generation, "generation")?,
            })?,
            None => self.arena.release(address)?,
        };
        Ok(CallValue::Int(0))
    }

    fn save_content_to_file(&self, args: &CallValue) -> BridgeResult<CallValue> {
        let handle = parse_handle(required_str(args, "uri")?)?;
        let file_path = required_str(args, "filePath")?;
        let metadata = self.bulk.save_to_local_file(&handle, Path::new(file_path))?;
        Ok(metadata_value(metadata))
    }

    /// Opens the source and starts a session; returns the worker handle.
    ///
    /// The source is opened before any session exists, so an unresolvable
    /// handle fails here without emitting events.
    pub fn stream_content(&self, args: &CallValue) -> BridgeResult<StreamTask> {
        let handle = parse_handle(required_str(args, "uri")?)?;
        let buffer_size = args
            .get("bufferSize")
            .and_then(CallValue::as_int)
            .ok_or_else(|| missing_argument("bufferSize"))?;
        let buffer_size = usize::try_from(buffer_size).map_err(|_| {
            BridgeError::InvalidArgument(format!("bufferSize must be positive, got {buffer_size}"))
        })?;
        let requested_id = match args.get("id") {
            None | Some(CallValue::Null) => None,
            Some(CallValue::Int(id)) => Some(non_negative(*id, "id")?),
            Some(_) => return Err(BridgeError::InvalidArgument("id must be an integer".into())),
        };

        let source = self.accessor.open_read_stream(&handle)?;
        self.streaming.start(requested_id, source, buffer_size)
    }
}

fn uri_argument(args: &CallValue) -> BridgeResult<ContentHandle> {
    let raw = match args {
        CallValue::Str(uri) => uri.as_str(),
        CallValue::Map(_) => required_str(args, "uri")?,
        _ => return Err(missing_argument("uri")),
    };
    parse_handle(raw)
}

fn parse_handle(raw: &str) -> BridgeResult<ContentHandle> {
    Ok(ContentHandle::parse(raw)?)
}

fn required_str<'a>(args: &'a CallValue, key: &str) -> BridgeResult<&'a str> {
    args.get(key)
        .and_then(CallValue::as_str)
        .ok_or_else(|| missing_argument(key))
}

fn missing_argument(key: &str) -> BridgeError {
    BridgeError::InvalidArgument(format!("missing or mistyped argument `{key}`"))
}

fn non_negative(value: i64, key: &str) -> BridgeResult<u64> {
    u64::try_from(value)
        .map_err(|_| BridgeError::InvalidArgument(format!("`{key}` must be non-negative")))
}

fn metadata_value(metadata: ContentMetadata) -> CallValue {
    CallValue::map([
        ("mimeType", CallValue::optional_str(metadata.mime_type)),
        ("fileName", CallValue::optional_str(metadata.file_name)),
    ])
}

#[cfg(test)]
mod tests {
    use super::{RequestDispatcher, Route, METHOD_STREAM_CONTENT};
    use crate::config::BridgeConfig;
    use crate::content::{
        ContentHandle, ContentResolver, HostReader, HostWriter, MemoryContentResolver, WriteMode,
    };
    use crate::dispatch::{CallValue, MethodCall, MethodResponse, ERROR_CODE_EXCEPTION};
    use crate::streaming::{event_channel, StreamEvent};
    use crossbeam_channel::Receiver;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves bytes from an inner resolver but cannot answer metadata queries.
    struct MetadataFailingResolver(MemoryContentResolver);

    impl ContentResolver for MetadataFailingResolver {
        fn open_read(&self, handle: &ContentHandle) -> io::Result<HostReader> {
            self.0.open_read(handle)
        }

        fn open_write(&self, handle: &ContentHandle, mode: WriteMode) -> io::Result<HostWriter> {
            self.0.open_write(handle, mode)
        }

        fn mime_type(&self, _handle: &ContentHandle) -> io::Result<Option<String>> {
            Err(io::Error::other("metadata provider crashed"))
        }

        fn display_name(&self, handle: &ContentHandle) -> io::Result<Option<String>> {
            self.0.display_name(handle)
        }
    }

    fn dispatcher_with(
        resolver: Arc<dyn ContentResolver>,
    ) -> (RequestDispatcher, Receiver<StreamEvent>) {
        let (sink, events) = event_channel();
        let config = BridgeConfig {
            ack_timeout: Duration::from_secs(5),
            ..BridgeConfig::default()
        };
        (RequestDispatcher::new(&config, resolver, Arc::new(sink)), events)
    }

    fn memory_dispatcher() -> (
        RequestDispatcher,
        Arc<MemoryContentResolver>,
        Receiver<StreamEvent>,
    ) {
        let resolver = Arc::new(MemoryContentResolver::new());
        let (dispatcher, events) = dispatcher_with(resolver.clone());
        (dispatcher, resolver, events)
    }

    fn int_field(response: &MethodResponse, key: &str) -> i64 {
        response
            .value()
            .and_then(|value| value.get(key))
            .and_then(CallValue::as_int)
            .unwrap_or_else(|| panic!("missing int field {key} in {response:?}"))
    }

    #[test]
    fn route_names_round_trip() {
        for route in [
            Route::GetContent,
            Route::WriteContent,
            Route::ReleaseBuffer,
            Route::SaveContentToFile,
            Route::GetContentMetadata,
            Route::StreamContent,
        ] {
            assert_eq!(Route::from_name(route.name()), Some(route));
        }
        assert_eq!(Route::from_name(METHOD_STREAM_CONTENT), Some(Route::StreamContent));
        assert_eq!(Route::from_name("getcontent"), None);
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let (dispatcher, _, _) = memory_dispatcher();
        let response = dispatcher.handle(&MethodCall::new("deleteContent", CallValue::Null));
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[test]
    fn get_content_returns_live_buffer_with_metadata() {
        let (dispatcher, resolver, _) = memory_dispatcher();
        resolver.insert_with_metadata(
            "mem://doc",
            b"hello".to_vec(),
            Some("text/plain"),
            Some("doc.txt"),
        );

        let response = dispatcher.handle(&MethodCall::new("getContent", "mem://doc".into()));
        assert!(response.is_success(), "{response:?}");
        let address = int_field(&response, "address") as u64;
        assert_eq!(int_field(&response, "length"), 5);
        let value = response.value().expect("value");
        assert_eq!(value.get("mimeType"), Some(&CallValue::from("text/plain")));
        assert_eq!(value.get("fileName"), Some(&CallValue::from("doc.txt")));

        assert_eq!(
            dispatcher.arena().read_buffer(address).as_deref(),
            Some(&b"hello"[..])
        );
    }

    #[test]
    fn absent_metadata_is_reported_as_null() {
        let (dispatcher, resolver, _) = memory_dispatcher();
        resolver.insert("mem://bare", vec![7u8; 3]);

        let response = dispatcher.handle(&MethodCall::new(
            "getContentMetadata",
            CallValue::map([("uri", "mem://bare".into())]),
        ));
        let value = response.value().expect("success");
        assert_eq!(value.get("mimeType"), Some(&CallValue::Null));
        assert_eq!(value.get("fileName"), Some(&CallValue::Null));
    }

    #[test]
    fn metadata_failure_after_allocation_leaves_no_live_buffer() {
        let inner = MemoryContentResolver::new();
        inner.insert("mem://doc", vec![1u8; 32]);
        let (dispatcher, _) = dispatcher_with(Arc::new(MetadataFailingResolver(inner)));

        let response = dispatcher.handle(&MethodCall::new("getContent", "mem://doc".into()));
        match response {
            MethodResponse::Error { code, details, .. } => {
                assert_eq!(code, ERROR_CODE_EXCEPTION);
                assert!(details.contains("metadata provider crashed"), "{details}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(dispatcher.arena().stats().live_buffers, 0);
    }

    #[test]
    fn release_buffer_twice_reports_error() {
        let (dispatcher, resolver, _) = memory_dispatcher();
        resolver.insert("mem://doc", vec![1u8; 4]);
        let fetched = dispatcher.handle(&MethodCall::new("getContent", "mem://doc".into()));
        let address = int_field(&fetched, "address");

        let first = dispatcher.handle(&MethodCall::new("releaseBuffer", CallValue::Int(address)));
        assert!(first.is_success(), "{first:?}");
        let second = dispatcher.handle(&MethodCall::new("releaseBuffer", CallValue::Int(address)));
        assert!(matches!(second, MethodResponse::Error { .. }));
    }

    #[test]
    fn release_buffer_with_stale_generation_keeps_buffer_live() {
        let (dispatcher, resolver, _) = memory_dispatcher();
        resolver.insert("mem://doc", vec![1u8; 4]);
        let fetched = dispatcher.handle(&MethodCall::new("getContent", "mem://doc".into()));
        let address = int_field(&fetched, "address");
        let generation = int_field(&fetched, "generation");

        let stale = dispatcher.handle(&MethodCall::new(
            "releaseBuffer",
            CallValue::map([
                ("address", address.into()),
                ("generation", (generation + 1).into()),
            ]),
        ));
        assert!(matches!(stale, MethodResponse::Error { .. }));
        assert!(dispatcher.arena().is_live(address as u64));

        let current = dispatcher.handle(&MethodCall::new(
            "releaseBuffer",
            CallValue::map([
                ("address", address.into()),
                ("generation", generation.into()),
            ]),
        ));
        assert!(current.is_success(), "{current:?}");
        assert!(!dispatcher.arena().is_live(address as u64));
    }

    #[test]
    fn negative_release_address_is_rejected() {
        let (dispatcher, _, _) = memory_dispatcher();
        let response = dispatcher.handle(&MethodCall::new("releaseBuffer", CallValue::Int(-8)));
        assert!(matches!(response, MethodResponse::Error { .. }));
    }

    #[test]
    fn write_content_honors_mode() {
        let (dispatcher, resolver, _) = memory_dispatcher();
        resolver.insert("mem://log", b"one".to_vec());

        let append = dispatcher.handle(&MethodCall::new(
            "writeContent",
            CallValue::map([
                ("uri", "mem://log".into()),
                ("mode", "wa".into()),
                ("bytes", b"+two".to_vec().into()),
            ]),
        ));
        assert!(append.is_success(), "{append:?}");
        assert_eq!(resolver.bytes("mem://log").as_deref(), Some(&b"one+two"[..]));

        let truncate = dispatcher.handle(&MethodCall::new(
            "writeContent",
            CallValue::map([
                ("uri", "mem://log".into()),
                ("mode", "w".into()),
                ("bytes", b"fresh".to_vec().into()),
            ]),
        ));
        assert!(truncate.is_success(), "{truncate:?}");
        assert_eq!(resolver.bytes("mem://log").as_deref(), Some(&b"fresh"[..]));

        let bad_mode = dispatcher.handle(&MethodCall::new(
            "writeContent",
            CallValue::map([
                ("uri", "mem://log".into()),
                ("mode", "r".into()),
                ("bytes", Vec::new().into()),
            ]),
        ));
        assert!(matches!(bad_mode, MethodResponse::Error { .. }));
    }

    #[test]
    fn stream_content_on_missing_handle_fails_without_events() {
        let (dispatcher, _, events) = memory_dispatcher();
        let response = dispatcher.handle(&MethodCall::new(
            "streamContent",
            CallValue::map([("uri", "mem://missing".into()), ("bufferSize", CallValue::Int(4))]),
        ));
        assert!(matches!(response, MethodResponse::Error { .. }));
        assert!(events.recv_timeout(Duration::from_millis(30)).is_err());
        assert!(dispatcher.streaming().active_sessions().is_empty());
    }

    #[test]
    fn stream_content_returns_generated_id() {
        let (dispatcher, resolver, events) = memory_dispatcher();
        resolver.insert("mem://doc", Vec::new());

        let response = dispatcher.handle(&MethodCall::new(
            "streamContent",
            CallValue::map([("uri", "mem://doc".into()), ("bufferSize", CallValue::Int(16))]),
        ));
        let id = int_field(&response, "id") as u64;
        let close = events.recv_timeout(Duration::from_secs(5)).expect("close");
        assert_eq!(close, StreamEvent::Close { id, total_size: 0 });
    }

    #[test]
    fn malformed_arguments_yield_error_envelope() {
        let (dispatcher, _, _) = memory_dispatcher();
        for call in [
            MethodCall::new("getContent", CallValue::Int(1)),
            MethodCall::new("getContent", "no scheme here".into()),
            MethodCall::new("saveContentToFile", CallValue::map([("uri", "mem://x".into())])),
            MethodCall::new(
                "streamContent",
                CallValue::map([("uri", "mem://x".into()), ("bufferSize", CallValue::Int(-1))]),
            ),
        ] {
            let response = dispatcher.handle(&call);
            assert!(
                matches!(response, MethodResponse::Error { .. }),
                "{} should fail: {response:?}",
                call.method
            );
        }
    }
}
