//! Workers: ring buffers and frame detectors on dedicated OS threads.
//!
//! [`FrameProcessor`] is the request handler. It owns one buffer and one
//! detector outright and turns every [`WorkerRequest`] into exactly one
//! [`WorkerResponse`]. Processing failures, including panics, come back as
//! `error` responses; the processor never stops because of one.
//!
//! A worker thread keeps one processor per stream routed to it and is fed
//! by a channel:
//!
//! ```text
//! Pool ─► mpsc<Envelope<WorkerRequest>> ─► worker thread ─► mpsc<WorkerEvent> ─► Dispatcher
//! ```
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use streamframe::config::FrameConfig;
//! use streamframe::protocol::{WorkerRequest, WorkerResponse};
//! use streamframe::worker::FrameProcessor;
//!
//! let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n"));
//! let response = processor.handle(WorkerRequest::ProcessData {
//!     bytes: Bytes::from_static(b"a\nb\n"),
//! });
//!
//! let frames = response.into_frames().unwrap();
//! assert_eq!(frames.len(), 2);
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::buffer::{BufferStats, RingBuffer};
use crate::codec::WireFormat;
use crate::config::FrameConfig;
use crate::detector::FrameDetector;
use crate::error::{Result, StreamError};
use crate::protocol::{
    decode_request, CorrelationId, Envelope, Frame, StreamId, WireMessage, WorkerRequest,
    WorkerResponse,
};

/// Request handler owning one buffer and one detector.
#[derive(Debug)]
pub struct FrameProcessor {
    buffer: RingBuffer,
    detector: FrameDetector,
}

impl FrameProcessor {
    pub fn new(config: FrameConfig) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!("Accepting configuration that cannot produce frames: {}", e);
        }
        Self {
            buffer: RingBuffer::new(config.buffer_capacity),
            detector: FrameDetector::new(config),
        }
    }

    #[inline]
    pub fn config(&self) -> &FrameConfig {
        self.detector.config()
    }

    /// Handle one request. Never panics; failures become `error` responses.
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        let kind = request.type_name();
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_handle(request))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!("{} failed: {}", kind, e);
                WorkerResponse::error(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Panic while handling {}: {}", kind, message);
                // Buffer state is unknown after a panic.
                self.reset();
                WorkerResponse::error(format!("internal error: {message}"))
            }
        }
    }

    fn try_handle(&mut self, request: WorkerRequest) -> Result<WorkerResponse> {
        match request {
            WorkerRequest::Configure(config) => {
                self.configure(config)?;
                Ok(WorkerResponse::Configured)
            }
            WorkerRequest::ProcessData { bytes } => Ok(WorkerResponse::FrameProcessed {
                frames: self.process(&bytes)?,
            }),
            WorkerRequest::ProcessBatch { chunks } => Ok(WorkerResponse::BatchProcessed {
                frames: self.process_batch(&chunks)?,
            }),
            WorkerRequest::Flush => Ok(WorkerResponse::FrameProcessed {
                frames: self.flush()?,
            }),
            WorkerRequest::GetStats => Ok(WorkerResponse::Stats(self.stats())),
            WorkerRequest::GetHistory { count } => Ok(WorkerResponse::History {
                data: self.history(count),
            }),
            WorkerRequest::Reset => {
                self.reset();
                Ok(WorkerResponse::Reset)
            }
            WorkerRequest::Resync => {
                self.resync();
                Ok(WorkerResponse::Reset)
            }
            WorkerRequest::Shutdown => Err(StreamError::Protocol(
                "shutdown is handled by the worker loop".into(),
            )),
        }
    }

    /// Decode a wire request, handle it, and encode the response.
    ///
    /// Undecodable requests and unknown types are answered with an `error`
    /// response carrying the caller's id when one could be read.
    pub fn handle_wire(&mut self, format: WireFormat, bytes: &[u8]) -> Result<Vec<u8>> {
        let response = match decode_request(format, bytes) {
            Ok(WireMessage { id, body }) => WireMessage::new(id, self.handle(body)),
            Err(rejection) => {
                tracing::warn!("Rejecting wire request: {}", rejection.error);
                rejection.into_response()
            }
        };
        format.encode(&response)
    }

    /// Replace the configuration, resizing the buffer when the capacity
    /// changed. Buffered bytes are kept when they still fit.
    pub fn configure(&mut self, config: FrameConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            tracing::warn!("Accepting configuration that cannot produce frames: {}", e);
        }

        if config.buffer_capacity != self.buffer.capacity() {
            if let Err(e) = self.buffer.set_capacity(config.buffer_capacity) {
                tracing::warn!("{}; dropping buffered bytes", e);
                self.buffer.clear();
                self.buffer.set_capacity(config.buffer_capacity)?;
            }
        }

        self.detector.configure(config);
        Ok(())
    }

    /// Append `bytes` and extract every completed frame.
    ///
    /// Bytes are appended as buffer space frees up, so a chunk larger than
    /// the free space still succeeds when frames drain the buffer.
    ///
    /// When the buffer fills up without completing a frame, the buffered
    /// bytes and the rest of the chunk are discarded. Frames extracted from
    /// the chunk before that point are still returned.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when the buffer overflowed before any frame of this
    /// chunk was extracted. The buffer is cleared so the worker can resync.
    pub fn process(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let take = rest.len().min(self.buffer.free_space());
            if take == 0 {
                let overflow = StreamError::BufferOverflow {
                    requested: rest.len(),
                    free: 0,
                    capacity: self.buffer.capacity(),
                };
                tracing::warn!(
                    "{}; discarding unframed bytes after {} frames",
                    overflow,
                    frames.len()
                );
                self.buffer.clear();
                self.detector.reset_search();
                if frames.is_empty() {
                    return Err(overflow);
                }
                return Ok(frames);
            }

            self.buffer.append(&rest[..take])?;
            rest = &rest[take..];
            frames.extend(self.detector.extract(&mut self.buffer)?);
        }

        Ok(frames)
    }

    /// Process several chunks in order.
    pub fn process_batch(&mut self, chunks: &[Bytes]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(self.process(chunk)?);
        }
        Ok(frames)
    }

    /// Extract complete frames and finalize a pending start-delimited one.
    pub fn flush(&mut self) -> Result<Vec<Frame>> {
        self.detector.flush(&mut self.buffer)
    }

    /// Up to `count` buffered bytes, not consumed.
    pub fn history(&self, count: usize) -> Bytes {
        self.buffer.peek(count)
    }

    #[inline]
    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    /// Drop buffered bytes and restart sequence numbering.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.detector.reset();
    }

    /// Reset, then drop the partial frame the next bytes start with.
    pub fn resync(&mut self) {
        self.reset();
        self.detector.resync();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Per-stream processors of one worker thread.
///
/// Each stream routed to the worker gets its own buffer and detector, built
/// lazily from the worker's current configuration.
#[derive(Debug)]
pub(crate) struct StreamTable {
    config: FrameConfig,
    streams: HashMap<StreamId, FrameProcessor>,
}

impl StreamTable {
    pub(crate) fn new(config: FrameConfig) -> Self {
        Self {
            config,
            streams: HashMap::new(),
        }
    }

    /// Handle a request for `stream`, or for every stream when `None`.
    pub(crate) fn handle(&mut self, stream: Option<StreamId>, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Configure(config) => {
                for (id, processor) in &mut self.streams {
                    if let Err(e) = processor.configure(config.clone()) {
                        tracing::warn!("Reconfiguring {} failed: {}", id, e);
                        processor.reset();
                    }
                }
                self.config = config;
                WorkerResponse::Configured
            }
            WorkerRequest::Reset => {
                match stream {
                    Some(id) => {
                        self.streams.remove(&id);
                    }
                    None => self.streams.clear(),
                }
                WorkerResponse::Reset
            }
            WorkerRequest::GetStats => WorkerResponse::Stats(self.stats(stream)),
            request => {
                let id = stream.unwrap_or_default();
                let config = &self.config;
                self.streams
                    .entry(id)
                    .or_insert_with(|| FrameProcessor::new(config.clone()))
                    .handle(request)
            }
        }
    }

    /// Stats of one stream, or the sum over all streams.
    fn stats(&self, stream: Option<StreamId>) -> BufferStats {
        let selected: Vec<BufferStats> = match stream {
            Some(id) => self.streams.get(&id).map(FrameProcessor::stats).into_iter().collect(),
            None => self.streams.values().map(FrameProcessor::stats).collect(),
        };
        if selected.is_empty() {
            return BufferStats::from_occupancy(0, self.config.buffer_capacity);
        }

        let size: usize = selected.iter().map(|s| s.size).sum();
        let capacity: usize = selected.iter().map(|s| s.capacity).sum();
        BufferStats::from_occupancy(size, capacity)
    }

    #[inline]
    pub(crate) fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

/// Notification from a worker thread to the pool dispatcher.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Reply {
        worker: usize,
        envelope: Envelope<WorkerResponse>,
    },
    Exited {
        worker: usize,
        clean: bool,
    },
}

/// Reports the thread exit, including exit by unwinding.
struct ExitNotice {
    worker: usize,
    events: mpsc::UnboundedSender<WorkerEvent>,
    clean: bool,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.events.send(WorkerEvent::Exited {
            worker: self.worker,
            clean: self.clean,
        });
    }
}

type RequestReceiver = mpsc::UnboundedReceiver<Envelope<WorkerRequest>>;

/// Handle to a worker thread.
#[derive(Debug)]
pub(crate) struct Worker {
    index: usize,
    tx: mpsc::UnboundedSender<Envelope<WorkerRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker thread serving a [`StreamTable`].
    pub(crate) fn spawn(
        index: usize,
        config: FrameConfig,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self> {
        Self::spawn_loop(index, events, move |rx, events| {
            let mut table = StreamTable::new(config);
            while let Some(Envelope { id, stream, body }) = rx.blocking_recv() {
                if matches!(body, WorkerRequest::Shutdown) {
                    break;
                }
                let response = table.handle(stream, body);
                if !reply(events, index, id, stream, response) {
                    break;
                }
            }
            tracing::trace!("Worker {} served {} streams", index, table.stream_count());
        })
    }

    fn spawn_loop<F>(
        index: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
        body: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut RequestReceiver, &mpsc::UnboundedSender<WorkerEvent>) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name(format!("streamframe-worker-{index}"))
            .spawn(move || {
                let mut notice = ExitNotice {
                    worker: index,
                    events: events.clone(),
                    clean: false,
                };
                tracing::debug!("Worker {} started", index);
                body(&mut rx, &events);
                notice.clean = true;
                tracing::debug!("Worker {} stopped", index);
            })?;

        Ok(Self {
            index,
            tx,
            thread: Some(thread),
        })
    }

    /// Queue a request for the worker thread.
    pub(crate) fn send(
        &self,
        id: CorrelationId,
        stream: Option<StreamId>,
        request: WorkerRequest,
    ) -> Result<()> {
        self.tx
            .send(Envelope::new(id, stream, request))
            .map_err(|_| StreamError::WorkerCrash { worker: self.index })
    }

    /// Ask the thread to stop after the requests already queued.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Envelope::new(0, None, WorkerRequest::Shutdown));
    }

    pub(crate) fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.thread.take()
    }
}

/// Send a reply; `false` once the dispatcher is gone.
fn reply(
    events: &mpsc::UnboundedSender<WorkerEvent>,
    worker: usize,
    id: CorrelationId,
    stream: Option<StreamId>,
    response: WorkerResponse,
) -> bool {
    events
        .send(WorkerEvent::Reply {
            worker,
            envelope: Envelope::new(id, stream, response),
        })
        .is_ok()
}

#[cfg(test)]
impl Worker {
    /// A worker that holds every request without answering until shutdown,
    /// then answers the held requests in order.
    pub(crate) fn spawn_stalled(
        index: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self> {
        Self::spawn_loop(index, events, move |rx, events| {
            let mut held = Vec::new();
            while let Some(Envelope { id, stream, body }) = rx.blocking_recv() {
                if matches!(body, WorkerRequest::Shutdown) {
                    break;
                }
                held.push((id, stream));
            }
            for (id, stream) in held {
                let empty = WorkerResponse::FrameProcessed { frames: Vec::new() };
                reply(events, index, id, stream, empty);
            }
        })
    }

    /// A regular worker that sleeps for `delay` before its first request.
    pub(crate) fn spawn_slow(
        index: usize,
        config: FrameConfig,
        events: mpsc::UnboundedSender<WorkerEvent>,
        delay: std::time::Duration,
    ) -> Result<Self> {
        Self::spawn_loop(index, events, move |rx, events| {
            let mut table = StreamTable::new(config);
            let mut delay = Some(delay);
            while let Some(Envelope { id, stream, body }) = rx.blocking_recv() {
                if matches!(body, WorkerRequest::Shutdown) {
                    break;
                }
                if let Some(delay) = delay.take() {
                    thread::sleep(delay);
                }
                let response = table.handle(stream, body);
                if !reply(events, index, id, stream, response) {
                    break;
                }
            }
        })
    }

    /// A worker whose thread dies on its first request.
    pub(crate) fn spawn_crashing(
        index: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Result<Self> {
        Self::spawn_loop(index, events, move |rx, _events| {
            if let Some(envelope) = rx.blocking_recv() {
                panic!("worker {index} crashed on request {}", envelope.id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::protocol::WireResponse;

    fn data(bytes: &'static [u8]) -> WorkerRequest {
        WorkerRequest::ProcessData {
            bytes: Bytes::from_static(bytes),
        }
    }

    fn payloads(response: WorkerResponse) -> Vec<Vec<u8>> {
        response
            .into_frames()
            .unwrap()
            .iter()
            .map(|f| f.payload().to_vec())
            .collect()
    }

    #[test]
    fn test_process_across_calls() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n"));
        assert_eq!(payloads(processor.handle(data(b"frame1\nfra"))), vec![b"frame1".to_vec()]);
        assert_eq!(payloads(processor.handle(data(b"me2\n"))), vec![b"frame2".to_vec()]);
    }

    #[test]
    fn test_stats_and_history() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(100));
        processor.handle(data(b"done\npartial"));

        match processor.handle(WorkerRequest::GetStats) {
            WorkerResponse::Stats(stats) => {
                assert_eq!(stats.size, 7);
                assert_eq!(stats.capacity, 100);
                assert_eq!(stats.free_space, 93);
                assert!((stats.utilization_percent - 7.0).abs() < 1e-9);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match processor.handle(WorkerRequest::GetHistory { count: 4 }) {
            WorkerResponse::History { data } => assert_eq!(&data[..], b"part"),
            other => panic!("unexpected response: {other:?}"),
        }
        // History does not consume.
        assert_eq!(processor.stats().size, 7);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n"));
        processor.handle(data(b"a\nhalf"));
        assert_eq!(processor.handle(WorkerRequest::Reset), WorkerResponse::Reset);
        assert_eq!(processor.stats().size, 0);

        let frames = processor.handle(data(b"-other\n")).into_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"-other");
        assert_eq!(frames[0].sequence, 0);
    }

    #[test]
    fn test_large_chunk_drains_through_small_buffer() {
        let mut processor =
            FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(8));
        let frames = processor.process(b"aaa\nbbb\nccc\nddd\n").unwrap();
        assert_eq!(frames.len(), 4);
    }

    #[test]
    fn test_overflow_reports_and_resyncs() {
        let mut processor =
            FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(4));
        let response = processor.handle(data(b"no newline here"));
        assert_eq!(response.type_name(), "error");
        assert_eq!(processor.stats().size, 0);

        let frames = processor.process(b"ok\n").unwrap();
        assert_eq!(frames[0].payload(), b"ok");
    }

    #[test]
    fn test_overflow_keeps_frames_extracted_before_it() {
        let mut processor =
            FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(8));

        let frames = processor.process(b"ab\ncdefghijklmnop").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"ab");
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(processor.stats().size, 0);

        let frames = processor.process(b"next\n").unwrap();
        assert_eq!(frames[0].payload(), b"next");
        assert_eq!(frames[0].sequence, 1);
    }

    #[test]
    fn test_resync_request_drops_leading_partial_frame() {
        let mut processor = FrameProcessor::new(FrameConfig::default());
        processor.handle(data(b"stale"));

        assert_eq!(processor.handle(WorkerRequest::Resync), WorkerResponse::Reset);
        assert_eq!(processor.stats().size, 0);

        let frames = processor.handle(data(b"1.5\n22.0\n")).into_frames().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"22.0");
        assert_eq!(frames[0].sequence, 0);
    }

    #[test]
    fn test_configure_resizes_and_keeps_bytes() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(16));
        processor.process(b"abc").unwrap();

        let response = processor.handle(WorkerRequest::Configure(
            FrameConfig::end_delimited(";").with_buffer_capacity(64),
        ));
        assert_eq!(response, WorkerResponse::Configured);
        assert_eq!(processor.stats().capacity, 64);

        let frames = processor.process(b"d;").unwrap();
        assert_eq!(frames[0].payload(), b"abcd");
    }

    #[test]
    fn test_configure_shrink_below_size_drops_bytes() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n").with_buffer_capacity(16));
        processor.process(b"0123456789").unwrap();

        processor
            .configure(FrameConfig::end_delimited("\n").with_buffer_capacity(4))
            .unwrap();
        assert_eq!(processor.stats().size, 0);
        assert_eq!(processor.stats().capacity, 4);
    }

    #[test]
    fn test_configure_is_permissive() {
        let mut processor = FrameProcessor::new(FrameConfig::default());
        let response = processor.handle(WorkerRequest::Configure(
            FrameConfig::end_delimited("\n").with_checksum("no-such-sum"),
        ));
        assert_eq!(response, WorkerResponse::Configured);
        assert_eq!(payloads(processor.handle(data(b"x\n"))), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_batch_and_flush() {
        let mut processor = FrameProcessor::new(FrameConfig::start_delimited("#"));
        let response = processor.handle(WorkerRequest::ProcessBatch {
            chunks: vec![Bytes::from_static(b"#on"), Bytes::from_static(b"e#tw"), Bytes::from_static(b"o")],
        });
        assert_eq!(response.type_name(), "batchProcessed");
        assert_eq!(payloads(response), vec![b"one".to_vec()]);

        assert_eq!(payloads(processor.handle(WorkerRequest::Flush)), vec![b"two".to_vec()]);
    }

    #[test]
    fn test_shutdown_request_is_rejected_by_handler() {
        let mut processor = FrameProcessor::new(FrameConfig::default());
        assert_eq!(processor.handle(WorkerRequest::Shutdown).type_name(), "error");
    }

    #[test]
    fn test_handle_wire_echoes_id() {
        let mut processor = FrameProcessor::new(FrameConfig::end_delimited("\n"));
        let request = br#"{"type":"processData","id":"req-1","data":{"bytes":"hi\n"}}"#;

        let encoded = processor.handle_wire(WireFormat::Json, request).unwrap();
        let response: WireResponse = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(response.id.as_deref(), Some("req-1"));

        let frames = response.body.into_frames().unwrap();
        assert_eq!(frames[0].payload(), b"hi");
    }

    #[test]
    fn test_handle_wire_unknown_type() {
        let mut processor = FrameProcessor::new(FrameConfig::default());
        let encoded = processor
            .handle_wire(WireFormat::Json, br#"{"type":"selfDestruct","id":"x9"}"#)
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["id"], "x9");
        assert!(json["data"]["message"]
            .as_str()
            .unwrap()
            .contains("selfDestruct"));
    }

    #[test]
    fn test_stream_table_isolates_streams() {
        let mut table = StreamTable::new(FrameConfig::end_delimited("\n"));
        let (a, b) = (Some(StreamId(1)), Some(StreamId(2)));

        assert!(payloads(table.handle(a, data(b"left-"))).is_empty());
        assert!(payloads(table.handle(b, data(b"right-"))).is_empty());
        assert_eq!(payloads(table.handle(a, data(b"a\n"))), vec![b"left-a".to_vec()]);
        assert_eq!(payloads(table.handle(b, data(b"b\n"))), vec![b"right-b".to_vec()]);
        assert_eq!(table.stream_count(), 2);
    }

    #[test]
    fn test_stream_table_stats() {
        let config = FrameConfig::end_delimited("\n").with_buffer_capacity(50);
        let mut table = StreamTable::new(config);

        match table.handle(None, WorkerRequest::GetStats) {
            WorkerResponse::Stats(stats) => {
                assert_eq!(stats.size, 0);
                assert_eq!(stats.capacity, 50);
                assert_eq!(stats.free_space, 50);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        table.handle(Some(StreamId(1)), data(b"12345"));
        table.handle(Some(StreamId(2)), data(b"12345"));
        match table.handle(None, WorkerRequest::GetStats) {
            WorkerResponse::Stats(stats) => {
                assert_eq!(stats.size, 10);
                assert_eq!(stats.capacity, 100);
                assert!((stats.utilization_percent - 10.0).abs() < 1e-9);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        match table.handle(Some(StreamId(2)), WorkerRequest::GetStats) {
            WorkerResponse::Stats(stats) => assert_eq!(stats.size, 5),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_stream_table_reset_and_configure() {
        let mut table = StreamTable::new(FrameConfig::end_delimited("\n"));
        table.handle(Some(StreamId(1)), data(b"stale"));
        table.handle(Some(StreamId(2)), data(b"kept"));

        assert_eq!(table.handle(Some(StreamId(1)), WorkerRequest::Reset), WorkerResponse::Reset);
        assert_eq!(table.stream_count(), 1);

        table.handle(None, WorkerRequest::Configure(FrameConfig::end_delimited(";")));
        assert_eq!(payloads(table.handle(Some(StreamId(2)), data(b";"))), vec![b"kept".to_vec()]);
        assert_eq!(payloads(table.handle(Some(StreamId(1)), data(b"new;"))), vec![b"new".to_vec()]);

        table.handle(None, WorkerRequest::Reset);
        assert_eq!(table.stream_count(), 0);
    }

    #[test]
    fn test_thread_worker_replies_and_exits_cleanly() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut worker = Worker::spawn(3, FrameConfig::end_delimited("\n"), events_tx).unwrap();

        worker.send(11, Some(StreamId(7)), data(b"hello\n")).unwrap();
        match events_rx.blocking_recv().unwrap() {
            WorkerEvent::Reply { worker, envelope } => {
                assert_eq!(worker, 3);
                assert_eq!(envelope.id, 11);
                assert_eq!(envelope.stream, Some(StreamId(7)));
                assert_eq!(payloads(envelope.body), vec![b"hello".to_vec()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        worker.shutdown();
        worker.take_thread().unwrap().join().unwrap();
        assert!(matches!(
            events_rx.blocking_recv().unwrap(),
            WorkerEvent::Exited { worker: 3, clean: true }
        ));
    }

    #[test]
    fn test_crashing_worker_reports_unclean_exit() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut worker = Worker::spawn_crashing(0, events_tx).unwrap();

        worker.send(1, None, data(b"x")).unwrap();
        assert!(worker.take_thread().unwrap().join().is_err());
        assert!(matches!(
            events_rx.blocking_recv().unwrap(),
            WorkerEvent::Exited { worker: 0, clean: false }
        ));
    }
}
