//! Worker pool coordinator.
//!
//! The pool owns N worker threads, routes byte chunks to them, matches
//! replies to pending results by correlation id, and keeps
//! [`PoolStatistics`].
//!
//! # Architecture
//!
//! ```text
//!                                                  ┌─► worker 0 ─┐
//! process_*() ─► mpsc<Command> ─► dispatcher task ─┼─► worker 1 ─┼─► events ─┐
//!                                   ▲    │         └─► worker N ─┘           │
//!                                   │    └─► snapshot, PoolEvent, Pending<T> │
//!                                   └────────────────────────────────────────┘
//! ```
//!
//! The dispatcher task owns the routing table, the pending tasks and the
//! statistics. Handles talk to it only through commands and read a
//! snapshot it republishes after every change, so no lock is shared with
//! the worker threads.
//!
//! Chunks of one stream always go to the same worker, so frames of a stream
//! come back in append order. A new stream is assigned to the live worker
//! serving the fewest streams.
//!
//! Every `process_*` call returns immediately with a [`Pending`] future.
//! Tasks that get no answer within the task timeout fail with
//! [`StreamError::WorkerTimeout`] and the worker is marked unhealthy until
//! it answers again. A worker whose thread stops is replaced.
//!
//! A stream that moves to another worker (timeout or crash) continues in
//! the middle of a frame: the old worker is told to drop the stream, and
//! the new one discards bytes up to the first end delimiter. Sequence
//! numbers of that stream start over.
//!
//! # Example
//!
//! ```
//! use streamframe::config::FrameConfig;
//! use streamframe::pool::WorkerPoolBuilder;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> streamframe::Result<()> {
//! let pool = WorkerPoolBuilder::new()
//!     .max_workers(2)
//!     .frame_config(FrameConfig::end_delimited("\n"))
//!     .build()?;
//!
//! let frames = pool.process_data(&b"frame1\nframe2\n"[..])?.await?;
//! assert_eq!(frames.len(), 2);
//!
//! pool.terminate().await;
//! assert!(!pool.is_healthy());
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::backpressure::{TaskBudget, TaskPermit, DEFAULT_MAX_PENDING};
use crate::buffer::BufferStats;
use crate::config::{ConfigUpdate, FrameConfig};
use crate::error::{Result, StreamError};
use crate::protocol::{
    CorrelationId, Envelope, Frame, StreamId, WorkerRequest, WorkerResponse,
};
use crate::stats::PoolStatistics;
use crate::worker::{Worker, WorkerEvent};

/// Default number of worker threads.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default per-task deadline.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Events a [`subscribe`](WorkerPool::subscribe)r may lag behind before
/// the oldest are skipped.
pub const EVENT_CAPACITY: usize = 256;

/// Upper bound on the interval between timeout sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Correlation id of requests nobody waits for. Tasks start at 1.
const NOTICE_ID: CorrelationId = 0;

/// Health of one worker as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Live with no task in flight.
    Idle,
    /// Live with at least one task in flight.
    Busy,
    /// Missed a task deadline; not routed to until it answers again.
    Unhealthy,
    /// Thread has stopped.
    Exited,
}

/// Notification published by the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A task of `stream` produced frames.
    FramesProcessed {
        worker: usize,
        stream: StreamId,
        frames: Vec<Frame>,
    },
    /// A worker answered a task of `stream` with an `error` response.
    ProcessingError {
        worker: usize,
        stream: StreamId,
        message: String,
    },
    /// A worker missed a deadline or its thread stopped.
    WorkerError { worker: usize, message: String },
    /// A new thread took over the slot of a stopped worker.
    WorkerRestarted { worker: usize },
    /// A merged configuration was sent to every live worker.
    WorkersConfigured { config: FrameConfig },
}

/// Builder for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolBuilder {
    max_workers: usize,
    task_timeout: Duration,
    max_queued_tasks: usize,
    frame_config: FrameConfig,
}

impl WorkerPoolBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            max_queued_tasks: DEFAULT_MAX_PENDING,
            frame_config: FrameConfig::default(),
        }
    }

    /// Number of worker threads. Zero builds a pool that accepts no work.
    pub fn max_workers(mut self, count: usize) -> Self {
        self.max_workers = count;
        self
    }

    /// Deadline for each task.
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Maximum data tasks in flight before `process_*` fails with `QueueFull`.
    pub fn max_queued_tasks(mut self, limit: usize) -> Self {
        self.max_queued_tasks = limit;
        self
    }

    /// Detection configuration every worker starts with.
    pub fn frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Spawn the workers and the dispatcher task.
    ///
    /// # Errors
    ///
    /// `Configuration` outside a Tokio runtime; `Io` if a thread cannot be
    /// spawned.
    pub fn build(self) -> Result<WorkerPool> {
        self.build_with(Worker::spawn)
    }

    fn build_with<F>(self, mut spawn: F) -> Result<WorkerPool>
    where
        F: FnMut(usize, FrameConfig, mpsc::UnboundedSender<WorkerEvent>) -> Result<Worker>
            + Send
            + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StreamError::Configuration("worker pool must be built inside a Tokio runtime".into())
        })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut slots = Vec::with_capacity(self.max_workers);
        for index in 0..self.max_workers {
            let worker = spawn(index, self.frame_config.clone(), events_tx.clone())?;
            slots.push(Slot::new(worker));
        }

        let stats = PoolStatistics {
            workers_created: slots.len(),
            active_workers: slots.len(),
            ..Default::default()
        };
        tracing::debug!("Started worker pool with {} workers", slots.len());

        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot {
            stats: stats.clone(),
            states: slots.iter().map(Slot::state).collect(),
            config: self.frame_config.clone(),
        });
        let (notifications, _) = broadcast::channel(EVENT_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            config: self.frame_config,
            slots,
            routes: HashMap::new(),
            stale: HashSet::new(),
            pending: HashMap::new(),
            stats,
            next_id: NOTICE_ID + 1,
            task_timeout: self.task_timeout,
            spawn: Box::new(spawn),
            events: events_tx,
            snapshot: snapshot_tx,
            notifications: notifications.clone(),
            outbox: Vec::new(),
        };
        runtime.spawn(dispatcher.run(commands_rx, events_rx));

        Ok(WorkerPool {
            commands: commands_tx,
            snapshot: snapshot_rx,
            notifications,
            backpressure: TaskBudget::new(self.max_queued_tasks),
        })
    }
}

impl Default for WorkerPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a task that has been handed to the pool.
///
/// Resolves when the worker answers, or fails with `WorkerTimeout`,
/// `WorkerExit` or `WorkerUnavailable`.
#[must_use = "pending results do nothing unless awaited"]
pub struct Pending<T> {
    rx: ReplyReceiver,
    convert: fn(WorkerResponse) -> Result<T>,
}

/// Pending frames of one data task.
pub type PendingFrames = Pending<Vec<Frame>>;

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Ok(response))) => Poll::Ready((this.convert)(response)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StreamError::WorkerUnavailable)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

/// Multi-threaded frame detection pool.
///
/// Dropping the pool without [`terminate`](Self::terminate) stops the
/// workers without waiting for their threads.
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    notifications: broadcast::Sender<PoolEvent>,
    backpressure: TaskBudget,
}

impl WorkerPool {
    /// Create a builder.
    pub fn builder() -> WorkerPoolBuilder {
        WorkerPoolBuilder::new()
    }

    /// Process a chunk of the default stream.
    pub fn process_data(&self, bytes: impl Into<Bytes>) -> Result<PendingFrames> {
        self.process_stream(StreamId::DEFAULT, bytes)
    }

    /// Process a chunk of `stream`.
    ///
    /// # Errors
    ///
    /// `WorkerUnavailable` when no worker is live (including after
    /// [`terminate`](Self::terminate)); `QueueFull` when too many data tasks
    /// are in flight.
    pub fn process_stream(&self, stream: StreamId, bytes: impl Into<Bytes>) -> Result<PendingFrames> {
        let request = WorkerRequest::ProcessData {
            bytes: bytes.into(),
        };
        self.submit(stream, request, WorkerResponse::into_frames)
    }

    /// Process several chunks of `stream` as one task.
    pub fn process_batch(&self, stream: StreamId, chunks: Vec<Bytes>) -> Result<PendingFrames> {
        self.submit(stream, WorkerRequest::ProcessBatch { chunks }, WorkerResponse::into_frames)
    }

    /// Finalize the pending start-delimited frame of `stream`.
    pub fn flush_stream(&self, stream: StreamId) -> Result<PendingFrames> {
        self.submit(stream, WorkerRequest::Flush, WorkerResponse::into_frames)
    }

    /// Up to `count` buffered, unconsumed bytes of `stream`.
    pub fn stream_history(&self, stream: StreamId, count: usize) -> Result<Pending<Bytes>> {
        self.submit(stream, WorkerRequest::GetHistory { count }, |response| match response {
            WorkerResponse::History { data } => Ok(data),
            other => Err(unexpected(other)),
        })
    }

    /// Buffer occupancy of `stream`.
    pub fn stream_stats(&self, stream: StreamId) -> Result<Pending<BufferStats>> {
        self.submit(stream, WorkerRequest::GetStats, into_stats)
    }

    /// Drop the buffered bytes and sequence counter of `stream` and release
    /// its worker assignment.
    pub fn reset_stream(&self, stream: StreamId) -> Result<Pending<()>> {
        self.submit(stream, WorkerRequest::Reset, into_reset)
    }

    /// Merge `update` into the stored configuration and send the merged
    /// configuration to every live worker.
    ///
    /// Resolves once every worker acknowledged it; [`config`](Self::config)
    /// reports the merged value from then on.
    pub fn update_config(&self, update: &ConfigUpdate) -> impl Future<Output = Result<()>> {
        let (replies, rx) = oneshot::channel();
        let sent = self
            .commands
            .send(Command::UpdateConfig {
                update: update.clone(),
                replies,
            })
            .is_ok();
        async move { collect_all(sent, rx, into_configured).await.map(|_| ()) }
    }

    /// Reset every stream on every live worker.
    pub fn reset_workers(&self) -> impl Future<Output = Result<()>> {
        let reset = self.broadcast(WorkerRequest::Reset, into_reset);
        async move { reset.await.map(|_| ()) }
    }

    /// Buffer occupancy summed over the streams of each live worker.
    pub fn worker_stats(&self) -> impl Future<Output = Result<Vec<BufferStats>>> {
        self.broadcast(WorkerRequest::GetStats, into_stats)
    }

    /// Receive [`PoolEvent`]s published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.notifications.subscribe()
    }

    /// Copy of the current statistics.
    pub fn statistics(&self) -> PoolStatistics {
        let mut stats = self.snapshot.borrow().stats.clone();
        stats.queued_tasks = self.backpressure.in_flight();
        stats
    }

    /// Copy of the stored configuration.
    pub fn config(&self) -> FrameConfig {
        self.snapshot.borrow().config.clone()
    }

    #[inline]
    pub fn active_worker_count(&self) -> usize {
        self.snapshot.borrow().stats.active_workers
    }

    /// Data tasks accepted and not yet answered.
    #[inline]
    pub fn queued_task_count(&self) -> usize {
        self.backpressure.in_flight()
    }

    /// True while new data tasks would be refused with `QueueFull`.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        !self.backpressure.has_room()
    }

    /// True while at least one worker is active.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.active_worker_count() > 0
    }

    /// State of every worker, indexed by worker number.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.snapshot.borrow().states.clone()
    }

    /// Stop every worker and wait for the threads to exit.
    ///
    /// Pending tasks fail with `WorkerUnavailable`. Calling this again is a
    /// no-op.
    pub async fn terminate(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Terminate { threads: tx }).is_err() {
            return;
        }
        let Ok(threads) = rx.await else {
            return;
        };

        for thread in threads {
            if let Ok(Err(_)) = tokio::task::spawn_blocking(move || thread.join()).await {
                tracing::warn!("Worker thread panicked during shutdown");
            }
        }
        tracing::debug!("Worker pool terminated");
    }

    fn submit<T>(
        &self,
        stream: StreamId,
        request: WorkerRequest,
        convert: fn(WorkerResponse) -> Result<T>,
    ) -> Result<Pending<T>> {
        if !self.is_healthy() {
            return Err(StreamError::WorkerUnavailable);
        }

        let permit = if request.is_data() {
            Some(self.backpressure.try_acquire()?)
        } else {
            None
        };
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                stream,
                request,
                permit,
                reply,
            })
            .map_err(|_| StreamError::WorkerUnavailable)?;
        Ok(Pending { rx, convert })
    }

    fn broadcast<T>(
        &self,
        request: WorkerRequest,
        convert: fn(WorkerResponse) -> Result<T>,
    ) -> impl Future<Output = Result<Vec<T>>> {
        let (replies, rx) = oneshot::channel();
        let sent = self.commands.send(Command::Broadcast { request, replies });
        collect_all(sent.is_ok(), rx, convert)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("statistics", &self.statistics())
            .finish_non_exhaustive()
    }
}

/// Await one reply per worker. A pool whose dispatcher is gone has no
/// workers left to answer.
async fn collect_all<T>(
    sent: bool,
    rx: oneshot::Receiver<Vec<ReplyReceiver>>,
    convert: fn(WorkerResponse) -> Result<T>,
) -> Result<Vec<T>> {
    if !sent {
        return Ok(Vec::new());
    }
    let receivers = rx.await.unwrap_or_default();
    let mut results = Vec::with_capacity(receivers.len());
    for rx in receivers {
        results.push(Pending { rx, convert }.await?);
    }
    Ok(results)
}

fn unexpected(response: WorkerResponse) -> StreamError {
    match response {
        WorkerResponse::Error { message } => StreamError::Protocol(message),
        other => StreamError::Protocol(format!("unexpected response: {}", other.type_name())),
    }
}

fn into_stats(response: WorkerResponse) -> Result<BufferStats> {
    match response {
        WorkerResponse::Stats(stats) => Ok(stats),
        other => Err(unexpected(other)),
    }
}

fn into_configured(response: WorkerResponse) -> Result<()> {
    match response {
        WorkerResponse::Configured => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn into_reset(response: WorkerResponse) -> Result<()> {
    match response {
        WorkerResponse::Reset => Ok(()),
        other => Err(unexpected(other)),
    }
}

type Reply = oneshot::Sender<Result<WorkerResponse>>;
type ReplyReceiver = oneshot::Receiver<Result<WorkerResponse>>;

type SpawnFn =
    dyn FnMut(usize, FrameConfig, mpsc::UnboundedSender<WorkerEvent>) -> Result<Worker> + Send;

/// Requests from pool handles to the dispatcher task.
enum Command {
    /// Route a request of `stream` to its worker.
    Submit {
        stream: StreamId,
        request: WorkerRequest,
        permit: Option<TaskPermit>,
        reply: Reply,
    },
    /// Send a request to every live worker.
    Broadcast {
        request: WorkerRequest,
        replies: oneshot::Sender<Vec<ReplyReceiver>>,
    },
    UpdateConfig {
        update: ConfigUpdate,
        replies: oneshot::Sender<Vec<ReplyReceiver>>,
    },
    /// Stop the workers and hand their threads back for joining.
    Terminate {
        threads: oneshot::Sender<Vec<thread::JoinHandle<()>>>,
    },
    /// Answered once every earlier command has been applied.
    #[cfg(test)]
    Barrier(oneshot::Sender<()>),
}

/// What pool handles can read without asking the dispatcher.
#[derive(Debug, Clone)]
struct Snapshot {
    stats: PoolStatistics,
    states: Vec<WorkerState>,
    config: FrameConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Healthy,
    Unhealthy,
    Exited,
}

#[derive(Debug)]
struct Slot {
    worker: Worker,
    health: Health,
    in_flight: usize,
    /// Streams currently routed here.
    routes: usize,
}

impl Slot {
    fn new(worker: Worker) -> Self {
        Self {
            worker,
            health: Health::Healthy,
            in_flight: 0,
            routes: 0,
        }
    }

    fn state(&self) -> WorkerState {
        match self.health {
            Health::Healthy if self.in_flight == 0 => WorkerState::Idle,
            Health::Healthy => WorkerState::Busy,
            Health::Unhealthy => WorkerState::Unhealthy,
            Health::Exited => WorkerState::Exited,
        }
    }
}

struct PendingTask {
    worker: usize,
    stream: Option<StreamId>,
    started: Instant,
    deadline: Instant,
    reply: Reply,
    /// Backpressure permit; `Some` for data tasks.
    permit: Option<TaskPermit>,
}

struct Route {
    worker: usize,
    /// The stream's bytes so far went to another worker.
    resync: bool,
}

/// Owner of all pool state, running as one Tokio task.
struct Dispatcher {
    config: FrameConfig,
    slots: Vec<Slot>,
    routes: HashMap<StreamId, usize>,
    /// Streams whose worker stopped before they were routed again.
    stale: HashSet<StreamId>,
    pending: HashMap<CorrelationId, PendingTask>,
    stats: PoolStatistics,
    next_id: CorrelationId,
    task_timeout: Duration,
    spawn: Box<SpawnFn>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    snapshot: watch::Sender<Snapshot>,
    notifications: broadcast::Sender<PoolEvent>,
    /// Replies held until the snapshot includes their effects.
    outbox: Vec<(Reply, Result<WorkerResponse>)>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let mut sweep = tokio::time::interval(sweep_interval(self.task_timeout));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { stream, request, permit, reply }) => {
                        self.submit(stream, request, permit, reply);
                    }
                    Some(Command::Broadcast { request, replies }) => {
                        if matches!(request, WorkerRequest::Reset) {
                            self.stale.clear();
                        }
                        let _ = replies.send(self.broadcast(&request));
                    }
                    Some(Command::UpdateConfig { update, replies }) => {
                        self.config = self.config.merge(&update);
                        tracing::debug!("Broadcasting configuration: {:?}", self.config);
                        let receivers = self.broadcast(&WorkerRequest::Configure(self.config.clone()));
                        self.emit(PoolEvent::WorkersConfigured {
                            config: self.config.clone(),
                        });
                        let _ = replies.send(receivers);
                    }
                    Some(Command::Terminate { threads }) => {
                        let handles = self.shutdown();
                        self.flush();
                        let _ = threads.send(handles);
                        break;
                    }
                    #[cfg(test)]
                    Some(Command::Barrier(done)) => {
                        self.flush();
                        let _ = done.send(());
                    }
                    None => {
                        tracing::debug!("Worker pool dropped without terminate");
                        drop(self.shutdown());
                        self.flush();
                        break;
                    }
                },
                Some(event) = events.recv() => match event {
                    WorkerEvent::Reply { worker, envelope } => self.on_reply(worker, envelope),
                    WorkerEvent::Exited { worker, clean } => self.on_exit(worker, clean),
                },
                _ = sweep.tick() => self.expire_overdue(Instant::now()),
            }
            self.flush();
        }
        tracing::debug!("Dispatcher stopped");
    }

    /// Publish the snapshot, then deliver the replies it accounts for.
    fn flush(&mut self) {
        self.snapshot.send_modify(|snapshot| {
            snapshot.stats.clone_from(&self.stats);
            snapshot.states.clear();
            snapshot.states.extend(self.slots.iter().map(Slot::state));
            if snapshot.config != self.config {
                snapshot.config.clone_from(&self.config);
            }
        });
        for (reply, outcome) in self.outbox.drain(..) {
            // Receiver may have been dropped.
            let _ = reply.send(outcome);
        }
    }

    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine.
        let _ = self.notifications.send(event);
    }

    fn submit(
        &mut self,
        stream: StreamId,
        request: WorkerRequest,
        permit: Option<TaskPermit>,
        reply: Reply,
    ) {
        let route = match self.route(stream) {
            Ok(route) => route,
            Err(e) => {
                self.outbox.push((reply, Err(e)));
                return;
            }
        };
        if route.resync {
            self.notify(route.worker, stream, WorkerRequest::Resync);
        }

        let releases_route = matches!(request, WorkerRequest::Reset);
        self.post(route.worker, Some(stream), request, permit, reply);
        if releases_route {
            if let Some(worker) = self.routes.remove(&stream) {
                let slot = &mut self.slots[worker];
                slot.routes = slot.routes.saturating_sub(1);
            }
        }
    }

    /// Sticky worker for `stream`, assigning one when needed.
    fn route(&mut self, stream: StreamId) -> Result<Route> {
        if let Some(&worker) = self.routes.get(&stream) {
            if self.slots[worker].health == Health::Healthy {
                return Ok(Route {
                    worker,
                    resync: false,
                });
            }
        }

        let worker = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.health == Health::Healthy)
            .min_by_key(|(index, slot)| (slot.routes, *index))
            .map(|(index, _)| index)
            .ok_or(StreamError::WorkerUnavailable)?;

        let mut resync = self.stale.remove(&stream);
        if let Some(previous) = self.routes.insert(stream, worker) {
            tracing::debug!("Re-routing {} from worker {} to {}", stream, previous, worker);
            let slot = &mut self.slots[previous];
            slot.routes = slot.routes.saturating_sub(1);
            if slot.health != Health::Exited {
                // Drop what the old worker buffered for this stream.
                self.notify(previous, stream, WorkerRequest::Reset);
            }
            resync = true;
        }
        self.slots[worker].routes += 1;
        Ok(Route { worker, resync })
    }

    /// Send a request whose reply nobody waits for.
    fn notify(&self, worker: usize, stream: StreamId, request: WorkerRequest) {
        let kind = request.type_name();
        if let Err(e) = self.slots[worker].worker.send(NOTICE_ID, Some(stream), request) {
            tracing::debug!("Could not send {} to worker {}: {}", kind, worker, e);
        }
    }

    fn post(
        &mut self,
        worker: usize,
        stream: Option<StreamId>,
        request: WorkerRequest,
        permit: Option<TaskPermit>,
        reply: Reply,
    ) {
        let id = self.next_id;
        self.next_id += 1;

        if let Err(e) = self.slots[worker].worker.send(id, stream, request) {
            self.outbox.push((reply, Err(e)));
            return;
        }

        let started = Instant::now();
        self.pending.insert(
            id,
            PendingTask {
                worker,
                stream,
                started,
                deadline: started + self.task_timeout,
                reply,
                permit,
            },
        );
        self.slots[worker].in_flight += 1;
    }

    fn broadcast(&mut self, request: &WorkerRequest) -> Vec<ReplyReceiver> {
        let targets: Vec<usize> = (0..self.slots.len())
            .filter(|&index| self.slots[index].health != Health::Exited)
            .collect();

        targets
            .into_iter()
            .map(|worker| {
                let (reply, rx) = oneshot::channel();
                self.post(worker, None, request.clone(), None, reply);
                rx
            })
            .collect()
    }

    fn refresh_active(&mut self) {
        self.stats.active_workers = self
            .slots
            .iter()
            .filter(|slot| slot.health == Health::Healthy)
            .count();
    }

    fn finish(&mut self, id: CorrelationId, outcome: Result<WorkerResponse>) {
        let Some(task) = self.pending.remove(&id) else {
            return;
        };
        let PendingTask {
            worker,
            stream,
            started,
            reply,
            permit,
            ..
        } = task;
        let slot = &mut self.slots[worker];
        slot.in_flight = slot.in_flight.saturating_sub(1);

        if let Some(permit) = permit {
            match &outcome {
                Ok(WorkerResponse::Error { .. }) => self.stats.record_error(),
                Ok(_) => self.stats.record_completion(started.elapsed()),
                Err(_) => {}
            }
            drop(permit);
        }
        if let (Some(stream), Ok(response)) = (stream, &outcome) {
            self.announce(worker, stream, response);
        }
        self.outbox.push((reply, outcome));
    }

    fn announce(&self, worker: usize, stream: StreamId, response: &WorkerResponse) {
        if self.notifications.receiver_count() == 0 {
            return;
        }
        let event = match response {
            WorkerResponse::FrameProcessed { frames } | WorkerResponse::BatchProcessed { frames }
                if !frames.is_empty() =>
            {
                PoolEvent::FramesProcessed {
                    worker,
                    stream,
                    frames: frames.clone(),
                }
            }
            WorkerResponse::Error { message } => PoolEvent::ProcessingError {
                worker,
                stream,
                message: message.clone(),
            },
            _ => return,
        };
        self.emit(event);
    }

    fn on_reply(&mut self, worker: usize, envelope: Envelope<WorkerResponse>) {
        if self.slots[worker].health == Health::Unhealthy {
            tracing::info!("Worker {} is responding again", worker);
            self.slots[worker].health = Health::Healthy;
            self.refresh_active();
        }

        let Envelope { id, body, .. } = envelope;
        if id == NOTICE_ID {
            if let WorkerResponse::Error { message } = &body {
                tracing::debug!("Worker {} rejected a notice: {}", worker, message);
            }
        } else if self.pending.contains_key(&id) {
            self.finish(id, Ok(body));
        } else {
            tracing::debug!("Dropping late {} from worker {}", body.type_name(), worker);
        }
    }

    fn on_exit(&mut self, worker: usize, clean: bool) {
        if self.slots[worker].health == Health::Exited {
            return;
        }
        let message = if clean {
            tracing::warn!("Worker {} exited", worker);
            "worker thread exited"
        } else {
            tracing::error!("Worker {} crashed", worker);
            "worker thread crashed"
        };
        self.emit(PoolEvent::WorkerError {
            worker,
            message: message.to_string(),
        });

        self.slots[worker].health = Health::Exited;
        self.slots[worker].routes = 0;
        self.stats.workers_terminated += 1;
        self.refresh_active();

        let lost: Vec<StreamId> = self
            .routes
            .iter()
            .filter(|(_, routed)| **routed == worker)
            .map(|(stream, _)| *stream)
            .collect();
        for stream in lost {
            self.routes.remove(&stream);
            self.stale.insert(stream);
        }

        let failed: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, task)| task.worker == worker)
            .map(|(id, _)| *id)
            .collect();
        for id in failed {
            self.finish(id, Err(StreamError::WorkerExit { worker }));
        }

        self.respawn(worker);
    }

    /// Start a new thread in the slot of a stopped worker.
    fn respawn(&mut self, worker: usize) {
        match (self.spawn)(worker, self.config.clone(), self.events.clone()) {
            Ok(replacement) => {
                // The old thread is gone; its handle is detached.
                self.slots[worker] = Slot::new(replacement);
                self.stats.workers_created += 1;
                self.refresh_active();
                tracing::info!("Restarted worker {}", worker);
                self.emit(PoolEvent::WorkerRestarted { worker });
            }
            Err(e) => tracing::error!("Could not restart worker {}: {}", worker, e),
        }
    }

    fn expire_overdue(&mut self, now: Instant) {
        let overdue: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, task)| task.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let timeout = self.task_timeout;
        for id in overdue {
            let Some(worker) = self.pending.get(&id).map(|task| task.worker) else {
                continue;
            };
            tracing::warn!("Task {} timed out on worker {} after {:?}", id, worker, timeout);
            if self.slots[worker].health == Health::Healthy {
                self.slots[worker].health = Health::Unhealthy;
                self.refresh_active();
                self.emit(PoolEvent::WorkerError {
                    worker,
                    message: format!("task {id} timed out after {timeout:?}"),
                });
            }
            self.finish(id, Err(StreamError::WorkerTimeout { worker, timeout }));
        }
    }

    /// Stop every worker and fail what is still pending.
    fn shutdown(&mut self) -> Vec<thread::JoinHandle<()>> {
        for (_, task) in self.pending.drain() {
            self.outbox.push((task.reply, Err(StreamError::WorkerUnavailable)));
        }

        let mut threads = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            if slot.health != Health::Exited {
                slot.worker.shutdown();
                slot.health = Health::Exited;
                self.stats.workers_terminated += 1;
            }
            slot.in_flight = 0;
            slot.routes = 0;
            threads.extend(slot.worker.take_thread());
        }
        self.routes.clear();
        self.stale.clear();
        self.stats.active_workers = 0;
        threads
    }
}

fn sweep_interval(timeout: Duration) -> Duration {
    (timeout / 4).clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL)
}

#[cfg(test)]
impl WorkerPool {
    /// Wait until the dispatcher applied every command sent so far.
    async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}
