//! Result stream: polls a job's results and yields what changed.
//!
//! A [`ResultStream`] tracks a set of metrics for one job. Every poll cycle
//! asks the API for the points past each metric's last seen offset, records
//! the new ones, and reports the latest new point per metric as a
//! [`ChangeSet`].
//!
//! A traversal ([`Iterate`]) ends once the job is done and two consecutive
//! offset snapshots are equal, after a number of grace polls that pick up
//! late points. The offset table, history and series belong to the stream
//! and survive across traversals: calling [`ResultStream::iterate`] again
//! resumes where the last traversal stopped. Use [`ResultStream::reset`] to
//! start over.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = ResultStream::new(test_run, vec![metric]);
//! let mut iter = stream.iterate().poll_interval(Duration::from_secs(3));
//! while let Some(changes) = iter.next().await {
//!     for (id, point) in &changes?.changes {
//!         println!("{} -> {:?}", id, point.data);
//!     }
//! }
//! ```

use super::handler::ChangeHandler;
use super::metric_id::MetricId;
use super::options::StreamOptions;
use super::source::{parse_results, ResultBatches, ResultQuery, ResultSource};
use super::types::{
    ChangeSet, DataPoint, LastSeen, OffsetSnapshot, OffsetTable, StreamState, INITIAL_OFFSET,
};
use crate::errors::CoreError;
use crate::polling::PollState;
use futures_util::stream::{self, Stream};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of offset snapshots compared for stability.
const HISTORY_DEPTH: usize = 2;

/// Read-only view of a stream's last seen table, usable from another task.
#[derive(Debug, Clone)]
pub struct LastSeenHandle {
    table: Arc<RwLock<OffsetTable>>,
}

impl LastSeenHandle {
    /// Copy of the full table.
    pub fn snapshot(&self) -> OffsetTable {
        self.table.read().clone()
    }

    pub fn get(&self, id: &MetricId) -> Option<LastSeen> {
        self.table.read().get(&id.to_string()).cloned()
    }
}

/// Polling stream of result changes for one job.
pub struct ResultStream<S> {
    source: S,
    tracked: Vec<MetricId>,
    last: Arc<RwLock<OffsetTable>>,
    history: VecDeque<OffsetSnapshot>,
    series: HashMap<String, Vec<DataPoint>>,
    options: StreamOptions,
    cancel: CancellationToken,
}

impl<S: ResultSource> ResultStream<S> {
    /// Track `tracked` metrics of `source` with default options.
    pub fn new(source: S, tracked: Vec<MetricId>) -> Self {
        Self::with_options(source, tracked, StreamOptions::default())
    }

    /// Track `tracked` metrics of `source`. Duplicate ids are collapsed.
    pub fn with_options(source: S, tracked: Vec<MetricId>, options: StreamOptions) -> Self {
        let mut seen = HashSet::new();
        let tracked: Vec<MetricId> = tracked
            .into_iter()
            .filter(|id| seen.insert(id.to_string()))
            .collect();
        let last: OffsetTable = tracked
            .iter()
            .map(|id| (id.to_string(), LastSeen::default()))
            .collect();

        Self {
            source,
            tracked,
            last: Arc::new(RwLock::new(last)),
            history: VecDeque::with_capacity(HISTORY_DEPTH),
            series: HashMap::new(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn tracked(&self) -> &[MetricId] {
        &self.tracked
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Copy of the last seen table.
    pub fn last(&self) -> OffsetTable {
        self.last.read().clone()
    }

    /// Last seen entry of one metric, `None` if it is not tracked.
    pub fn last_for(&self, id: &MetricId) -> Option<LastSeen> {
        self.last.read().get(&id.to_string()).cloned()
    }

    /// Handle for reading the last seen table while a traversal runs.
    pub fn last_handle(&self) -> LastSeenHandle {
        LastSeenHandle {
            table: Arc::clone(&self.last),
        }
    }

    /// Every point received so far, per metric id, oldest first.
    pub fn series(&self) -> &HashMap<String, Vec<DataPoint>> {
        &self.series
    }

    pub fn series_for(&self, id: &MetricId) -> &[DataPoint] {
        self.series
            .get(&id.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True once two snapshots exist and they are equal.
    pub fn is_stable(&self) -> bool {
        self.history.len() == HISTORY_DEPTH && self.history[0] == self.history[1]
    }

    /// Forget all offsets, history and series.
    pub fn reset(&mut self) {
        for last in self.last.write().values_mut() {
            *last = LastSeen::default();
        }
        self.history.clear();
        self.series.clear();
    }

    /// Token that ends traversals when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel running and future traversals.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Start a traversal with the stream's options.
    pub fn iterate(&mut self) -> Iterate<'_, S> {
        let options = self.options.clone();
        Iterate::new(self, options)
    }

    fn query(&self) -> ResultQuery {
        let last = self.last.read();
        let mut query = ResultQuery::new();
        for id in &self.tracked {
            let offset = last
                .get(&id.to_string())
                .map(|l| l.offset)
                .unwrap_or(INITIAL_OFFSET);
            query.push(id, offset);
        }
        query
    }

    /// One fetch-and-apply cycle. Nothing is mutated unless the response
    /// parses.
    async fn poll_once(&mut self, cycle: u64) -> Result<ChangeSet, CoreError> {
        let query = self.query();
        let response = self.source.fetch_results(&query).await?;
        let batches = parse_results(&response)?;
        let changes = self.apply(batches, cycle);
        self.push_snapshot();
        Ok(changes)
    }

    fn apply(&mut self, mut batches: ResultBatches, cycle: u64) -> ChangeSet {
        let mut changes = ChangeSet::new(cycle);
        let mut last = self.last.write();

        for id in &self.tracked {
            let key = id.to_string();
            let Some(points) = batches.remove(&key) else {
                continue;
            };
            let recorded = last.get(&key).map(|l| l.offset).unwrap_or(INITIAL_OFFSET);
            let fresh: Vec<DataPoint> = points.into_iter().filter(|p| p.offset > recorded).collect();
            let Some(newest) = fresh.last().cloned() else {
                continue;
            };

            last.insert(
                key.clone(),
                LastSeen {
                    offset: newest.offset,
                    data: Some(newest.clone()),
                },
            );
            self.series.entry(key.clone()).or_default().extend(fresh);
            changes.changes.insert(key, newest);
        }

        for ignored in batches.keys() {
            debug!(metric = %ignored, "ignoring results for untracked metric");
        }
        changes
    }

    fn push_snapshot(&mut self) {
        let snapshot: OffsetSnapshot = self
            .last
            .read()
            .iter()
            .map(|(id, l)| (id.clone(), l.offset))
            .collect();
        if self.history.len() == HISTORY_DEPTH {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }
}

/// One traversal of a [`ResultStream`].
///
/// Owns the termination state machine; the stream's offsets are shared with
/// every other traversal.
pub struct Iterate<'a, S> {
    stream: &'a mut ResultStream<S>,
    options: StreamOptions,
    state: StreamState,
    cycle: u64,
    poll: PollState,
    started: Instant,
}

impl<'a, S: ResultSource> Iterate<'a, S> {
    fn new(stream: &'a mut ResultStream<S>, options: StreamOptions) -> Self {
        let poll = PollState::new(options.poll_config());
        Self {
            stream,
            options,
            state: StreamState::Polling,
            cycle: 0,
            poll,
            started: Instant::now(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self.poll = PollState::new(self.options.poll_config());
        self
    }

    pub fn grace_polls(mut self, grace_polls: u32) -> Self {
        self.options.grace_polls = grace_polls;
        self
    }

    pub fn max_polls(mut self, max: u64) -> Self {
        self.options.max_polls = Some(max);
        self
    }

    pub fn max_duration(mut self, max: Duration) -> Self {
        self.options.max_duration = Some(max);
        self
    }

    pub fn propagate_errors(mut self, propagate: bool) -> Self {
        self.options.propagate_errors = propagate;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Poll cycles run so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Next change set, `None` once the traversal is over.
    ///
    /// Cycles without changes are not reported. An error ends the
    /// traversal; the stream itself stays usable.
    pub async fn next(&mut self) -> Option<Result<ChangeSet, CoreError>> {
        loop {
            if self.state.is_stopped() {
                return None;
            }
            if self.stream.cancel.is_cancelled() {
                self.finish("cancelled");
                return None;
            }
            if self.state == (StreamState::Draining { remaining: 0 }) {
                self.finish("grace polls done");
                return None;
            }
            if let Some(err) = self.budget_exceeded() {
                self.finish("budget exceeded");
                return Some(Err(err));
            }

            if self.cycle > 0 {
                let delay = self.poll.next_delay();
                let cancel = self.stream.cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.finish("cancelled");
                        return None;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                if let Some(err) = self.duration_exceeded() {
                    self.finish("budget exceeded");
                    return Some(Err(err));
                }
            }

            self.cycle += 1;
            match self.run_cycle().await {
                Ok(Some(changes)) => return Some(Ok(changes)),
                Ok(None) => continue,
                Err(err) => {
                    self.finish("error");
                    return Some(Err(err));
                }
            }
        }
    }

    /// Adapt the traversal into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChangeSet, CoreError>> + 'a
    where
        S: 'a,
    {
        stream::unfold(self, |mut iter| async move {
            iter.next().await.map(|item| (item, iter))
        })
    }

    /// Run the traversal to the end, passing change sets to `handlers`.
    pub async fn drive(
        mut self,
        handlers: &[Arc<dyn ChangeHandler>],
    ) -> Result<StreamState, CoreError> {
        let label = self.stream.source.label();
        for handler in handlers {
            handler.on_start(&label);
        }

        let mut outcome = Ok(());
        while let Some(item) = self.next().await {
            match item {
                Ok(changes) => {
                    for handler in handlers {
                        handler.handle(&changes);
                    }
                }
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        for handler in handlers {
            handler.flush();
            handler.on_end(&label, &self.state);
        }
        outcome.map(|_| self.state)
    }

    async fn run_cycle(&mut self) -> Result<Option<ChangeSet>, CoreError> {
        let mut failure: Option<CoreError> = None;

        if self.state == StreamState::Polling {
            let done = match self.stream.source.is_done().await {
                Ok(done) => done,
                Err(err) if self.tolerates(&err) => {
                    warn!(cycle = self.cycle, error = %err, "status check failed, assuming not done");
                    failure = Some(err);
                    false
                }
                Err(err) => return Err(err),
            };
            if done && self.stream.is_stable() {
                info!(
                    source = %self.stream.source.label(),
                    grace_polls = self.options.grace_polls,
                    "job done and results stable, draining"
                );
                self.state = StreamState::Draining {
                    remaining: self.options.grace_polls,
                };
                if self.options.grace_polls == 0 {
                    return Ok(None);
                }
            }
        }

        let changes = match self.stream.poll_once(self.cycle).await {
            Ok(changes) => {
                if let StreamState::Draining { remaining } = &mut self.state {
                    *remaining = remaining.saturating_sub(1);
                }
                Some(changes)
            }
            Err(err) if self.tolerates(&err) => {
                warn!(cycle = self.cycle, error = %err, "results fetch failed, treating as no data");
                failure = Some(err);
                None
            }
            Err(err) => return Err(err),
        };

        match failure {
            Some(err) => {
                self.poll.record_error();
                if self.poll.should_give_up() {
                    warn!(
                        consecutive_errors = self.poll.consecutive_errors,
                        "giving up after repeated failures"
                    );
                    return Err(err);
                }
            }
            None => self.poll.record_success(),
        }

        let changes = changes.filter(|c| !c.is_empty());
        debug!(
            cycle = self.cycle,
            changed = changes.as_ref().map(ChangeSet::len).unwrap_or(0),
            state = %self.state,
            "poll cycle complete"
        );
        Ok(changes)
    }

    fn tolerates(&self, err: &CoreError) -> bool {
        !self.options.propagate_errors && err.is_transport()
    }

    fn budget_exceeded(&self) -> Option<CoreError> {
        if let Some(max) = self.options.max_polls {
            if self.cycle >= max {
                return Some(CoreError::timeout(format!(
                    "result stream reached max_polls ({})",
                    max
                )));
            }
        }
        self.duration_exceeded()
    }

    fn duration_exceeded(&self) -> Option<CoreError> {
        let max = self.options.max_duration?;
        if self.started.elapsed() >= max {
            return Some(CoreError::timeout(format!(
                "result stream exceeded max_duration ({:?})",
                max
            )));
        }
        None
    }

    fn finish(&mut self, reason: &str) {
        info!(
            source = %self.stream.source.label(),
            cycles = self.cycle,
            reason,
            "result stream stopped"
        );
        self.state = StreamState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::handler::BufferedHandler;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source: pops one status answer and one response per call,
    /// repeating the last one once the script runs out.
    #[derive(Default)]
    struct Scripted {
        done: Mutex<VecDeque<Result<bool, ()>>>,
        responses: Mutex<VecDeque<Result<Value, ()>>>,
        queries: Mutex<Vec<String>>,
        status_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(done: Vec<Result<bool, ()>>, responses: Vec<Result<Value, ()>>) -> Self {
            Self {
                done: Mutex::new(done.into()),
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn always_done(responses: Vec<Value>) -> Self {
            Self::new(vec![Ok(true)], responses.into_iter().map(Ok).collect())
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn statuses(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    fn transport_error() -> CoreError {
        CoreError::http_response(503, "http://test/tests/1", "unavailable", None)
    }

    fn next_of<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        let mut queue = queue.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ResultSource for Scripted {
        async fn is_done(&self) -> Result<bool, CoreError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            next_of(&self.done).map_err(|_| transport_error())
        }

        async fn fetch_results(&self, query: &ResultQuery) -> Result<Value, CoreError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().push(query.to_param());
            next_of(&self.responses).map_err(|_| transport_error())
        }

        fn label(&self) -> String {
            "scripted".to_string()
        }
    }

    fn id(raw: &str) -> MetricId {
        raw.parse().unwrap()
    }

    fn points(offsets: &[i64]) -> Value {
        Value::Array(
            offsets
                .iter()
                .map(|o| json!({"offset": o, "timestamp": o * 10, "data": {"value": o}}))
                .collect(),
        )
    }

    async fn collect<S: ResultSource>(iter: &mut Iterate<'_, S>) -> Vec<Result<ChangeSet, CoreError>> {
        let mut out = Vec::new();
        while let Some(item) = iter.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_single_metric_settles() {
        let source = Scripted::always_done(vec![
            json!({"m1": points(&[1])}),
            json!({"m1": points(&[2])}),
            json!({"m1": points(&[2])}),
        ]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);

        let mut iter = stream.iterate().grace_polls(3);
        let items = collect(&mut iter).await;
        assert_eq!(iter.state(), StreamState::Stopped);
        // 3 polls to settle, then exactly 3 grace polls
        assert_eq!(iter.cycle(), 6);
        drop(iter);

        let changes: Vec<ChangeSet> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].get("m1").unwrap().offset, 1);
        assert_eq!(changes[1].get("m1").unwrap().offset, 2);
        assert_eq!(stream.source().fetches(), 6);
        assert_eq!(stream.last_for(&id("m1")).unwrap().offset, 2);
        assert_eq!(stream.series_for(&id("m1")).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_carry_last_offsets() {
        let source = Scripted::always_done(vec![
            json!({"m1": points(&[1, 2]), "m2": points(&[5])}),
            json!({}),
        ]);
        let mut stream = ResultStream::new(source, vec![id("m1"), id("m2"), id("m1")]);
        assert_eq!(stream.tracked().len(), 2);

        let _ = collect(&mut stream.iterate().grace_polls(0)).await;

        let queries = stream.source().queries.lock().clone();
        assert_eq!(queries[0], "m1|-1,m2|-1");
        assert_eq!(queries[1], "m1|2,m2|5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_metric_keeps_offset() {
        let source = Scripted::always_done(vec![
            json!({"m1": points(&[1]), "m2": points(&[1])}),
            json!({"m1": [], "m2": points(&[2])}),
            json!({"m2": points(&[3])}),
            json!({"m1": [{"data": 1}], "m2": points(&[4])}),
            json!({}),
        ]);
        let mut stream = ResultStream::new(source, vec![id("m1"), id("m2")]);

        let items = collect(&mut stream.iterate().grace_polls(0)).await;
        assert!(items.iter().all(Result::is_ok));
        assert_eq!(stream.last_for(&id("m1")).unwrap().offset, 1);
        assert_eq!(stream.last_for(&id("m2")).unwrap().offset, 4);
        assert_eq!(stream.series_for(&id("m1")).len(), 1);
        assert_eq!(stream.series_for(&id("m2")).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offsets_never_decrease_under_replays() {
        let source = Scripted::new(
            vec![Ok(false), Ok(false), Ok(false), Ok(false), Ok(true)],
            vec![
                Ok(json!({"m1": points(&[1, 2, 3])})),
                Ok(json!({"m1": points(&[2, 3])})),
                Ok(json!({"m1": points(&[1])})),
                Ok(json!({"m1": points(&[3, 4])})),
                Ok(json!({"m1": points(&[4])})),
            ],
        );
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let handle = stream.last_handle();

        let mut iter = stream.iterate().grace_polls(1);
        let mut previous = -1;
        while let Some(item) = iter.next().await {
            item.unwrap();
            let offset = handle.get(&id("m1")).unwrap().offset;
            assert!(offset >= previous);
            previous = offset;
        }
        drop(iter);

        let offsets: Vec<i64> = stream.series_for(&id("m1")).iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_last_handle_read_from_another_task() {
        let source = Scripted::new(
            vec![Ok(false), Ok(false), Ok(false), Ok(true)],
            vec![
                Ok(json!({"m1": points(&[1, 2]), "m2": points(&[1])})),
                Ok(json!({"m1": points(&[3])})),
                Ok(json!({"m1": points(&[2, 3]), "m2": points(&[4])})),
                Ok(json!({})),
            ],
        );
        let mut stream = ResultStream::new(source, vec![id("m1"), id("m2")]);
        let handle = stream.last_handle();
        let finished = CancellationToken::new();

        let reader = tokio::spawn({
            let finished = finished.clone();
            async move {
                let mut seen: BTreeMap<String, i64> = BTreeMap::new();
                let mut reads = 0usize;
                loop {
                    let done = finished.is_cancelled();
                    for (metric, last) in handle.snapshot() {
                        let previous = seen.insert(metric.clone(), last.offset).unwrap_or(-1);
                        assert!(last.offset >= previous, "{} went back", metric);
                    }
                    reads += 1;
                    if done {
                        return (seen, reads);
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        });

        let items = collect(
            &mut stream
                .iterate()
                .poll_interval(Duration::from_millis(5))
                .grace_polls(1),
        )
        .await;
        finished.cancel();
        let (seen, reads) = reader.await.unwrap();

        assert!(items.iter().all(Result::is_ok));
        assert!(reads > 1);
        assert_eq!(seen.get("m1"), Some(&3));
        assert_eq!(seen.get("m2"), Some(&4));
        let last: BTreeMap<String, i64> = stream
            .last()
            .into_iter()
            .map(|(metric, last)| (metric, last.offset))
            .collect();
        assert_eq!(last, seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_draining_before_two_equal_snapshots() {
        // done from the start, data keeps moving for three polls
        let source = Scripted::always_done(vec![
            json!({"m1": points(&[1])}),
            json!({"m1": points(&[2])}),
            json!({"m1": points(&[3])}),
            json!({}),
        ]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let mut iter = stream.iterate().grace_polls(2);

        let mut states = Vec::new();
        while let Some(item) = iter.next().await {
            item.unwrap();
            states.push(iter.state());
        }
        assert!(states.iter().all(|s| *s == StreamState::Polling));
        // 4 polls until {3},{3} then 2 grace polls
        assert_eq!(iter.cycle(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_job_done() {
        let source = Scripted::new(
            vec![Ok(false), Ok(false), Ok(false), Ok(true)],
            vec![Ok(json!({"m1": points(&[1])}))],
        );
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let mut iter = stream.iterate().grace_polls(1);
        let items = collect(&mut iter).await;
        assert_eq!(items.len(), 1);
        // stable after poll 2, done first reported on cycle 4, one grace poll
        assert_eq!(iter.cycle(), 4);
        drop(iter);
        assert_eq!(stream.source().fetches(), 4);
        assert_eq!(stream.source().statuses(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_polls_are_idempotent() {
        let source = Scripted::new(
            vec![Ok(false)],
            vec![Ok(json!({"m1": points(&[1])}))],
        );
        let mut stream = ResultStream::new(source, vec![id("m1")]);

        let mut iter = stream.iterate().max_polls(3);
        assert!(iter.next().await.unwrap().is_ok());
        // polls 2 and 3 return nothing new, then the budget runs out
        let err = iter.next().await.unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
        assert!(iter.next().await.is_none());
        drop(iter);

        assert!(stream.is_stable());
        assert_eq!(stream.history[0], stream.history[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_propagates_by_default() {
        let source = Scripted::new(
            vec![Ok(false), Err(()), Ok(true)],
            vec![Ok(json!({"m1": points(&[1])}))],
        );
        let mut stream = ResultStream::new(source, vec![id("m1")]);

        let mut iter = stream.iterate();
        assert!(iter.next().await.unwrap().is_ok());
        let err = iter.next().await.unwrap().unwrap_err();
        assert_eq!(err.http_status(), Some(503));
        assert!(iter.next().await.is_none());
        drop(iter);

        // a fresh traversal resumes from the shared offsets
        assert_eq!(stream.last_for(&id("m1")).unwrap().offset, 1);
        let items = collect(&mut stream.iterate().grace_polls(0)).await;
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_tolerated_as_not_done() {
        let source = Scripted::new(
            vec![Ok(false), Err(()), Ok(true)],
            vec![Ok(json!({"m1": points(&[1])}))],
        );
        let options = StreamOptions::default().tolerant().grace_polls(0);
        let mut stream = ResultStream::with_options(source, vec![id("m1")], options);

        let items = collect(&mut stream.iterate()).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
        assert_eq!(stream.source().statuses(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_does_not_consume_grace() {
        let source = Scripted::new(
            vec![Ok(true)],
            vec![
                Ok(json!({"m1": points(&[1])})),
                Ok(json!({})),
                Err(()),
                Ok(json!({})),
            ],
        );
        let options = StreamOptions::default().tolerant().grace_polls(2);
        let mut stream = ResultStream::with_options(source, vec![id("m1")], options);

        let mut iter = stream.iterate();
        let items = collect(&mut iter).await;
        assert_eq!(items.len(), 1);
        // 2 polls settle, failed poll, then 2 successful grace polls
        assert_eq!(iter.cycle(), 5);
        drop(iter);
        assert_eq!(stream.source().fetches(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerant_mode_gives_up() {
        let source = Scripted::new(vec![Err(())], vec![Err(())]);
        let options = StreamOptions::default()
            .tolerant()
            .max_consecutive_errors(3);
        let mut stream = ResultStream::with_options(source, vec![id("m1")], options);

        let items = collect(&mut stream.iterate()).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().is_transport());
        assert_eq!(stream.source().fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_error_always_propagates() {
        let source = Scripted::always_done(vec![json!("garbage")]);
        let options = StreamOptions::default().tolerant();
        let mut stream = ResultStream::with_options(source, vec![id("m1")], options);

        let items = collect(&mut stream.iterate()).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(CoreError::Protocol(_))));
        assert_eq!(stream.last_for(&id("m1")).unwrap().offset, -1);
        assert!(stream.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_zero_stops_without_extra_poll() {
        let source = Scripted::always_done(vec![json!({"m1": points(&[1])}), json!({})]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let mut iter = stream.iterate().grace_polls(0);
        let items = collect(&mut iter).await;
        assert_eq!(items.len(), 1);
        assert_eq!(iter.cycle(), 3);
        drop(iter);
        assert_eq!(stream.source().fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_sleep() {
        let source = Scripted::new(vec![Ok(false)], vec![Ok(json!({"m1": points(&[1])}))]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let token = stream.cancel_token();

        let mut iter = stream.iterate().poll_interval(Duration::from_secs(3600));
        assert!(iter.next().await.unwrap().is_ok());
        token.cancel();
        assert!(iter.next().await.is_none());
        assert_eq!(iter.state(), StreamState::Stopped);
        drop(iter);
        assert_eq!(stream.source().fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration() {
        let source = Scripted::new(vec![Ok(false)], vec![Ok(json!({}))]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);

        let items = collect(
            &mut stream
                .iterate()
                .poll_interval(Duration::from_secs(3))
                .max_duration(Duration::from_secs(10)),
        )
        .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(CoreError::Timeout(_))));
        assert_eq!(stream.source().fetches(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_starts_over() {
        let source = Scripted::always_done(vec![json!({"m1": points(&[1])})]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);

        let first = collect(&mut stream.iterate().grace_polls(0)).await;
        assert_eq!(first.len(), 1);

        stream.reset();
        assert_eq!(stream.last_for(&id("m1")).unwrap().offset, -1);
        assert!(stream.series().is_empty());

        let second = collect(&mut stream.iterate().grace_polls(0)).await;
        assert_eq!(second.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_stream_and_drive() {
        use futures_util::StreamExt;

        let source = Scripted::always_done(vec![
            json!({"m1": points(&[1])}),
            json!({"m1": points(&[2])}),
        ]);
        let mut stream = ResultStream::new(source, vec![id("m1")]);
        let offsets: Vec<i64> = stream
            .iterate()
            .grace_polls(0)
            .into_stream()
            .map(|item| item.unwrap().get("m1").unwrap().offset)
            .collect()
            .await;
        assert_eq!(offsets, vec![1, 2]);

        stream.reset();
        let buffer = Arc::new(BufferedHandler::new());
        let handlers: Vec<Arc<dyn ChangeHandler>> = vec![buffer.clone()];
        let state = stream.iterate().grace_polls(0).drive(&handlers).await.unwrap();
        assert_eq!(state, StreamState::Stopped);
        // the script now repeats offset 2 only
        let changes = buffer.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].get("m1").unwrap().offset, 2);
    }
}
