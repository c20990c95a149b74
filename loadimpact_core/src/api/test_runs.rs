//! Test runs.
//!
//! `TestsClient` starts and looks up runs. `TestRun` is the handle to one
//! run: it caches the last fetched record, aborts the run, and serves its
//! results to a `ResultStream`.

use super::client::LoadImpactClient;
use super::types::{decode, unwrap_envelope, Test, TEST_RUN_ENVELOPE, TEST_RUN_RESULTS_ENVELOPE};
use crate::config::ApiVersion;
use crate::errors::{CoreError, HttpErrorKind};
use crate::jobs::TestStatus;
use crate::results::{
    LoadZone, MetricId, ResultQuery, ResultSource, ResultStream, StandardMetric,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Tests API client.
pub struct TestsClient<'a> {
    client: &'a LoadImpactClient,
}

impl<'a> TestsClient<'a> {
    pub(crate) fn new(client: &'a LoadImpactClient) -> Self {
        Self { client }
    }

    /// Fetch a test run by id.
    pub async fn get(&self, id: i64) -> Result<TestRun, CoreError> {
        let run = TestRun::new(
            self.client.clone(),
            Test {
                id,
                ..Default::default()
            },
        );
        run.sync().await?;
        Ok(run)
    }

    /// Start a new run of a test configuration.
    ///
    /// The returned handle has already been synced once.
    pub async fn start_from_config(&self, config_id: i64) -> Result<TestRun, CoreError> {
        let path = self.client.routes().start(config_id);
        let body: Value = self.client.http.post_json(&path, &json!({})).await?;
        let record = unwrap_envelope(self.client.api_version(), body, TEST_RUN_ENVELOPE)?;

        let id = record
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| CoreError::protocol("start response has no test id"))?;
        info!(config_id, test_id = id, "test started");

        self.get(id).await
    }
}

/// Handle to a single test run.
///
/// Clones share the cached record, so a stream built from one clone and an
/// abort issued through another see the same state.
#[derive(Clone)]
pub struct TestRun {
    client: LoadImpactClient,
    id: i64,
    record: Arc<RwLock<Test>>,
}

impl TestRun {
    pub(crate) fn new(client: LoadImpactClient, record: Test) -> Self {
        Self {
            client,
            id: record.id,
            record: Arc::new(RwLock::new(record)),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Last fetched record.
    pub fn test(&self) -> Test {
        self.record.read().clone()
    }

    /// Status as of the last sync.
    pub fn status(&self) -> TestStatus {
        self.record.read().status
    }

    /// Refresh the record from the API.
    pub async fn sync(&self) -> Result<Test, CoreError> {
        let path = self.client.routes().test(self.id);
        let body = self.client.http.get_json(&path, None).await?;
        let test: Test = decode(
            unwrap_envelope(self.client.api_version(), body, TEST_RUN_ENVELOPE)?,
            "test",
        )?;

        let previous = std::mem::replace(&mut *self.record.write(), test.clone());
        if previous.status != test.status {
            info!(
                test_id = self.id,
                status = %test.status,
                "test status changed"
            );
        }
        Ok(test)
    }

    /// Sync, then report whether the run reached a terminal status.
    pub async fn is_done(&self) -> Result<bool, CoreError> {
        Ok(self.sync().await?.status.is_terminal())
    }

    /// Ask the API to abort the run.
    ///
    /// Returns `false` when the API refuses with 409 Conflict, which it does
    /// for runs that are already finishing or finished.
    pub async fn abort(&self) -> Result<bool, CoreError> {
        let path = self.client.routes().test_abort(self.id);
        match self.client.http.post_empty(&path).await {
            Ok(()) => {
                info!(test_id = self.id, "abort requested");
                Ok(true)
            }
            Err(e) => {
                let err = CoreError::from(e);
                if err.http_kind() == Some(HttpErrorKind::Conflict) {
                    debug!(test_id = self.id, "abort refused, test not running");
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Metrics streamed when none are named: user load time and active
    /// users, both in the world load zone.
    pub fn default_metrics() -> Vec<MetricId> {
        vec![
            MetricId::standard(StandardMetric::UserLoadTime, Some(LoadZone::World)),
            MetricId::standard(StandardMetric::ActiveUsers, Some(LoadZone::World)),
        ]
    }

    /// Stream results for `ids`, or for [`default_metrics`](Self::default_metrics)
    /// when `ids` is empty. Options come from the client's stream defaults.
    pub fn result_stream(&self, ids: Vec<MetricId>) -> ResultStream<TestRun> {
        let ids = if ids.is_empty() {
            Self::default_metrics()
        } else {
            ids
        };
        ResultStream::with_options(self.clone(), ids, self.client.stream_options())
    }
}

#[async_trait]
impl ResultSource for TestRun {
    async fn is_done(&self) -> Result<bool, CoreError> {
        TestRun::is_done(self).await
    }

    async fn fetch_results(&self, query: &ResultQuery) -> Result<Value, CoreError> {
        let path = self.client.routes().test_results(self.id);
        let ids = query.to_param();
        let mut body = self
            .client
            .http
            .get_json(&path, Some(&[("ids", ids.as_str())]))
            .await?;

        if self.client.api_version() == ApiVersion::V3 {
            if let Value::Object(map) = &mut body {
                if let Some(results) = map.remove(TEST_RUN_RESULTS_ENVELOPE) {
                    return Ok(results);
                }
            }
        }
        Ok(body)
    }

    fn label(&self) -> String {
        format!("test {}", self.id)
    }
}

impl std::fmt::Debug for TestRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRun")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}
