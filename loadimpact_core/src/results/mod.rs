//! Result streaming.
//!
//! - Metric ids and the standard metric/load zone catalogs
//! - `ResultSource`, the seam to the API, and response parsing
//! - `ResultStream`, the offset-tracking poll loop
//! - `ValidationLogStream` for scenario validation logs
//! - Handlers for dispatching change sets

pub mod handler;
pub mod metric_id;
pub mod options;
pub mod source;
pub mod stream;
pub mod types;
pub mod validation;

pub use handler::{BufferedHandler, ChangeHandler, JsonHandler};
pub use metric_id::{LoadZone, MetricId, StandardMetric, UrlQualifier};
pub use options::StreamOptions;
pub use source::{parse_results, ResultQuery, ResultSource};
pub use stream::{Iterate, LastSeenHandle, ResultStream};
pub use types::{ChangeSet, DataPoint, LastSeen, OffsetTable, StreamState};
pub use validation::{LogEntry, LogPage, LogSource, ValidationLogStream};
