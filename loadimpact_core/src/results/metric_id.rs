//! Metric identifiers.
//!
//! The results endpoint addresses every series by a colon-separated id:
//! `base[:zone[:scenario[:status_code:method]]]`. The `base` is either a
//! standard metric name (`__li_user_load_time`) or a name derived from an
//! md5 digest (custom metrics, pages, URLs).

use crate::errors::CoreError;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters with a meaning in ids or in the `ids` query parameter.
const RESERVED: [char; 3] = [':', '|', ','];

/// Status/method qualifier of a per-URL metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UrlQualifier {
    pub status_code: u16,
    pub method: String,
}

/// Structured result id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricId {
    base: String,
    zone: Option<String>,
    scenario: Option<String>,
    qualifier: Option<UrlQualifier>,
}

fn check_field(label: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::invalid_input(format!("metric {} is empty", label)));
    }
    if let Some(c) = value.chars().find(|c| RESERVED.contains(c)) {
        return Err(CoreError::invalid_input(format!(
            "metric {} {:?} contains reserved character {:?}",
            label, value, c
        )));
    }
    Ok(())
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

impl MetricId {
    /// Id for a bare metric name, aggregated over all zones and scenarios.
    pub fn new(base: impl Into<String>) -> Result<Self, CoreError> {
        let base = base.into();
        check_field("name", &base)?;
        Ok(Self {
            base,
            zone: None,
            scenario: None,
            qualifier: None,
        })
    }

    /// Scope to a load zone id.
    pub fn in_zone(mut self, zone: impl fmt::Display) -> Result<Self, CoreError> {
        let zone = zone.to_string();
        check_field("zone", &zone)?;
        self.zone = Some(zone);
        Ok(self)
    }

    /// Scope to a user scenario id. Requires a zone.
    pub fn for_scenario(mut self, scenario: impl fmt::Display) -> Result<Self, CoreError> {
        if self.zone.is_none() {
            return Err(CoreError::invalid_input(
                "a scenario-scoped metric id needs a load zone",
            ));
        }
        let scenario = scenario.to_string();
        check_field("scenario", &scenario)?;
        self.scenario = Some(scenario);
        Ok(self)
    }

    /// Id for a standard metric, optionally scoped to a zone.
    pub fn standard(metric: StandardMetric, zone: Option<LoadZone>) -> Self {
        Self {
            base: metric.as_str().to_string(),
            zone: zone.map(|z| z.id().to_string()),
            scenario: None,
            qualifier: None,
        }
    }

    /// Id built from a name plus optional zone and scenario ids.
    ///
    /// Zone id `0` means no zone. The scenario only applies when a zone does.
    pub fn from_name(
        name: &str,
        zone: Option<u32>,
        scenario: Option<&str>,
    ) -> Result<Self, CoreError> {
        let mut id = Self::new(name)?;
        if let Some(zone) = zone.filter(|zone| *zone != 0) {
            id = id.in_zone(zone)?;
            if let Some(scenario) = scenario {
                id = id.for_scenario(scenario)?;
            }
        }
        Ok(id)
    }

    /// Id for a custom metric reported by a user scenario.
    pub fn custom(name: &str, zone: u32, scenario: impl fmt::Display) -> Result<Self, CoreError> {
        Self::new(format!("__custom_{}", md5_hex(name)))?
            .in_zone(zone)?
            .for_scenario(scenario)
    }

    /// Id for a page metric.
    pub fn page(name: &str, zone: u32, scenario: impl fmt::Display) -> Result<Self, CoreError> {
        Self::new(format!("__li_page{}", md5_hex(name)))?
            .in_zone(zone)?
            .for_scenario(scenario)
    }

    /// Id for a per-URL metric, split by response status and method.
    pub fn url(
        url: &str,
        zone: u32,
        scenario: impl fmt::Display,
        method: &str,
        status_code: u16,
    ) -> Result<Self, CoreError> {
        check_field("method", method)?;
        let mut id = Self::new(format!("__li_url{}", md5_hex(url)))?
            .in_zone(zone)?
            .for_scenario(scenario)?;
        id.qualifier = Some(UrlQualifier {
            status_code,
            method: method.to_string(),
        });
        Ok(id)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn qualifier(&self) -> Option<&UrlQualifier> {
        self.qualifier.as_ref()
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)?;
        if let Some(ref zone) = self.zone {
            write!(f, ":{}", zone)?;
        }
        if let Some(ref scenario) = self.scenario {
            write!(f, ":{}", scenario)?;
        }
        if let Some(ref q) = self.qualifier {
            write!(f, ":{}:{}", q.status_code, q.method)?;
        }
        Ok(())
    }
}

impl FromStr for MetricId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [base] => Self::new(*base),
            [base, zone] => Self::new(*base)?.in_zone(zone),
            [base, zone, scenario] => Self::new(*base)?.in_zone(zone)?.for_scenario(scenario),
            [base, zone, scenario, status, method] => {
                let status_code = status.parse::<u16>().map_err(|_| {
                    CoreError::invalid_input(format!("invalid status code in metric id: {}", s))
                })?;
                check_field("method", method)?;
                let mut id = Self::new(*base)?.in_zone(zone)?.for_scenario(scenario)?;
                id.qualifier = Some(UrlQualifier {
                    status_code,
                    method: method.to_string(),
                });
                Ok(id)
            }
            _ => Err(CoreError::invalid_input(format!("malformed metric id: {}", s))),
        }
    }
}

impl TryFrom<String> for MetricId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricId> for String {
    fn from(id: MetricId) -> Self {
        id.to_string()
    }
}

/// Built-in metrics collected for every test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardMetric {
    AccumulatedLoadTime,
    ActiveUsers,
    ActiveConnections,
    Bandwidth,
    ContentTypes,
    ContentTypesLoadTime,
    FailureRate,
    LiveFeedback,
    LoadGeneratorCpuUtilization,
    LoadGeneratorMemoryUtilization,
    Log,
    ProgressPercent,
    RequestsPerSecond,
    TotalBytesReceived,
    TotalRequests,
    UserLoadTime,
    RepetitionSuccessRate,
    RepetitionFailureRate,
}

impl StandardMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardMetric::AccumulatedLoadTime => "__li_accumulated_load_time",
            StandardMetric::ActiveUsers => "__li_clients_active",
            StandardMetric::ActiveConnections => "__li_connections_active",
            StandardMetric::Bandwidth => "__li_bandwidth",
            StandardMetric::ContentTypes => "__li_content_type",
            StandardMetric::ContentTypesLoadTime => "__li_content_type_load_time",
            StandardMetric::FailureRate => "__li_failure_rate",
            StandardMetric::LiveFeedback => "__li_live_feedback",
            StandardMetric::LoadGeneratorCpuUtilization => "__li_loadgen_cpu_utilization",
            StandardMetric::LoadGeneratorMemoryUtilization => "__li_loadgen_memory_utilization",
            StandardMetric::Log => "__li_log",
            StandardMetric::ProgressPercent => "__li_progress_percent_total",
            StandardMetric::RequestsPerSecond => "__li_requests_per_second",
            StandardMetric::TotalBytesReceived => "__li_total_rx_bytes",
            StandardMetric::TotalRequests => "__li_total_requests",
            StandardMetric::UserLoadTime => "__li_user_load_time",
            StandardMetric::RepetitionSuccessRate => "__li_reps_succeeded_percent",
            StandardMetric::RepetitionFailureRate => "__li_reps_failed_percent",
        }
    }
}

impl fmt::Display for StandardMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load zones results can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadZone {
    /// Aggregate over all zones.
    World,
    AmazonUsAshburn,
    AmazonUsPaloAlto,
    AmazonIeDublin,
    AmazonSgSingapore,
    AmazonJpTokyo,
    AmazonUsPortland,
    AmazonBrSaoPaulo,
    AmazonAuSydney,
    RackspaceUsChicago,
    RackspaceUsDallas,
    RackspaceUkLondon,
    RackspaceAuSydney,
}

impl LoadZone {
    pub const ALL: [LoadZone; 13] = [
        LoadZone::World,
        LoadZone::AmazonUsAshburn,
        LoadZone::AmazonUsPaloAlto,
        LoadZone::AmazonIeDublin,
        LoadZone::AmazonSgSingapore,
        LoadZone::AmazonJpTokyo,
        LoadZone::AmazonUsPortland,
        LoadZone::AmazonBrSaoPaulo,
        LoadZone::AmazonAuSydney,
        LoadZone::RackspaceUsChicago,
        LoadZone::RackspaceUsDallas,
        LoadZone::RackspaceUkLondon,
        LoadZone::RackspaceAuSydney,
    ];

    /// Numeric id used in metric ids.
    pub fn id(&self) -> u32 {
        match self {
            LoadZone::World => 1,
            LoadZone::AmazonUsAshburn => 11,
            LoadZone::AmazonUsPaloAlto => 12,
            LoadZone::AmazonIeDublin => 13,
            LoadZone::AmazonSgSingapore => 14,
            LoadZone::AmazonJpTokyo => 15,
            LoadZone::AmazonUsPortland => 22,
            LoadZone::AmazonBrSaoPaulo => 23,
            LoadZone::AmazonAuSydney => 25,
            LoadZone::RackspaceUsChicago => 26,
            LoadZone::RackspaceUsDallas => 27,
            LoadZone::RackspaceUkLondon => 28,
            LoadZone::RackspaceAuSydney => 29,
        }
    }

    /// Service name of the zone, e.g. `amazon:us:ashburn`.
    pub fn name(&self) -> &'static str {
        match self {
            LoadZone::World => "world",
            LoadZone::AmazonUsAshburn => "amazon:us:ashburn",
            LoadZone::AmazonUsPaloAlto => "amazon:us:palo alto",
            LoadZone::AmazonIeDublin => "amazon:ie:dublin",
            LoadZone::AmazonSgSingapore => "amazon:sg:singapore",
            LoadZone::AmazonJpTokyo => "amazon:jp:tokyo",
            LoadZone::AmazonUsPortland => "amazon:us:portland",
            LoadZone::AmazonBrSaoPaulo => "amazon:br:são paulo",
            LoadZone::AmazonAuSydney => "amazon:au:sydney",
            LoadZone::RackspaceUsChicago => "rackspace:us:chicago",
            LoadZone::RackspaceUsDallas => "rackspace:us:dallas",
            LoadZone::RackspaceUkLondon => "rackspace:uk:london",
            LoadZone::RackspaceAuSydney => "rackspace:au:sydney",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .iter()
            .copied()
            .find(|zone| zone.name() == name)
            .ok_or_else(|| CoreError::invalid_input(format!("there's no load zone with name '{}'", name)))
    }

    /// Convenience for `LoadZone::from_name(name)?.id()`.
    pub fn name_to_id(name: &str) -> Result<u32, CoreError> {
        Self::from_name(name).map(|zone| zone.id())
    }
}

impl fmt::Display for LoadZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_levels() {
        assert_eq!(
            MetricId::from_name("__li_user_load_time", None, None).unwrap().to_string(),
            "__li_user_load_time"
        );
        assert_eq!(
            MetricId::from_name("__li_user_load_time", Some(1), None).unwrap().to_string(),
            "__li_user_load_time:1"
        );
        assert_eq!(
            MetricId::from_name("__li_user_load_time", Some(1), Some("1")).unwrap().to_string(),
            "__li_user_load_time:1:1"
        );
    }

    #[test]
    fn test_from_name_zone_zero_is_unscoped() {
        assert_eq!(
            MetricId::from_name("__li_clients_active", Some(0), None).unwrap().to_string(),
            "__li_clients_active"
        );
        assert_eq!(
            MetricId::from_name("__li_clients_active", Some(0), Some("7")).unwrap().to_string(),
            "__li_clients_active"
        );
    }

    #[test]
    fn test_hashed_ids() {
        let custom = MetricId::custom("my metric", 1, 1).unwrap();
        assert_eq!(
            custom.to_string(),
            format!("__custom_{}:1:1", md5_hex("my metric"))
        );

        let page = MetricId::page("my page", 1, 1).unwrap();
        assert!(page.to_string().starts_with("__li_page"));
        assert!(page.to_string().ends_with(":1:1"));

        let url = MetricId::url("http://example.com/", 1, 1, "GET", 200).unwrap();
        assert_eq!(
            url.to_string(),
            format!("__li_url{}:1:1:200:GET", md5_hex("http://example.com/"))
        );
    }

    #[test]
    fn test_md5_digest_matches_known_value() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_parse_round_trip() {
        for raw in [
            "__li_clients_active",
            "__li_clients_active:1",
            "__li_clients_active:1:42",
            "__li_urlabc:13:7:404:POST",
        ] {
            let id: MetricId = raw.parse().unwrap();
            assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn test_reserved_characters_rejected() {
        assert!(MetricId::new("a|b").is_err());
        assert!(MetricId::new("a,b").is_err());
        assert!(MetricId::new("").is_err());
        assert!(MetricId::new("load").unwrap().in_zone("amazon:us").is_err());
        assert!("a:b:c:d".parse::<MetricId>().is_err());
        assert!("a::c".parse::<MetricId>().is_err());
        assert!("a:1:2:abc:GET".parse::<MetricId>().is_err());
    }

    #[test]
    fn test_scenario_requires_zone() {
        assert!(MetricId::new("x").unwrap().for_scenario(3).is_err());
    }

    #[test]
    fn test_standard_metric_ids() {
        let id = MetricId::standard(StandardMetric::ActiveUsers, Some(LoadZone::World));
        assert_eq!(id.to_string(), "__li_clients_active:1");
        assert_eq!(id.zone(), Some("1"));
    }

    #[test]
    fn test_load_zone_names() {
        assert_eq!(LoadZone::name_to_id("world").unwrap(), 1);
        assert_eq!(LoadZone::name_to_id("amazon:us:ashburn").unwrap(), 11);
        assert_eq!(LoadZone::name_to_id("amazon:br:são paulo").unwrap(), 23);
        assert_eq!(LoadZone::name_to_id("rackspace:au:sydney").unwrap(), 29);
        assert!(matches!(
            LoadZone::from_name("unknown"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let id = MetricId::standard(StandardMetric::UserLoadTime, Some(LoadZone::World));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"__li_user_load_time:1\"");
        let back: MetricId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
