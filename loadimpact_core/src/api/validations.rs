//! User scenario validations.

use super::client::LoadImpactClient;
use super::types::{decode, unwrap_envelope, Validation, VALIDATION_ENVELOPE};
use crate::errors::CoreError;
use crate::jobs::ValidationStatus;
use crate::results::{LogPage, LogSource, ValidationLogStream};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Validations API client.
pub struct ValidationsClient<'a> {
    client: &'a LoadImpactClient,
}

impl<'a> ValidationsClient<'a> {
    pub(crate) fn new(client: &'a LoadImpactClient) -> Self {
        Self { client }
    }

    /// Queue a validation of a user scenario.
    pub async fn create(&self, user_scenario_id: i64) -> Result<ScenarioValidation, CoreError> {
        let path = self.client.routes().validations();
        let body = self
            .client
            .http
            .post_json(path, &json!({ "user_scenario_id": user_scenario_id }))
            .await?;
        let validation: Validation = decode(
            unwrap_envelope(self.client.api_version(), body, VALIDATION_ENVELOPE)?,
            "validation",
        )?;
        info!(
            user_scenario_id,
            validation_id = validation.id,
            "scenario validation created"
        );
        Ok(ScenarioValidation::new(self.client.clone(), validation))
    }

    /// Fetch a validation by id.
    pub async fn get(&self, id: i64) -> Result<ScenarioValidation, CoreError> {
        let validation = ScenarioValidation::new(
            self.client.clone(),
            Validation {
                id,
                ..Default::default()
            },
        );
        validation.sync().await?;
        Ok(validation)
    }
}

/// Handle to a single scenario validation.
#[derive(Clone)]
pub struct ScenarioValidation {
    client: LoadImpactClient,
    id: i64,
    record: Arc<RwLock<Validation>>,
}

impl ScenarioValidation {
    pub(crate) fn new(client: LoadImpactClient, record: Validation) -> Self {
        Self {
            client,
            id: record.id,
            record: Arc::new(RwLock::new(record)),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn validation(&self) -> Validation {
        self.record.read().clone()
    }

    pub fn status(&self) -> ValidationStatus {
        self.record.read().status
    }

    /// Refresh the record from the API.
    pub async fn sync(&self) -> Result<Validation, CoreError> {
        let path = self.client.routes().validation(self.id);
        let body = self.client.http.get_json(&path, None).await?;
        let validation: Validation = decode(
            unwrap_envelope(self.client.api_version(), body, VALIDATION_ENVELOPE)?,
            "validation",
        )?;
        *self.record.write() = validation.clone();
        Ok(validation)
    }

    pub async fn is_done(&self) -> Result<bool, CoreError> {
        Ok(self.sync().await?.status.is_terminal())
    }

    /// Stream the validation log with the client's stream defaults.
    pub fn log_stream(&self) -> ValidationLogStream<ScenarioValidation> {
        ValidationLogStream::with_options(self.clone(), self.client.stream_options())
    }
}

#[async_trait]
impl LogSource for ScenarioValidation {
    async fn fetch_log(&self, offset: i64) -> Result<LogPage, CoreError> {
        let path = self.client.routes().validation_results(self.id);
        let offset = offset.to_string();
        let body = self
            .client
            .http
            .get_json(&path, Some(&[("offset", offset.as_str())]))
            .await?;
        LogPage::from_value(&body)
    }

    async fn status(&self) -> Result<ValidationStatus, CoreError> {
        Ok(self.sync().await?.status)
    }

    fn label(&self) -> String {
        format!("validation {}", self.id)
    }
}

impl std::fmt::Debug for ScenarioValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioValidation")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}
