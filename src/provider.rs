//! The New Relic provider.
//!
//! [`NewRelicProvider`] implements [`ProviderService`] by dispatching each
//! request to the resource or data source it names.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::client::{NerdGraphClient, NewRelicApi};
use crate::config::{ProviderConfig, REGIONS};
use crate::data_sources::entity::{self, EntityConfig};
use crate::error::ProviderError;
use crate::plan;
use crate::resources::cloud_account::{self, CloudAccountResource, CloudAccountState};
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

type Connect =
    Box<dyn Fn(&ProviderConfig) -> Result<Arc<dyn NewRelicApi>, ProviderError> + Send + Sync>;

struct Session {
    api: Arc<dyn NewRelicApi>,
    config: ProviderConfig,
}

/// Serves `newrelic_cloud_account` and `newrelic_entity`.
pub struct NewRelicProvider {
    connect: Connect,
    session: RwLock<Option<Session>>,
}

impl Default for NewRelicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NewRelicProvider {
    /// A provider that talks to NerdGraph once configured.
    pub fn new() -> Self {
        Self {
            connect: Box::new(connect_nerdgraph),
            session: RwLock::new(None),
        }
    }

    /// A provider that uses `api` instead of NerdGraph once configured.
    pub fn with_api(api: Arc<dyn NewRelicApi>) -> Self {
        Self {
            connect: Box::new(
                move |_: &ProviderConfig| -> Result<Arc<dyn NewRelicApi>, ProviderError> {
                    Ok(Arc::clone(&api))
                },
            ),
            session: RwLock::new(None),
        }
    }

    /// Schema of the provider block.
    pub fn provider_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("User API key, defaults to NEW_RELIC_API_KEY"),
            )
            .with_attribute(
                "account_id",
                Attribute::optional_int64()
                    .with_description("Default account ID, defaults to NEW_RELIC_ACCOUNT_ID"),
            )
            .with_attribute(
                "region",
                Attribute::optional_string()
                    .with_allowed_values(REGIONS)
                    .case_insensitive()
                    .with_description("Data center region, defaults to NEW_RELIC_REGION or US"),
            )
            .with_attribute(
                "nerdgraph_api_url",
                Attribute::optional_string()
                    .with_description("NerdGraph URL override, defaults to NEW_RELIC_NERDGRAPH_API_URL"),
            )
    }

    async fn session(&self) -> Result<(Arc<dyn NewRelicApi>, ProviderConfig), ProviderError> {
        let session = self.session.read().await;
        session
            .as_ref()
            .map(|s| (Arc::clone(&s.api), s.config.clone()))
            .ok_or_else(|| {
                ProviderError::Configuration("provider has not been configured".to_string())
            })
    }

    async fn cloud_account(
        &self,
        resource_account_id: Option<i64>,
    ) -> Result<(Arc<dyn NewRelicApi>, i64), ProviderError> {
        let (api, config) = self.session().await?;
        let account_id = config.select_account_id(resource_account_id)?;
        Ok((api, account_id))
    }

    fn resource_schema(resource_type: &str) -> Result<Schema, ProviderError> {
        match resource_type {
            cloud_account::RESOURCE_TYPE => Ok(cloud_account::schema()),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    fn data_source_schema(data_source_type: &str) -> Result<Schema, ProviderError> {
        match data_source_type {
            entity::DATA_SOURCE_TYPE => Ok(entity::schema()),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }
}

fn connect_nerdgraph(config: &ProviderConfig) -> Result<Arc<dyn NewRelicApi>, ProviderError> {
    Ok(Arc::new(NerdGraphClient::new(config)?))
}

fn cloud_account_state(value: Value) -> Result<CloudAccountState, ProviderError> {
    Ok(serde_json::from_value(value)?)
}

/// State for a read that found nothing is `null`, which drops the resource.
fn read_result(state: CloudAccountState) -> Result<Value, ProviderError> {
    if state.id.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::to_value(state)?)
}

#[async_trait]
impl ProviderService for NewRelicProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(Self::provider_schema())
            .with_resource(cloud_account::RESOURCE_TYPE, cloud_account::schema())
            .with_data_source(entity::DATA_SOURCE_TYPE, entity::schema())
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: vec![cloud_account::RESOURCE_TYPE.to_string()],
            data_sources: vec![entity::DATA_SOURCE_TYPE.to_string()],
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::provider_schema(), &config))
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&Self::provider_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let config = ProviderConfig::from_value(config)?;
        config.api_key()?;
        let api = (self.connect)(&config)?;

        if config.account_id.is_none() {
            warn!("No default account_id configured");
            diagnostics.push(
                Diagnostic::warning("No default account_id")
                    .with_detail("Every newrelic_cloud_account must set account_id")
                    .with_attribute("account_id"),
            );
        }

        info!(
            endpoint = %config.endpoint()?,
            account_id = ?config.account_id,
            "Provider configured"
        );
        *self.session.write().await = Some(Session { api, config });
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::resource_schema(resource_type)?, &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = Self::resource_schema(resource_type)?;
        Ok(plan::plan(&schema, prior_state.as_ref(), &proposed_state))
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        Self::resource_schema(resource_type)?;
        let planned = cloud_account_state(planned_state)?;
        let (api, account_id) = self.cloud_account(planned.account_id).await?;

        let state = CloudAccountResource::new(api.as_ref(), account_id)
            .create(&planned)
            .await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        Self::resource_schema(resource_type)?;
        let current = cloud_account_state(current_state)?;
        let (api, account_id) = self.cloud_account(current.account_id).await?;

        let state = CloudAccountResource::new(api.as_ref(), account_id)
            .read(&current.id)
            .await?;
        read_result(state)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        Self::resource_schema(resource_type)?;
        let prior = cloud_account_state(prior_state)?;
        let planned = cloud_account_state(planned_state)?;
        let (api, account_id) = self
            .cloud_account(planned.account_id.or(prior.account_id))
            .await?;

        let state = CloudAccountResource::new(api.as_ref(), account_id)
            .update(&prior, &planned)
            .await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        Self::resource_schema(resource_type)?;
        let current = cloud_account_state(current_state)?;
        let (api, account_id) = self.cloud_account(current.account_id).await?;

        CloudAccountResource::new(api.as_ref(), account_id)
            .delete(&current.id)
            .await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Self::resource_schema(resource_type)?;
        let (api, account_id) = self.cloud_account(None).await?;

        let state = CloudAccountResource::new(api.as_ref(), account_id)
            .read(id)
            .await?;
        if state.id.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no linked cloud accounts match {:?}",
                id
            )));
        }

        Ok(vec![ImportedResource::new(
            resource_type,
            serde_json::to_value(state)?,
        )])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&Self::data_source_schema(data_source_type)?, &config))
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        Self::data_source_schema(data_source_type)?;
        let config: EntityConfig = serde_json::from_value(config)?;
        let (api, _) = self.session().await?;

        let state = entity::read(api.as_ref(), &config).await?;
        Ok(serde_json::to_value(state)?)
    }
}
