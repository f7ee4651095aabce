//! NerdGraph API client.
//!
//! [`NewRelicApi`] is the seam between the resources and New Relic. The
//! production implementation, [`NerdGraphClient`], speaks GraphQL over HTTPS;
//! tests use the in-memory fake in [`crate::testing`].

pub mod cloud;
pub mod entities;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub use cloud::{
    CloudAwsLinkAccountInput, CloudIntegrationError, CloudLinkAccountPayload,
    CloudLinkCloudAccountsInput, CloudLinkedAccount, CloudProviderKind, CloudUnlinkAccountPayload,
    CloudUnlinkAccountsInput, CloudUnlinkedAccount,
};
pub use entities::{EntityKind, EntityOutline, EntitySearchQuery, EntityTag};

/// Timeout applied to every NerdGraph request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The New Relic operations the provider needs.
#[async_trait]
pub trait NewRelicApi: Send + Sync {
    /// Search entities matching `query`.
    async fn search_entities(
        &self,
        query: &EntitySearchQuery,
    ) -> Result<Vec<EntityOutline>, ProviderError>;

    /// Link cloud accounts to `account_id`.
    async fn link_cloud_accounts(
        &self,
        account_id: i64,
        input: &CloudLinkCloudAccountsInput,
    ) -> Result<CloudLinkAccountPayload, ProviderError>;

    /// Unlink cloud accounts from `account_id`.
    async fn unlink_cloud_accounts(
        &self,
        account_id: i64,
        input: &[CloudUnlinkAccountsInput],
    ) -> Result<CloudUnlinkAccountPayload, ProviderError>;

    /// List every account linked through `provider` (e.g. `"aws"`).
    ///
    /// Returns [`ProviderError::NotFound`] when New Relic knows no linked
    /// accounts for the provider.
    async fn linked_accounts(
        &self,
        provider: &str,
    ) -> Result<Vec<CloudLinkedAccount>, ProviderError>;
}

/// [`NewRelicApi`] backed by NerdGraph.
#[derive(Clone)]
pub struct NerdGraphClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for NerdGraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NerdGraphClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlErrorExtensions {
    #[serde(default)]
    error_class: Option<String>,
}

impl GraphQlError {
    fn is_not_found(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.error_class.as_deref())
            == Some("NOT_FOUND")
    }
}

impl NerdGraphClient {
    /// Create a client from the provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint()?,
            api_key: config.api_key()?.to_string(),
        })
    }

    /// The URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, "NerdGraph responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: GraphQlResponse = response.json().await?;
        if let Some(first) = body.errors.first() {
            warn!(
                errors = body.errors.len(),
                message = %first.message,
                "NerdGraph returned errors"
            );
            if body.errors.iter().any(GraphQlError::is_not_found) {
                return Err(ProviderError::NotFound(first.message.clone()));
            }
            return Err(ProviderError::Api(first.message.clone()));
        }

        let data = body.data.ok_or_else(|| {
            ProviderError::UnexpectedResponse("NerdGraph response carried no data".to_string())
        })?;
        Ok(serde_json::from_value(data)?)
    }
}

fn status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status.as_u16() {
        401 | 403 => ProviderError::PermissionDenied(message),
        404 => ProviderError::NotFound(message),
        429 => ProviderError::ResourceExhausted(message),
        500..=599 => ProviderError::Unavailable(message),
        _ => ProviderError::Api(message),
    }
}

#[async_trait]
impl NewRelicApi for NerdGraphClient {
    #[instrument(skip(self), fields(name = %query.name))]
    async fn search_entities(
        &self,
        query: &EntitySearchQuery,
    ) -> Result<Vec<EntityOutline>, ProviderError> {
        let data: entities::EntitySearchData = self
            .query(
                entities::ENTITY_SEARCH_QUERY,
                json!({ "queryBuilder": query }),
            )
            .await?;
        Ok(data.into_entities())
    }

    #[instrument(skip(self, input), fields(aws = input.aws.len()))]
    async fn link_cloud_accounts(
        &self,
        account_id: i64,
        input: &CloudLinkCloudAccountsInput,
    ) -> Result<CloudLinkAccountPayload, ProviderError> {
        let data: cloud::LinkAccountData = self
            .query(
                cloud::LINK_ACCOUNT_MUTATION,
                json!({ "accountId": account_id, "accounts": input }),
            )
            .await?;
        Ok(data.cloud_link_account)
    }

    #[instrument(skip(self, input), fields(accounts = input.len()))]
    async fn unlink_cloud_accounts(
        &self,
        account_id: i64,
        input: &[CloudUnlinkAccountsInput],
    ) -> Result<CloudUnlinkAccountPayload, ProviderError> {
        let data: cloud::UnlinkAccountData = self
            .query(
                cloud::UNLINK_ACCOUNT_MUTATION,
                json!({ "accountId": account_id, "accounts": input }),
            )
            .await?;
        Ok(data.cloud_unlink_account)
    }

    #[instrument(skip(self))]
    async fn linked_accounts(
        &self,
        provider: &str,
    ) -> Result<Vec<CloudLinkedAccount>, ProviderError> {
        let data: cloud::LinkedAccountsData = self
            .query(cloud::LINKED_ACCOUNTS_QUERY, json!({ "provider": provider }))
            .await?;
        data.into_accounts().ok_or_else(|| {
            ProviderError::NotFound(format!("no linked accounts for provider {}", provider))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> NerdGraphClient {
        NerdGraphClient::new(&ProviderConfig {
            api_key: Some("NRAK-test".to_string()),
            nerdgraph_api_url: Some(server.url("/graphql")),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = NerdGraphClient::new(&ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_status_error_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::PermissionDenied(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::ResourceExhausted(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".to_string()),
            ProviderError::Api(msg) if msg.ends_with(": bad")
        ));
    }

    #[tokio::test]
    async fn test_search_entities_sends_query_builder() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .header("Api-Key", "NRAK-test")
                    .body_includes("queryBuilder")
                    .body_includes("\"domain\":\"APM\"");
                then.status(200).json_body(serde_json::json!({
                    "data": {"actor": {"entitySearch": {"results": {"entities": [{
                        "__typename": "ApmApplicationEntityOutline",
                        "guid": "MTIzfEFQTXw",
                        "name": "checkout",
                        "type": "APPLICATION",
                        "domain": "APM",
                        "accountId": 123,
                        "applicationId": 9
                    }]}}}}
                }));
            })
            .await;

        let entities = client(&server)
            .search_entities(&EntitySearchQuery {
                name: "checkout".to_string(),
                domain: Some("APM".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entities.len(), 1);
        assert_eq!(
            entities[0].kind,
            EntityKind::ApmApplication { application_id: 9 }
        );
    }

    #[tokio::test]
    async fn test_graphql_errors_become_api_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql");
                then.status(200).json_body(serde_json::json!({
                    "data": null,
                    "errors": [{"message": "Argument 'accountId' is invalid"}]
                }));
            })
            .await;

        let err = client(&server)
            .link_cloud_accounts(1, &CloudLinkCloudAccountsInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Argument 'accountId' is invalid");
        assert!(matches!(err, ProviderError::Api(_)));
    }

    #[tokio::test]
    async fn test_not_found_error_class() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql");
                then.status(200).json_body(serde_json::json!({
                    "errors": [{
                        "message": "No linked accounts",
                        "extensions": {"errorClass": "NOT_FOUND"}
                    }]
                }));
            })
            .await;

        let err = client(&server).linked_accounts("aws").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unauthorized_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql");
                then.status(401).body("invalid api key");
            })
            .await;

        let err = client(&server).linked_accounts("aws").await.unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }
}
