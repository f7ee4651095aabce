//! Testing utilities.
//!
//! [`FakeNewRelic`] is an in-memory [`NewRelicApi`] that records every call,
//! and [`ProviderTester`] drives a [`ProviderService`] without a gRPC server.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_newrelic::testing::{FakeNewRelic, ProviderTester};
//! use hemmer_provider_newrelic::NewRelicProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_link_account() {
//!     let api = Arc::new(FakeNewRelic::new());
//!     let tester = ProviderTester::new(NewRelicProvider::with_api(api.clone()));
//!     tester.configure(json!({"api_key": "NRAK-test", "account_id": 123})).await.unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("newrelic_cloud_account", json!({"aws": [{"arn": "a", "name": "n"}]}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["id"], "1");
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{
    CloudIntegrationError, CloudLinkAccountPayload, CloudLinkCloudAccountsInput,
    CloudLinkedAccount, CloudProviderKind, CloudUnlinkAccountPayload, CloudUnlinkAccountsInput,
    CloudUnlinkedAccount, EntityOutline, EntitySearchQuery, NewRelicApi,
};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A call received by [`FakeNewRelic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    /// `search_entities`.
    SearchEntities {
        /// Searched name.
        name: String,
    },
    /// `link_cloud_accounts`.
    Link {
        /// Target account.
        account_id: i64,
        /// Names of the AWS accounts to link.
        names: Vec<String>,
    },
    /// `unlink_cloud_accounts`.
    Unlink {
        /// Target account.
        account_id: i64,
        /// Linked account IDs to remove.
        ids: Vec<i64>,
    },
    /// `linked_accounts`.
    LinkedAccounts {
        /// Queried provider.
        provider: String,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    entities: Vec<EntityOutline>,
    linked: Vec<CloudLinkedAccount>,
    last_id: i64,
    calls: Vec<FakeCall>,
    link_errors: Vec<String>,
}

/// An in-memory New Relic account.
///
/// Linking assigns IDs 1, 2, 3, ... in request order. Listing linked
/// accounts for a provider with none returns [`ProviderError::NotFound`],
/// the way NerdGraph does.
#[derive(Debug, Default)]
pub struct FakeNewRelic {
    state: Mutex<FakeState>,
}

impl FakeNewRelic {
    /// An empty account.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `entity` searchable.
    pub fn add_entity(&self, entity: EntityOutline) {
        self.state().entities.push(entity);
    }

    /// Add an already linked account.
    pub fn add_linked_account(&self, account: CloudLinkedAccount) {
        let mut state = self.state();
        state.last_id = state.last_id.max(account.id);
        state.linked.push(account);
    }

    /// Make subsequent link calls report `messages` as payload errors.
    pub fn fail_links_with<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().link_errors = messages.into_iter().map(Into::into).collect();
    }

    /// Currently linked accounts.
    pub fn linked(&self) -> Vec<CloudLinkedAccount> {
        self.state().linked.clone()
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl NewRelicApi for FakeNewRelic {
    async fn search_entities(
        &self,
        query: &EntitySearchQuery,
    ) -> Result<Vec<EntityOutline>, ProviderError> {
        let mut state = self.state();
        state.calls.push(FakeCall::SearchEntities {
            name: query.name.clone(),
        });

        let needle = query.name.to_lowercase();
        Ok(state
            .entities
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .filter(|e| query.domain.as_ref().map_or(true, |d| *d == e.domain))
            .filter(|e| {
                query
                    .entity_type
                    .as_ref()
                    .map_or(true, |t| *t == e.entity_type)
            })
            .cloned()
            .collect())
    }

    async fn link_cloud_accounts(
        &self,
        account_id: i64,
        input: &CloudLinkCloudAccountsInput,
    ) -> Result<CloudLinkAccountPayload, ProviderError> {
        let mut state = self.state();
        state.calls.push(FakeCall::Link {
            account_id,
            names: input.aws.iter().map(|a| a.name.clone()).collect(),
        });

        if !state.link_errors.is_empty() {
            return Ok(CloudLinkAccountPayload {
                linked_accounts: Vec::new(),
                errors: state
                    .link_errors
                    .iter()
                    .map(|message| CloudIntegrationError {
                        message: message.clone(),
                        error_type: Some("INVALID_REQUEST".to_string()),
                    })
                    .collect(),
            });
        }

        let mut linked_accounts = Vec::with_capacity(input.aws.len());
        for aws in &input.aws {
            state.last_id += 1;
            let account = CloudLinkedAccount {
                id: state.last_id,
                name: aws.name.clone(),
                auth_label: aws.arn.clone(),
                provider: CloudProviderKind::Aws,
            };
            state.linked.push(account.clone());
            linked_accounts.push(account);
        }

        Ok(CloudLinkAccountPayload {
            linked_accounts,
            errors: Vec::new(),
        })
    }

    async fn unlink_cloud_accounts(
        &self,
        account_id: i64,
        input: &[CloudUnlinkAccountsInput],
    ) -> Result<CloudUnlinkAccountPayload, ProviderError> {
        let mut state = self.state();
        let ids: Vec<i64> = input.iter().map(|i| i.linked_account_id).collect();
        state.calls.push(FakeCall::Unlink {
            account_id,
            ids: ids.clone(),
        });

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.linked)
            .into_iter()
            .partition(|a| ids.contains(&a.id));
        state.linked = kept;

        Ok(CloudUnlinkAccountPayload {
            unlinked_accounts: removed
                .into_iter()
                .map(|a| CloudUnlinkedAccount {
                    id: a.id,
                    name: a.name,
                })
                .collect(),
            errors: Vec::new(),
        })
    }

    async fn linked_accounts(
        &self,
        provider: &str,
    ) -> Result<Vec<CloudLinkedAccount>, ProviderError> {
        let mut state = self.state();
        state.calls.push(FakeCall::LinkedAccounts {
            provider: provider.to_string(),
        });

        let accounts: Vec<_> = state
            .linked
            .iter()
            .filter(|a| provider != "aws" || a.provider == CloudProviderKind::Aws)
            .cloned()
            .collect();
        if accounts.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no linked accounts for provider {}",
                provider
            )));
        }
        Ok(accounts)
    }
}

/// Drives a [`ProviderService`] the way the host would, without gRPC.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import a resource by ID.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Validate a data source configuration, failing on error diagnostics.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Plan, create, then read back.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Plan a destroy, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let plan = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        assert!(plan.planned_state.is_null(), "destroy plan kept state");
        self.delete(resource_type, current_state).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if no change has the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}
