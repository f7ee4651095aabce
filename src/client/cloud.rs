//! Cloud account linking types.

use serde::{Deserialize, Serialize};

/// Request to link one AWS account through an IAM role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CloudAwsLinkAccountInput {
    /// The role ARN New Relic assumes to fetch data.
    pub arn: String,
    /// The name the linked account gets in New Relic.
    pub name: String,
}

/// Per-provider link requests, NerdGraph's `CloudLinkCloudAccountsInput`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudLinkCloudAccountsInput {
    /// AWS accounts to link.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aws: Vec<CloudAwsLinkAccountInput>,
}

impl CloudLinkCloudAccountsInput {
    /// True when there is nothing to link.
    pub fn is_empty(&self) -> bool {
        self.aws.is_empty()
    }
}

/// Request to unlink one linked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudUnlinkAccountsInput {
    /// The linked account to remove.
    pub linked_account_id: i64,
}

/// The cloud provider a linked account belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudProviderKind {
    /// Amazon Web Services.
    Aws,
    /// Any other provider, by GraphQL type name.
    Other(String),
}

#[derive(Deserialize)]
struct RawCloudProvider {
    #[serde(rename = "__typename", default)]
    typename: String,
}

impl From<RawCloudProvider> for CloudProviderKind {
    fn from(raw: RawCloudProvider) -> Self {
        match raw.typename.as_str() {
            "CloudAwsProvider" => Self::Aws,
            _ => Self::Other(raw.typename),
        }
    }
}

/// A cloud account linked to a New Relic account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudLinkedAccount {
    /// Linked account ID.
    pub id: i64,
    /// Linked account name.
    pub name: String,
    /// Provider credential label, the role ARN for AWS.
    #[serde(default)]
    pub auth_label: String,
    /// The provider the account belongs to.
    #[serde(deserialize_with = "deserialize_provider")]
    pub provider: CloudProviderKind,
}

fn deserialize_provider<'de, D>(deserializer: D) -> Result<CloudProviderKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    RawCloudProvider::deserialize(deserializer).map(Into::into)
}

/// An account removed by an unlink call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudUnlinkedAccount {
    /// Linked account ID.
    pub id: i64,
    /// Linked account name.
    #[serde(default)]
    pub name: String,
}

/// An error reported inside a link/unlink payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudIntegrationError {
    /// Error message.
    pub message: String,
    /// Error classification.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// Result of `cloudLinkAccount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudLinkAccountPayload {
    /// Accounts linked by the call.
    #[serde(default)]
    pub linked_accounts: Vec<CloudLinkedAccount>,
    /// Errors for requests that failed.
    #[serde(default)]
    pub errors: Vec<CloudIntegrationError>,
}

/// Result of `cloudUnlinkAccount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudUnlinkAccountPayload {
    /// Accounts unlinked by the call.
    #[serde(default)]
    pub unlinked_accounts: Vec<CloudUnlinkedAccount>,
    /// Errors for requests that failed.
    #[serde(default)]
    pub errors: Vec<CloudIntegrationError>,
}

pub(crate) const LINKED_ACCOUNTS_QUERY: &str = r#"
query($provider: String) {
  actor {
    cloud {
      linkedAccounts(provider: $provider) {
        id
        name
        authLabel
        provider { __typename }
      }
    }
  }
}"#;

pub(crate) const LINK_ACCOUNT_MUTATION: &str = r#"
mutation($accountId: Int!, $accounts: CloudLinkCloudAccountsInput!) {
  cloudLinkAccount(accountId: $accountId, accounts: $accounts) {
    linkedAccounts {
      id
      name
      authLabel
      provider { __typename }
    }
    errors { message type }
  }
}"#;

pub(crate) const UNLINK_ACCOUNT_MUTATION: &str = r#"
mutation($accountId: Int!, $accounts: [CloudUnlinkAccountsInput!]!) {
  cloudUnlinkAccount(accountId: $accountId, accounts: $accounts) {
    unlinkedAccounts { id name }
    errors { message type }
  }
}"#;

#[derive(Deserialize)]
pub(crate) struct LinkedAccountsData {
    actor: LinkedAccountsActor,
}

#[derive(Deserialize)]
struct LinkedAccountsActor {
    cloud: LinkedAccountsCloud,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkedAccountsCloud {
    #[serde(default)]
    linked_accounts: Option<Vec<CloudLinkedAccount>>,
}

impl LinkedAccountsData {
    pub(crate) fn into_accounts(self) -> Option<Vec<CloudLinkedAccount>> {
        self.actor.cloud.linked_accounts
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LinkAccountData {
    pub(crate) cloud_link_account: CloudLinkAccountPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnlinkAccountData {
    pub(crate) cloud_unlink_account: CloudUnlinkAccountPayload,
}
