//! The `newrelic_cloud_account` resource.
//!
//! Links AWS accounts to a New Relic account. The resource ID is the sorted,
//! `:`-joined list of linked account IDs (`"6:8"`), so it always names exactly
//! the accounts this resource manages.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::client::{
    CloudAwsLinkAccountInput, CloudLinkCloudAccountsInput, CloudLinkedAccount, CloudProviderKind,
    CloudUnlinkAccountsInput, NewRelicApi,
};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::types::null_as_default;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "newrelic_cloud_account";

/// Providers whose linked accounts are read back into state.
const PROVIDERS: [&str; 1] = ["aws"];

/// Schema of the resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "id",
            Attribute::computed_string()
                .with_description("Sorted, colon-separated IDs of the linked accounts"),
        )
        .with_attribute(
            "account_id",
            Attribute::optional_computed_int64()
                .with_force_new()
                .with_description("The New Relic account ID where the cloud accounts will be linked to"),
        )
        .with_block(
            "aws",
            NestedBlock::set(
                Block::new()
                    .with_attribute(
                        "linked_account_id",
                        Attribute::computed_int64()
                            .with_description("The ID of the linked cloud account in New Relic"),
                    )
                    .with_attribute(
                        "arn",
                        Attribute::required_string()
                            .with_description("The AWS role ARN (used to fetch data)"),
                    )
                    .with_attribute(
                        "name",
                        Attribute::required_string().with_description("The linked account name"),
                    )
                    .with_description(
                        "Link a New Relic account to one or more AWS cloud accounts",
                    ),
            ),
        )
}

/// State of a `newrelic_cloud_account`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccountState {
    /// Serialized linked account IDs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Target New Relic account.
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Linked AWS accounts.
    #[serde(default, deserialize_with = "null_as_default")]
    pub aws: Vec<AwsAccount>,
}

/// One `aws` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsAccount {
    /// ID New Relic assigned when linking, unknown until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<i64>,
    /// Role ARN.
    pub arn: String,
    /// Linked account name.
    pub name: String,
}

impl AwsAccount {
    /// The configured part of the block, used for set membership.
    fn key(&self) -> (&str, &str) {
        (&self.arn, &self.name)
    }
}

/// Encode linked account IDs into a resource ID, independent of their order.
pub fn serialize_linked_account_ids(ids: &[i64]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(":")
}

/// Decode a resource ID into linked account IDs. The empty ID holds no accounts.
pub fn parse_linked_account_ids(id: &str) -> Result<Vec<i64>, ProviderError> {
    if id.is_empty() {
        return Ok(Vec::new());
    }

    id.split(':')
        .map(|part| {
            part.parse().map_err(|_| {
                ProviderError::Validation(format!(
                    "invalid {} ID {:?}: {:?} is not an integer",
                    RESOURCE_TYPE, id, part
                ))
            })
        })
        .collect()
}

/// Build link requests for `accounts`.
pub fn expand_aws_link_inputs(accounts: &[AwsAccount]) -> Vec<CloudAwsLinkAccountInput> {
    accounts
        .iter()
        .map(|account| CloudAwsLinkAccountInput {
            arn: account.arn.clone(),
            name: account.name.clone(),
        })
        .collect()
}

/// Build unlink requests for `accounts`, which must all be linked already.
pub fn expand_unlink_inputs(
    accounts: &[AwsAccount],
) -> Result<Vec<CloudUnlinkAccountsInput>, ProviderError> {
    accounts
        .iter()
        .map(|account| {
            account
                .linked_account_id
                .map(|linked_account_id| CloudUnlinkAccountsInput { linked_account_id })
                .ok_or_else(|| {
                    ProviderError::Validation(format!(
                        "aws account {:?} has no linked_account_id",
                        account.name
                    ))
                })
        })
        .collect()
}

/// Turn linked accounts read from New Relic into resource state.
pub fn flatten_linked_cloud_accounts(
    account_id: i64,
    linked_accounts: &[CloudLinkedAccount],
) -> Result<CloudAccountState, ProviderError> {
    let mut ids = Vec::with_capacity(linked_accounts.len());
    let mut aws = Vec::new();

    for account in linked_accounts {
        ids.push(account.id);
        match &account.provider {
            CloudProviderKind::Aws => aws.push(AwsAccount {
                linked_account_id: Some(account.id),
                name: account.name.clone(),
                arn: account.auth_label.clone(),
            }),
            CloudProviderKind::Other(kind) => {
                return Err(ProviderError::UnexpectedResponse(format!(
                    "got a linked account for an unknown provider: {}",
                    kind
                )))
            }
        }
    }
    aws.sort_by_key(|a| a.linked_account_id);

    Ok(CloudAccountState {
        id: serialize_linked_account_ids(&ids),
        account_id: Some(account_id),
        aws,
    })
}

/// Split the change from `prior` to `planned` into accounts to unlink and to link.
pub fn diff_aws_accounts(
    prior: &[AwsAccount],
    planned: &[AwsAccount],
) -> (Vec<AwsAccount>, Vec<AwsAccount>) {
    let prior_keys: HashSet<_> = prior.iter().map(AwsAccount::key).collect();
    let planned_keys: HashSet<_> = planned.iter().map(AwsAccount::key).collect();

    let unlink = prior
        .iter()
        .filter(|a| !planned_keys.contains(&a.key()))
        .cloned()
        .collect();
    let link = planned
        .iter()
        .filter(|a| !prior_keys.contains(&a.key()))
        .cloned()
        .collect();

    (unlink, link)
}

/// CRUD operations against one New Relic account.
pub struct CloudAccountResource<'a> {
    api: &'a dyn NewRelicApi,
    account_id: i64,
}

impl<'a> CloudAccountResource<'a> {
    /// Operate on `account_id` through `api`.
    pub fn new(api: &'a dyn NewRelicApi, account_id: i64) -> Self {
        Self { api, account_id }
    }

    /// Link every configured account, then read them back.
    #[instrument(skip(self, planned), fields(account_id = self.account_id))]
    pub async fn create(
        &self,
        planned: &CloudAccountState,
    ) -> Result<CloudAccountState, ProviderError> {
        let input = CloudLinkCloudAccountsInput {
            aws: expand_aws_link_inputs(&planned.aws),
        };
        let ids = self.link(&input).await?;
        let id = serialize_linked_account_ids(&ids);
        info!(id = %id, "Linked cloud accounts");

        self.read(&id).await
    }

    /// Read the linked accounts named by `id`.
    #[instrument(skip(self), fields(account_id = self.account_id))]
    pub async fn read(&self, id: &str) -> Result<CloudAccountState, ProviderError> {
        let tracked: HashSet<i64> = parse_linked_account_ids(id)?.into_iter().collect();

        let mut linked = Vec::new();
        for provider in PROVIDERS {
            let accounts = match self.api.linked_accounts(provider).await {
                Ok(accounts) => accounts,
                Err(e) if e.is_not_found() => {
                    debug!(provider, "No linked accounts for provider");
                    continue;
                }
                Err(e) => return Err(e),
            };
            linked.extend(accounts.into_iter().filter(|a| tracked.contains(&a.id)));
        }

        flatten_linked_cloud_accounts(self.account_id, &linked)
    }

    /// Unlink removed accounts, link added ones, then read back.
    #[instrument(skip(self, prior, planned), fields(account_id = self.account_id, id = %prior.id))]
    pub async fn update(
        &self,
        prior: &CloudAccountState,
        planned: &CloudAccountState,
    ) -> Result<CloudAccountState, ProviderError> {
        let mut ids = parse_linked_account_ids(&prior.id)?;
        let (unlink, link) = diff_aws_accounts(&prior.aws, &planned.aws);
        debug!(unlink = unlink.len(), link = link.len(), "Computed aws changes");

        if !unlink.is_empty() {
            let unlinked = self.unlink(&expand_unlink_inputs(&unlink)?).await?;
            ids.retain(|id| !unlinked.contains(id));
        }

        let input = CloudLinkCloudAccountsInput {
            aws: expand_aws_link_inputs(&link),
        };
        if !input.is_empty() {
            ids.extend(self.link(&input).await?);
        }

        let id = serialize_linked_account_ids(&ids);
        info!(id = %id, "Updated linked cloud accounts");
        self.read(&id).await
    }

    /// Unlink every account named by `id` in one call.
    #[instrument(skip(self), fields(account_id = self.account_id))]
    pub async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        let inputs: Vec<_> = parse_linked_account_ids(id)?
            .into_iter()
            .map(|linked_account_id| CloudUnlinkAccountsInput { linked_account_id })
            .collect();
        if inputs.is_empty() {
            return Ok(());
        }

        self.unlink(&inputs).await?;
        info!(count = inputs.len(), "Unlinked cloud accounts");
        Ok(())
    }

    async fn link(&self, input: &CloudLinkCloudAccountsInput) -> Result<Vec<i64>, ProviderError> {
        let payload = self.api.link_cloud_accounts(self.account_id, input).await?;
        if let Some(err) = payload.errors.first() {
            return Err(ProviderError::Api(err.message.clone()));
        }
        Ok(payload.linked_accounts.iter().map(|a| a.id).collect())
    }

    async fn unlink(&self, input: &[CloudUnlinkAccountsInput]) -> Result<Vec<i64>, ProviderError> {
        let payload = self.api.unlink_cloud_accounts(self.account_id, input).await?;
        if let Some(err) = payload.errors.first() {
            return Err(ProviderError::Api(err.message.clone()));
        }
        Ok(payload.unlinked_accounts.iter().map(|a| a.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCall, FakeNewRelic};

    fn aws(name: &str, arn: &str) -> AwsAccount {
        AwsAccount {
            linked_account_id: None,
            arn: arn.to_string(),
            name: name.to_string(),
        }
    }

    fn linked(id: i64, name: &str, arn: &str) -> CloudLinkedAccount {
        CloudLinkedAccount {
            id,
            name: name.to_string(),
            auth_label: arn.to_string(),
            provider: CloudProviderKind::Aws,
        }
    }

    #[test]
    fn test_serialize_linked_account_ids() {
        assert_eq!(
            serialize_linked_account_ids(&[1, 4, 6]),
            serialize_linked_account_ids(&[1, 4, 6])
        );
        assert_eq!(
            serialize_linked_account_ids(&[1, 4, 6]),
            serialize_linked_account_ids(&[4, 1, 6])
        );
        assert_ne!(
            serialize_linked_account_ids(&[1, 6]),
            serialize_linked_account_ids(&[4, 1, 6])
        );
        assert_ne!(
            serialize_linked_account_ids(&[1]),
            serialize_linked_account_ids(&[4])
        );
        assert_eq!(serialize_linked_account_ids(&[8, 6]), "6:8");
        assert_eq!(serialize_linked_account_ids(&[10, 9]), "9:10");
    }

    #[test]
    fn test_parse_linked_account_ids() {
        assert_eq!(parse_linked_account_ids("6:8").unwrap(), vec![6, 8]);
        assert_eq!(parse_linked_account_ids("42").unwrap(), vec![42]);
        assert!(parse_linked_account_ids("").unwrap().is_empty());
        assert!(matches!(
            parse_linked_account_ids("6:x"),
            Err(ProviderError::Validation(_))
        ));
    }

    #[test]
    fn test_expand_aws_link_inputs() {
        assert!(expand_aws_link_inputs(&[]).is_empty());

        let inputs = expand_aws_link_inputs(&[aws("Foo", "foo"), aws("Bar", "bar")]);
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains(&CloudAwsLinkAccountInput {
            name: "Foo".to_string(),
            arn: "foo".to_string()
        }));
        assert!(inputs.contains(&CloudAwsLinkAccountInput {
            name: "Bar".to_string(),
            arn: "bar".to_string()
        }));
    }

    #[test]
    fn test_expand_unlink_inputs() {
        let mut five = aws("Five", "five");
        five.linked_account_id = Some(5);
        let mut two = aws("Two", "two");
        two.linked_account_id = Some(2);

        let inputs = expand_unlink_inputs(&[five, two]).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.contains(&CloudUnlinkAccountsInput {
            linked_account_id: 5
        }));
        assert!(inputs.contains(&CloudUnlinkAccountsInput {
            linked_account_id: 2
        }));

        assert!(expand_unlink_inputs(&[aws("New", "new")]).is_err());
    }

    #[test]
    fn test_flatten_linked_cloud_accounts() {
        let state = flatten_linked_cloud_accounts(
            123,
            &[
                linked(8, "Y", "iam_role_arn_for_y"),
                linked(6, "X", "iam_role_arn_for_x"),
            ],
        )
        .unwrap();

        assert_eq!(state.id, "6:8");
        assert_eq!(state.account_id, Some(123));
        assert_eq!(
            state.aws,
            vec![
                AwsAccount {
                    linked_account_id: Some(6),
                    name: "X".to_string(),
                    arn: "iam_role_arn_for_x".to_string(),
                },
                AwsAccount {
                    linked_account_id: Some(8),
                    name: "Y".to_string(),
                    arn: "iam_role_arn_for_y".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_flatten_unknown_provider_fails() {
        let mut account = linked(6, "X", "x");
        account.provider = CloudProviderKind::Other("CloudAzureProvider".to_string());

        let err = flatten_linked_cloud_accounts(123, &[account]).unwrap_err();
        assert!(err.message().contains("unknown provider"));
    }

    #[test]
    fn test_diff_aws_accounts() {
        let mut x = aws("X", "arn-x");
        x.linked_account_id = Some(6);
        let mut y = aws("Y", "arn-y");
        y.linked_account_id = Some(8);

        let (unlink, link) = diff_aws_accounts(
            &[x.clone(), y],
            &[aws("X", "arn-x"), aws("Z", "arn-z")],
        );
        assert_eq!(unlink.len(), 1);
        assert_eq!(unlink[0].linked_account_id, Some(8));
        assert_eq!(link, vec![aws("Z", "arn-z")]);

        let (unlink, link) = diff_aws_accounts(&[x], &[aws("X", "arn-x")]);
        assert!(unlink.is_empty());
        assert!(link.is_empty());
    }

    #[tokio::test]
    async fn test_create_links_and_reads_back() {
        let api = FakeNewRelic::new();
        let resource = CloudAccountResource::new(&api, 123);

        let state = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "arn-x"), aws("Y", "arn-y")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(state.id, "1:2");
        assert_eq!(state.account_id, Some(123));
        assert_eq!(state.aws.len(), 2);
        assert_eq!(state.aws[0].linked_account_id, Some(1));
    }

    #[tokio::test]
    async fn test_create_surfaces_first_payload_error() {
        let api = FakeNewRelic::new();
        api.fail_links_with(["Invalid role ARN", "second"]);
        let resource = CloudAccountResource::new(&api, 123);

        let err = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "bad")],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Invalid role ARN");
    }

    #[tokio::test]
    async fn test_read_filters_to_tracked_ids() {
        let api = FakeNewRelic::new();
        api.add_linked_account(linked(6, "X", "arn-x"));
        api.add_linked_account(linked(7, "Other", "arn-other"));
        api.add_linked_account(linked(8, "Y", "arn-y"));

        let state = CloudAccountResource::new(&api, 123).read("6:8").await.unwrap();
        assert_eq!(state.id, "6:8");
        assert_eq!(state.aws.len(), 2);
    }

    #[tokio::test]
    async fn test_read_tolerates_not_found() {
        let api = FakeNewRelic::new();
        let state = CloudAccountResource::new(&api, 123).read("6:8").await.unwrap();
        assert_eq!(state.id, "");
        assert!(state.aws.is_empty());
    }

    #[tokio::test]
    async fn test_update_unlinks_before_linking() {
        let api = FakeNewRelic::new();
        let resource = CloudAccountResource::new(&api, 123);
        let prior = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "arn-x"), aws("Y", "arn-y")],
                ..Default::default()
            })
            .await
            .unwrap();
        api.clear_calls();

        let planned = CloudAccountState {
            aws: vec![aws("X", "arn-x"), aws("Z", "arn-z")],
            ..prior.clone()
        };
        let state = resource.update(&prior, &planned).await.unwrap();

        assert_eq!(state.id, "1:3");
        assert_eq!(
            api.calls()[..2],
            [
                FakeCall::Unlink {
                    account_id: 123,
                    ids: vec![2]
                },
                FakeCall::Link {
                    account_id: 123,
                    names: vec!["Z".to_string()]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_update_link_failure_after_unlink() {
        let api = FakeNewRelic::new();
        let resource = CloudAccountResource::new(&api, 123);
        let prior = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "arn-x"), aws("Y", "arn-y")],
                ..Default::default()
            })
            .await
            .unwrap();
        api.clear_calls();
        api.fail_links_with(["role arn-z is not assumable", "second error"]);

        let planned = CloudAccountState {
            aws: vec![aws("X", "arn-x"), aws("Z", "arn-z")],
            ..prior.clone()
        };
        let err = resource.update(&prior, &planned).await.unwrap_err();

        assert!(matches!(err, ProviderError::Api(ref msg) if msg == "role arn-z is not assumable"));
        assert_eq!(
            api.calls(),
            vec![
                FakeCall::Unlink {
                    account_id: 123,
                    ids: vec![2]
                },
                FakeCall::Link {
                    account_id: 123,
                    names: vec!["Z".to_string()]
                },
            ]
        );
        // The unlink is not rolled back.
        let remaining: Vec<_> = api.linked().iter().map(|a| a.id).collect();
        assert_eq!(remaining, vec![1]);
    }

    #[tokio::test]
    async fn test_update_without_changes_makes_no_mutations() {
        let api = FakeNewRelic::new();
        let resource = CloudAccountResource::new(&api, 123);
        let prior = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "arn-x")],
                ..Default::default()
            })
            .await
            .unwrap();
        api.clear_calls();

        let state = resource.update(&prior, &prior).await.unwrap();
        assert_eq!(state, prior);
        assert!(api
            .calls()
            .iter()
            .all(|c| matches!(c, FakeCall::LinkedAccounts { .. })));
    }

    #[tokio::test]
    async fn test_delete_unlinks_all_in_one_call() {
        let api = FakeNewRelic::new();
        let resource = CloudAccountResource::new(&api, 123);
        let state = resource
            .create(&CloudAccountState {
                aws: vec![aws("X", "arn-x"), aws("Y", "arn-y")],
                ..Default::default()
            })
            .await
            .unwrap();
        api.clear_calls();

        resource.delete(&state.id).await.unwrap();
        assert_eq!(
            api.calls(),
            vec![FakeCall::Unlink {
                account_id: 123,
                ids: vec![1, 2]
            }]
        );
        assert!(api.linked().is_empty());
    }

    #[tokio::test]
    async fn test_delete_empty_id_is_noop() {
        let api = FakeNewRelic::new();
        CloudAccountResource::new(&api, 123).delete("").await.unwrap();
        assert!(api.calls().is_empty());
    }
}
