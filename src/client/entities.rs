//! Entity search types.

use serde::{Deserialize, Serialize};

/// Filters for an entity search.
///
/// Serializes to NerdGraph's `EntitySearchQueryBuilder` input object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySearchQuery {
    /// Entity name to search for.
    pub name: String,
    /// Entity type, upper-case (`APPLICATION`, `HOST`, ...).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Entity domain, upper-case (`APM`, `BROWSER`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Tags the entity must carry.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<EntityTag>,
}

/// A key/value tag on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTag {
    /// The tag key.
    pub key: String,
    /// The tag value.
    pub value: String,
}

/// Subtype-specific data of an entity outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    /// An APM application.
    ApmApplication {
        /// Domain-specific application ID.
        application_id: i64,
    },
    /// A mobile application.
    MobileApplication {
        /// Domain-specific application ID.
        application_id: i64,
    },
    /// A browser application.
    BrowserApplication {
        /// Domain-specific application ID.
        application_id: i64,
        /// ID of the APM application serving this browser app, 0 when none.
        serving_apm_application_id: i64,
    },
    /// Any entity without subtype fields this provider exposes.
    Other,
}

/// An entity returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawEntityOutline")]
pub struct EntityOutline {
    /// Globally unique entity identifier.
    pub guid: String,
    /// Entity name.
    pub name: String,
    /// Entity type, as returned by New Relic.
    pub entity_type: String,
    /// Entity domain, as returned by New Relic.
    pub domain: String,
    /// Account the entity belongs to.
    pub account_id: i64,
    /// Subtype-specific fields.
    pub kind: EntityKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntityOutline {
    #[serde(rename = "__typename", default)]
    typename: String,
    guid: String,
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    account_id: i64,
    application_id: Option<i64>,
    serving_apm_application_id: Option<i64>,
}

impl From<RawEntityOutline> for EntityOutline {
    fn from(raw: RawEntityOutline) -> Self {
        let application_id = raw.application_id.unwrap_or_default();
        let kind = match raw.typename.as_str() {
            "ApmApplicationEntityOutline" => EntityKind::ApmApplication { application_id },
            "MobileApplicationEntityOutline" => EntityKind::MobileApplication { application_id },
            "BrowserApplicationEntityOutline" => EntityKind::BrowserApplication {
                application_id,
                serving_apm_application_id: raw.serving_apm_application_id.unwrap_or_default(),
            },
            _ => EntityKind::Other,
        };

        Self {
            guid: raw.guid,
            name: raw.name,
            entity_type: raw.entity_type,
            domain: raw.domain,
            account_id: raw.account_id,
            kind,
        }
    }
}

pub(crate) const ENTITY_SEARCH_QUERY: &str = r#"
query($queryBuilder: EntitySearchQueryBuilder) {
  actor {
    entitySearch(queryBuilder: $queryBuilder) {
      results {
        entities {
          __typename
          guid
          name
          type
          domain
          accountId
          ... on ApmApplicationEntityOutline { applicationId }
          ... on MobileApplicationEntityOutline { applicationId }
          ... on BrowserApplicationEntityOutline { applicationId servingApmApplicationId }
        }
      }
    }
  }
}"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntitySearchData {
    actor: EntitySearchActor,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitySearchActor {
    entity_search: EntitySearch,
}

#[derive(Deserialize)]
struct EntitySearch {
    results: EntitySearchResults,
}

#[derive(Deserialize)]
struct EntitySearchResults {
    #[serde(default)]
    entities: Vec<EntityOutline>,
}

impl EntitySearchData {
    pub(crate) fn into_entities(self) -> Vec<EntityOutline> {
        self.actor.entity_search.results.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_serialization_skips_empty_filters() {
        let query = EntitySearchQuery {
            name: "checkout".to_string(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"name": "checkout"}));

        let query = EntitySearchQuery {
            name: "checkout".to_string(),
            entity_type: Some("APPLICATION".to_string()),
            domain: Some("APM".to_string()),
            tags: vec![EntityTag {
                key: "env".to_string(),
                value: "prod".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "name": "checkout",
                "type": "APPLICATION",
                "domain": "APM",
                "tags": [{"key": "env", "value": "prod"}]
            })
        );
    }

    #[test]
    fn test_entity_outline_subtypes() {
        let browser: EntityOutline = serde_json::from_value(json!({
            "__typename": "BrowserApplicationEntityOutline",
            "guid": "MTIzfEJST1dTRVJ8",
            "name": "storefront",
            "type": "APPLICATION",
            "domain": "BROWSER",
            "accountId": 123,
            "applicationId": 77,
            "servingApmApplicationId": 42
        }))
        .unwrap();
        assert_eq!(
            browser.kind,
            EntityKind::BrowserApplication {
                application_id: 77,
                serving_apm_application_id: 42
            }
        );
        assert_eq!(browser.account_id, 123);

        let host: EntityOutline = serde_json::from_value(json!({
            "__typename": "InfrastructureHostEntityOutline",
            "guid": "MTIzfElORlJB",
            "name": "web-01",
            "type": "HOST",
            "domain": "INFRA",
            "accountId": 123
        }))
        .unwrap();
        assert_eq!(host.kind, EntityKind::Other);
        assert_eq!(host.entity_type, "HOST");
    }
}
