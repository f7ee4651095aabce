//! The `newrelic_entity` data source.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::{EntityKind, EntityOutline, EntitySearchQuery, EntityTag, NewRelicApi};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::types::null_as_default;

/// Data source type name.
pub const DATA_SOURCE_TYPE: &str = "newrelic_entity";

/// Accepted values for `type`.
pub const ENTITY_TYPES: [&str; 5] = ["APPLICATION", "DASHBOARD", "HOST", "MONITOR", "WORKLOAD"];

/// Accepted values for `domain`.
pub const ENTITY_DOMAINS: [&str; 6] = ["APM", "BROWSER", "INFRA", "MOBILE", "SYNTH", "VIZ"];

/// Schema of the data source.
pub fn schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "name",
            Attribute::required_string().with_description("The name of the New Relic entity"),
        )
        .with_attribute(
            "type",
            Attribute::optional_computed_string()
                .with_allowed_values(ENTITY_TYPES)
                .case_insensitive()
                .with_description("The entity's type"),
        )
        .with_attribute(
            "domain",
            Attribute::optional_computed_string()
                .with_allowed_values(ENTITY_DOMAINS)
                .case_insensitive()
                .with_description("The entity's domain"),
        )
        .with_attribute(
            "guid",
            Attribute::computed_string().with_description("A unique entity identifier"),
        )
        .with_attribute(
            "account_id",
            Attribute::computed_int64()
                .with_description("The New Relic account ID associated with this entity"),
        )
        .with_attribute(
            "application_id",
            Attribute::computed_int64()
                .with_description("The domain-specific ID of the entity (only returned for APM, Mobile and Browser applications)"),
        )
        .with_attribute(
            "serving_apm_application_id",
            Attribute::computed_int64()
                .with_description("The browser-specific ID of the backing APM entity (only returned for Browser applications)"),
        )
        .with_block(
            "tag",
            NestedBlock::list(
                Block::new()
                    .with_attribute(
                        "key",
                        Attribute::required_string().with_description("The tag key"),
                    )
                    .with_attribute(
                        "value",
                        Attribute::required_string().with_description("The tag value"),
                    )
                    .with_description("A tag applied to the entity"),
            )
            .with_max_items(1),
        )
}

/// Configuration of a `newrelic_entity` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityConfig {
    /// Exact entity name.
    pub name: String,
    /// Entity type filter.
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    /// Entity domain filter.
    #[serde(default)]
    pub domain: Option<String>,
    /// At most one tag filter.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: Vec<EntityTag>,
}

impl EntityConfig {
    /// Build the search filters, upper-casing `type` and `domain`.
    pub fn to_query(&self) -> EntitySearchQuery {
        EntitySearchQuery {
            name: self.name.clone(),
            entity_type: self.entity_type.as_deref().map(str::to_ascii_uppercase),
            domain: self.domain.as_deref().map(str::to_ascii_uppercase),
            tags: self.tag.clone(),
        }
    }
}

/// State produced by reading a `newrelic_entity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    /// Same as `guid`.
    pub id: String,
    /// Globally unique entity identifier.
    pub guid: String,
    /// Entity name.
    pub name: String,
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Entity domain.
    pub domain: String,
    /// Account the entity belongs to.
    pub account_id: i64,
    /// Domain-specific application ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<i64>,
    /// APM application serving a browser application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_apm_application_id: Option<i64>,
    /// The configured tag filter.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: Vec<EntityTag>,
}

/// The first entity whose name equals `name` exactly.
pub fn find_exact<'a>(entities: &'a [EntityOutline], name: &str) -> Option<&'a EntityOutline> {
    entities.iter().find(|e| e.name == name)
}

/// Keep the configured spelling when it only differs from `returned` in case.
fn keep_configured(configured: Option<&str>, returned: &str) -> String {
    match configured {
        Some(configured) if configured.eq_ignore_ascii_case(returned) => configured.to_string(),
        _ => returned.to_string(),
    }
}

/// Turn a matched entity into data source state.
pub fn flatten_entity(config: &EntityConfig, entity: &EntityOutline) -> EntityState {
    let (application_id, serving_apm_application_id) = match entity.kind {
        EntityKind::ApmApplication { application_id }
        | EntityKind::MobileApplication { application_id } => (Some(application_id), None),
        EntityKind::BrowserApplication {
            application_id,
            serving_apm_application_id,
        } => (
            Some(application_id),
            Some(serving_apm_application_id).filter(|id| *id != 0),
        ),
        EntityKind::Other => (None, None),
    };

    EntityState {
        id: entity.guid.clone(),
        guid: entity.guid.clone(),
        name: entity.name.clone(),
        entity_type: keep_configured(config.entity_type.as_deref(), &entity.entity_type),
        domain: keep_configured(config.domain.as_deref(), &entity.domain),
        account_id: entity.account_id,
        application_id,
        serving_apm_application_id,
        tag: config.tag.clone(),
    }
}

/// Search New Relic and return the entity named exactly `config.name`.
#[instrument(skip(api, config), fields(name = %config.name))]
pub async fn read(
    api: &dyn NewRelicApi,
    config: &EntityConfig,
) -> Result<EntityState, ProviderError> {
    let entities = api.search_entities(&config.to_query()).await?;
    debug!(results = entities.len(), "Entity search returned");

    let entity = find_exact(&entities, &config.name).ok_or_else(|| {
        ProviderError::NotFound(format!(
            "the name '{}' does not match any New Relic One entity for the given search parameters",
            config.name
        ))
    })?;

    Ok(flatten_entity(config, entity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCall, FakeNewRelic};

    fn outline(name: &str, kind: EntityKind) -> EntityOutline {
        EntityOutline {
            guid: format!("GUID-{}", name),
            name: name.to_string(),
            entity_type: "APPLICATION".to_string(),
            domain: "BROWSER".to_string(),
            account_id: 123,
            kind,
        }
    }

    fn config(name: &str) -> EntityConfig {
        EntityConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_to_query_upper_cases_filters() {
        let query = EntityConfig {
            name: "checkout".to_string(),
            entity_type: Some("application".to_string()),
            domain: Some("Apm".to_string()),
            tag: vec![EntityTag {
                key: "env".to_string(),
                value: "prod".to_string(),
            }],
        }
        .to_query();

        assert_eq!(query.entity_type.as_deref(), Some("APPLICATION"));
        assert_eq!(query.domain.as_deref(), Some("APM"));
        assert_eq!(query.tags.len(), 1);
        assert_eq!(config("x").to_query().domain, None);
    }

    #[test]
    fn test_find_exact_is_case_sensitive() {
        let entities = vec![
            outline("Checkout", EntityKind::Other),
            outline("checkout-v2", EntityKind::Other),
            outline("checkout", EntityKind::Other),
        ];
        assert_eq!(
            find_exact(&entities, "checkout").map(|e| e.guid.as_str()),
            Some("GUID-checkout")
        );
        assert!(find_exact(&entities, "CHECKOUT").is_none());
    }

    #[test]
    fn test_flatten_browser_application() {
        let state = flatten_entity(
            &config("store"),
            &outline(
                "store",
                EntityKind::BrowserApplication {
                    application_id: 77,
                    serving_apm_application_id: 42,
                },
            ),
        );
        assert_eq!(state.id, "GUID-store");
        assert_eq!(state.guid, state.id);
        assert_eq!(state.account_id, 123);
        assert_eq!(state.application_id, Some(77));
        assert_eq!(state.serving_apm_application_id, Some(42));
    }

    #[test]
    fn test_flatten_skips_zero_serving_apm_id() {
        let state = flatten_entity(
            &config("store"),
            &outline(
                "store",
                EntityKind::BrowserApplication {
                    application_id: 77,
                    serving_apm_application_id: 0,
                },
            ),
        );
        assert_eq!(state.application_id, Some(77));
        assert_eq!(state.serving_apm_application_id, None);

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("serving_apm_application_id").is_none());
    }

    #[test]
    fn test_flatten_apm_and_other() {
        let apm = flatten_entity(
            &config("api"),
            &outline("api", EntityKind::ApmApplication { application_id: 9 }),
        );
        assert_eq!(apm.application_id, Some(9));
        assert_eq!(apm.serving_apm_application_id, None);

        let host = flatten_entity(&config("web-01"), &outline("web-01", EntityKind::Other));
        assert_eq!(host.application_id, None);
    }

    #[test]
    fn test_flatten_keeps_configured_spelling() {
        let config = EntityConfig {
            name: "store".to_string(),
            entity_type: Some("application".to_string()),
            domain: Some("APM".to_string()),
            tag: Vec::new(),
        };
        let state = flatten_entity(&config, &outline("store", EntityKind::Other));
        assert_eq!(state.entity_type, "application");
        // The configured domain differs, so the returned value wins.
        assert_eq!(state.domain, "BROWSER");
    }

    #[tokio::test]
    async fn test_read_first_exact_match() {
        let api = FakeNewRelic::new();
        api.add_entity(outline("store-old", EntityKind::Other));
        api.add_entity(outline("store", EntityKind::ApmApplication { application_id: 1 }));
        api.add_entity(outline("store", EntityKind::ApmApplication { application_id: 2 }));

        let state = read(&api, &config("store")).await.unwrap();
        assert_eq!(state.application_id, Some(1));
        assert_eq!(
            api.calls(),
            vec![FakeCall::SearchEntities {
                name: "store".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let api = FakeNewRelic::new();
        api.add_entity(outline("Store", EntityKind::Other));

        let err = read(&api, &config("store")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.message(),
            "the name 'store' does not match any New Relic One entity for the given search parameters"
        );
    }
}
