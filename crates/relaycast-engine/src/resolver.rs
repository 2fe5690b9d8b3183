//! Recipient resolver — turns a campaign selection into a deduplicated,
//! ordered list of dispatchable recipient seeds.

use async_trait::async_trait;
use std::collections::HashSet;

use relaycast_core::error::Result;
use relaycast_core::types::{RecipientSeed, TenantCtx};

/// A recipient seed record as the entity store exposes it. Read-only from
/// this core's perspective.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceEntity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub variables: std::collections::HashMap<String, String>,
    /// Secret token for dynamic confirmation links.
    #[serde(default)]
    pub link_token: Option<String>,
}

/// Boundary to the entity store.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Fetch entities by id, in the requested order.
    async fn fetch(&self, tenant: &TenantCtx, entity_ids: &[String]) -> Result<Vec<SourceEntity>>;
}

/// A campaign-scoped recipient selection.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Explicit entity ids, resolved through the entity store.
    EntityIds(Vec<String>),
    /// Already-fetched entities supplied inline by the caller.
    Entities(Vec<SourceEntity>),
}

/// Resolve a selection into recipient seeds.
pub async fn resolve_selection(
    source: &dyn RecipientSource,
    tenant: &TenantCtx,
    selection: Selection,
) -> Result<Vec<RecipientSeed>> {
    let entities = match selection {
        Selection::EntityIds(ids) => source.fetch(tenant, &ids).await?,
        Selection::Entities(entities) => entities,
    };
    Ok(resolve_entities(entities))
}

/// Deduplicate by entity id (first occurrence wins), preserve input order,
/// and skip entities that cannot be reached on any channel. Input order is
/// the documented pass order — pacing fairness depends on it.
pub fn resolve_entities(entities: Vec<SourceEntity>) -> Vec<RecipientSeed> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut seeds = Vec::with_capacity(entities.len());
    for entity in entities {
        if !seen.insert(entity.id.clone()) {
            tracing::debug!("Duplicate entity {} dropped from selection", entity.id);
            continue;
        }
        let has_phone = entity.phone.as_deref().is_some_and(|p| !p.is_empty());
        let has_email = entity.email.as_deref().is_some_and(|e| !e.is_empty());
        if !has_phone && !has_email {
            tracing::warn!(
                "⚠️ Skipping '{}' ({}): no phone and no email",
                entity.name,
                entity.id
            );
            continue;
        }
        seeds.push(RecipientSeed {
            source_ref: Some(entity.id),
            name: entity.name,
            phone: entity.phone.filter(|p| !p.is_empty()),
            email: entity.email.filter(|e| !e.is_empty()),
            variables: entity.variables,
            link_token: entity.link_token,
        });
    }
    seeds
}
