//! CMS publishing: schema validation and idempotent upsert.
//!
//! The CMS surface is a trait so tests run against an in-memory fake.
//! The publisher fetches the collection schema once, validates every
//! field set against it before any write, and upserts by episode
//! number so a re-run never creates duplicates.

pub mod webflow;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::domain::FieldSet;
use crate::error::StageError;

pub use webflow::WebflowClient;

/// Field slug the upsert matches on.
pub const EPISODE_NUMBER_FIELD: &str = "episode-number";

/// Collection schema as the CMS reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaField {
    pub slug: String,

    #[serde(default, rename = "isRequired")]
    pub required: bool,

    #[serde(rename = "type")]
    pub field_type: String,
}

impl Schema {
    pub fn field(&self, slug: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.slug == slug)
    }
}

/// A stored collection item: CMS id plus its field data.
#[derive(Debug, Clone)]
pub struct CmsItem {
    pub id: String,
    pub fields: FieldSet,
}

#[async_trait]
pub trait CmsApi: Send + Sync {
    async fn fetch_schema(&self) -> Result<Schema, StageError>;

    async fn list_items(&self) -> Result<Vec<CmsItem>, StageError>;

    async fn create_item(&self, fields: &FieldSet) -> Result<CmsItem, StageError>;

    async fn update_item(&self, id: &str, fields: &FieldSet) -> Result<CmsItem, StageError>;
}

/// What an upsert did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

pub struct Publisher {
    api: Arc<dyn CmsApi>,
    schema: OnceCell<Schema>,
}

impl Publisher {
    pub fn new(api: Arc<dyn CmsApi>) -> Self {
        Self {
            api,
            schema: OnceCell::new(),
        }
    }

    async fn schema(&self) -> Result<&Schema, StageError> {
        self.schema
            .get_or_try_init(|| self.api.fetch_schema())
            .await
    }

    /// Validate and normalize a field set against the collection schema.
    ///
    /// Field names are normalized to lower-kebab, unknown fields are
    /// dropped with a warning, and missing required fields or type
    /// mismatches collect into a single `SchemaValidation` error.
    pub fn validate(fields: &FieldSet, schema: &Schema) -> Result<FieldSet, StageError> {
        let mut normalized = FieldSet::new();
        for (name, value) in fields {
            let slug = to_kebab(name);
            if schema.field(&slug).is_none() {
                warn!(field = %slug, "dropping field not in collection schema");
                continue;
            }
            normalized.insert(slug, value.clone());
        }

        let mut violations = Vec::new();
        for field in &schema.fields {
            match normalized.get(&field.slug) {
                Some(value) => {
                    if !type_conforms(value, &field.field_type) {
                        violations.push(field.slug.clone());
                    }
                }
                None if field.required => violations.push(field.slug.clone()),
                None => {}
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(StageError::SchemaValidation(violations))
        }
    }

    /// Validate against the live schema without writing anything.
    pub async fn check(&self, fields: &FieldSet) -> Result<FieldSet, StageError> {
        let schema = self.schema().await?;
        Self::validate(fields, schema)
    }

    /// Create or update the item matching the field set's episode
    /// number. Safe to call twice with the same input.
    pub async fn upsert(&self, fields: &FieldSet) -> Result<(CmsItem, UpsertAction), StageError> {
        let schema = self.schema().await?;
        let normalized = Self::validate(fields, schema)?;

        let episode_number = normalized.get(EPISODE_NUMBER_FIELD).cloned();
        let existing = match episode_number {
            Some(ref number) => self
                .api
                .list_items()
                .await?
                .into_iter()
                .find(|item| item.fields.get(EPISODE_NUMBER_FIELD) == Some(number)),
            None => None,
        };

        match existing {
            Some(item) => {
                debug!(item_id = %item.id, "updating existing collection item");
                let updated = self.api.update_item(&item.id, &normalized).await?;
                info!(item_id = %updated.id, "episode item updated");
                Ok((updated, UpsertAction::Updated))
            }
            None => {
                let created = self.api.create_item(&normalized).await?;
                info!(item_id = %created.id, "episode item created");
                Ok((created, UpsertAction::Created))
            }
        }
    }
}

/// Lowercase with spaces and underscores collapsed to hyphens.
fn to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Loose conformance check for the CMS field types we publish into.
fn type_conforms(value: &Value, field_type: &str) -> bool {
    match field_type {
        "Number" => value.is_number(),
        "Switch" => value.is_boolean(),
        "PlainText" | "RichText" | "Link" | "Color" | "Option" | "Reference" => value.is_string(),
        "Image" => value.is_object() || value.is_string(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema {
            fields: vec![
                SchemaField {
                    slug: "name".into(),
                    required: true,
                    field_type: "PlainText".into(),
                },
                SchemaField {
                    slug: "episode-number".into(),
                    required: true,
                    field_type: "Number".into(),
                },
                SchemaField {
                    slug: "episode-spotify-link".into(),
                    required: false,
                    field_type: "Link".into(),
                },
            ],
        }
    }

    #[test]
    fn test_validate_passes_conforming_fields() {
        let mut fields = FieldSet::new();
        fields.insert("name".into(), json!("Ep 1: Intro"));
        fields.insert("episode-number".into(), json!(1));

        let out = Publisher::validate(&fields, &schema()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_validate_normalizes_names_and_drops_unknown() {
        let mut fields = FieldSet::new();
        fields.insert("Name".into(), json!("Ep 1: Intro"));
        fields.insert("Episode Number".into(), json!(1));
        fields.insert("audio_url".into(), json!("https://cdn/x.mp3"));

        let out = Publisher::validate(&fields, &schema()).unwrap();
        assert!(out.contains_key("name"));
        assert!(out.contains_key("episode-number"));
        assert!(!out.contains_key("audio-url"));
    }

    #[test]
    fn test_validate_reports_missing_required_and_bad_types() {
        let mut fields = FieldSet::new();
        fields.insert("episode-number".into(), json!("forty-two"));

        let err = Publisher::validate(&fields, &schema()).unwrap_err();
        match err {
            StageError::SchemaValidation(violations) => {
                assert!(violations.contains(&"name".to_string()));
                assert!(violations.contains(&"episode-number".to_string()));
            }
            other => panic!("expected SchemaValidation, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_field_may_be_absent() {
        let mut fields = FieldSet::new();
        fields.insert("name".into(), json!("Ep 1: Intro"));
        fields.insert("episode-number".into(), json!(1));

        assert!(Publisher::validate(&fields, &schema()).is_ok());
    }
}
