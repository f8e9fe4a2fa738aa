//! Conversion between stored documents and typed entities, and metadata
//! stamping on write.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::error::{AppError, ErrorKind};
use docrepo_core::result::AppResult;
use docrepo_core::traits::entity::Entity;
use docrepo_core::types::document::{Document, DocumentPatch, fields, get_path};
use docrepo_core::types::id::DocumentId;

/// Stamps metadata on write and maps stored documents to `E`.
pub struct EntityCodec<E> {
    soft_delete: bool,
    versioning: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityCodec<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for EntityCodec<E> {}

impl<E> std::fmt::Debug for EntityCodec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCodec")
            .field("soft_delete", &self.soft_delete)
            .field("versioning", &self.versioning)
            .finish()
    }
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_millis())
}

impl<E: Entity> EntityCodec<E> {
    /// Create a codec honouring the repository's soft-delete and versioning flags.
    pub fn new(config: &RepositoryConfig) -> Self {
        Self {
            soft_delete: config.soft_delete,
            versioning: config.versioning,
            _entity: PhantomData,
        }
    }

    /// Serialize a caller payload into a document. The payload must be a map.
    pub fn to_document<D: Serialize + ?Sized>(data: &D) -> AppResult<Document> {
        match serde_json::to_value(data)? {
            Value::Object(map) => Ok(map),
            other => Err(AppError::validation(format!(
                "{} payload must be an object, got {}",
                E::COLLECTION,
                value_type(&other)
            ))),
        }
    }

    /// Build the stored document for a new entity and the entity it decodes to.
    ///
    /// Reserved metadata keys in `data` are ignored. Fails with `Validation`
    /// when a required field is missing or the payload does not form a valid
    /// entity.
    pub fn encode_create(
        &self,
        id: &DocumentId,
        mut data: Document,
        now: DateTime<Utc>,
        initial_version: Option<u64>,
    ) -> AppResult<(Document, E)> {
        for key in fields::PROTECTED {
            data.remove(*key);
        }

        let missing: Vec<&str> = E::REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| get_path(&data, field).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::validation(format!(
                "Missing required fields for {}: {}",
                E::COLLECTION,
                missing.join(", ")
            )));
        }

        data.insert(fields::CREATED_AT.to_string(), timestamp(now));
        data.insert(fields::UPDATED_AT.to_string(), timestamp(now));
        if self.versioning {
            data.insert(
                fields::VERSION.to_string(),
                Value::from(initial_version.unwrap_or(1)),
            );
        }
        if self.soft_delete {
            data.insert(fields::IS_DELETED.to_string(), Value::Bool(false));
            data.insert(fields::DELETED_AT.to_string(), Value::Null);
        }

        let entity = self.decode(id, data.clone()).map_err(|e| {
            AppError::validation(format!("Invalid {} payload: {}", E::COLLECTION, e.message))
        })?;
        Ok((data, entity))
    }

    /// Clean caller changes for an update.
    ///
    /// `id`, `createdAt`, `updatedAt` and `version` are always dropped.
    /// `isDeleted` and `deletedAt` are kept only when `allow_restore` is set.
    /// With `sanitize`, `null` values are dropped as well.
    pub fn clean_changes(&self, mut changes: Document, sanitize: bool, allow_restore: bool) -> Document {
        for key in [fields::ID, fields::CREATED_AT, fields::UPDATED_AT, fields::VERSION] {
            changes.remove(key);
        }
        if !allow_restore {
            changes.remove(fields::IS_DELETED);
            changes.remove(fields::DELETED_AT);
        }
        if sanitize {
            changes.retain(|_, value| !value.is_null());
        }
        changes
    }

    /// Patch for a single update of an entity currently at `current_version`.
    pub fn encode_update(
        &self,
        changes: Document,
        now: DateTime<Utc>,
        current_version: u64,
        bump_version: bool,
    ) -> DocumentPatch {
        let mut patch = DocumentPatch::from_fields(changes).set(fields::UPDATED_AT, timestamp(now));
        if self.versioning && bump_version {
            patch = patch.set(fields::VERSION, current_version + 1);
        }
        patch
    }

    /// Patch for a batched update. The version is bumped with an atomic
    /// increment since the current value is not read.
    pub fn encode_batch_update(&self, changes: Document, now: DateTime<Utc>, bump_version: bool) -> DocumentPatch {
        let mut patch = DocumentPatch::from_fields(changes).set(fields::UPDATED_AT, timestamp(now));
        if self.versioning && bump_version {
            patch = patch.increment(fields::VERSION, 1);
        }
        patch
    }

    /// Patch marking an entity soft-deleted. The version is left unchanged.
    pub fn encode_soft_delete(&self, now: DateTime<Utc>) -> DocumentPatch {
        DocumentPatch::new()
            .set(fields::IS_DELETED, true)
            .set(fields::DELETED_AT, timestamp(now))
            .set(fields::UPDATED_AT, timestamp(now))
    }

    /// Map a stored document to the entity. Fails with `Decode`.
    pub fn decode(&self, id: &DocumentId, mut doc: Document) -> AppResult<E> {
        doc.insert(fields::ID.to_string(), Value::String(id.to_string()));
        serde_json::from_value(Value::Object(doc)).map_err(|e| {
            AppError::with_source(
                ErrorKind::Decode,
                format!("Stored {}/{id} does not decode: {e}", E::COLLECTION),
                e,
            )
        })
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
