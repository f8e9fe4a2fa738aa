//! Per-call options for repository operations.

use serde_json::Value;

use docrepo_core::types::cursor::CursorBound;
use docrepo_core::types::document::Document;
use docrepo_core::types::filter::FilterField;
use docrepo_core::types::id::DocumentId;
use docrepo_core::types::pagination::PageRequest;
use docrepo_core::types::sorting::SortField;

/// Options for `find_by_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindByIdOptions {
    /// Return soft-deleted entities too.
    pub include_deleted: bool,
    /// Raise `NotFound` instead of returning `None`.
    pub throw_if_not_found: bool,
}

impl FindByIdOptions {
    /// Options that include soft-deleted entities.
    pub fn include_deleted() -> Self {
        Self {
            include_deleted: true,
            ..Self::default()
        }
    }

    /// Options that raise `NotFound` for an absent entity.
    pub fn required() -> Self {
        Self {
            throw_if_not_found: true,
            ..Self::default()
        }
    }
}

/// Options for `find_by_ids`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindByIdsOptions {
    /// Return soft-deleted entities too.
    pub include_deleted: bool,
}

/// A declarative query: filters, ordering, window and soft-delete inclusion.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Equality filters, applied before `filters`.
    pub equals: Document,
    /// Operator filters.
    pub filters: Vec<FilterField>,
    /// Return soft-deleted entities too.
    pub include_deleted: bool,
    /// Ordering.
    pub order_by: Vec<SortField>,
    /// Maximum number of entities returned.
    pub limit: Option<usize>,
    /// Number of matching entities skipped, emulated by over-fetching.
    pub offset: usize,
    /// Cursor bounds over the ordering fields.
    pub cursors: Vec<CursorBound>,
    /// Do not fill the cache with the results.
    pub skip_cache_fill: bool,
}

impl FindOptions {
    /// Create empty options that match every live entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Add an operator filter.
    pub fn filter(mut self, filter: FilterField) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an ordering field.
    pub fn order_by(mut self, sort: SortField) -> Self {
        self.order_by.push(sort);
        self
    }

    /// Set the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the number of results to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Add a cursor bound.
    pub fn cursor(mut self, bound: CursorBound) -> Self {
        self.cursors.push(bound);
        self
    }

    /// Include soft-deleted entities.
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Do not fill the cache with the results.
    pub fn without_cache_fill(mut self) -> Self {
        self.skip_cache_fill = true;
        self
    }
}

/// Options for `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Caller-assigned id; generated by the store when absent.
    pub id: Option<DocumentId>,
    /// Version stamped on create instead of `1`.
    pub initial_version: Option<u64>,
}

impl CreateOptions {
    /// Create with a caller-assigned id.
    pub fn with_id(id: DocumentId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

/// Options for `update` and `update_many`.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Update a soft-deleted entity. Also allows writing `isDeleted` and
    /// `deletedAt`, which is how an entity is restored.
    pub bypass_soft_delete_check: bool,
    /// Do not increment the version.
    pub suppress_version_bump: bool,
    /// Fail with `VersionConflict` unless the stored version equals this.
    /// The read-compare-write then runs in a store transaction.
    pub expected_version: Option<u64>,
    /// Return the existing entity without writing when nothing changes.
    pub skip_unchanged: bool,
    /// Re-fetch the entity into the cache instead of invalidating it.
    pub refresh_cache: bool,
    /// Drop `null` values from the changes.
    pub sanitize: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            bypass_soft_delete_check: false,
            suppress_version_bump: false,
            expected_version: None,
            skip_unchanged: false,
            refresh_cache: false,
            sanitize: true,
        }
    }
}

impl UpdateOptions {
    /// Require the stored version to equal `version`.
    pub fn expecting_version(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            ..Self::default()
        }
    }

    /// Allow updating soft-deleted entities.
    pub fn bypass_soft_delete() -> Self {
        Self {
            bypass_soft_delete_check: true,
            ..Self::default()
        }
    }
}

/// Options for `delete` and `delete_many`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Remove the document even when soft delete is enabled.
    pub hard: bool,
    /// Soft-delete an entity that is already soft-deleted, restamping it.
    pub bypass_soft_delete_check: bool,
}

impl DeleteOptions {
    /// Remove the document.
    pub fn hard() -> Self {
        Self {
            hard: true,
            ..Self::default()
        }
    }
}

/// Options for `paginate`.
#[derive(Debug, Clone, Default)]
pub struct PaginateOptions {
    /// Query to page through. Its `limit` and `offset` are replaced.
    pub query: FindOptions,
    /// Page to return.
    pub page: PageRequest,
}

impl PaginateOptions {
    /// Page `page` of `page_size` entities over `query`.
    pub fn new(query: FindOptions, page: u64, page_size: u64) -> Self {
        Self {
            query,
            page: PageRequest::new(page, page_size),
        }
    }
}
