//! The generic repository: cached reads, stamped writes, soft delete,
//! versioning, batches, pagination and transactions for one entity type.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use docrepo_cache::TtlCache;
use docrepo_core::config::repository::{RepositoryConfig, TimestampSource};
use docrepo_core::error::{AppError, ErrorKind};
use docrepo_core::result::AppResult;
use docrepo_core::traits::clock::{Clock, SystemClock};
use docrepo_core::traits::entity::Entity;
use docrepo_core::traits::store::{DocumentStore, StoreQuery};
use docrepo_core::types::batch::BatchOperation;
use docrepo_core::types::document::{
    Document, DocumentPatch, StoredDocument, apply_patch, fields, patch_changes,
};
use docrepo_core::types::filter::FilterField;
use docrepo_core::types::id::DocumentId;
use docrepo_core::types::pagination::PageResponse;

use crate::batch::{BatchOutcome, BatchWriter};
use crate::codec::EntityCodec;
use crate::options::{
    CreateOptions, DeleteOptions, FindByIdOptions, FindByIdsOptions, FindOptions,
    PaginateOptions, UpdateOptions,
};
use crate::stats::{RepositoryStats, StatsSnapshot};
use crate::transaction::{TransactionContext, TransactionCoordinator, TxFuture};
use crate::tx_repository::TxRepository;

/// What an update will do once the current document has been read.
pub(crate) enum UpdatePlan<E> {
    /// Nothing changes; the existing entity is returned as is.
    Unchanged(E),
    /// Write `patch`, producing `entity`.
    Write { patch: DocumentPatch, entity: E },
}

/// What a delete will do once the current document has been read.
pub(crate) enum DeletePlan {
    Soft(DocumentPatch),
    Hard,
}

/// State shared by a repository and its transactional views.
pub(crate) struct RepositoryInner<E: Entity> {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: RepositoryConfig,
    pub(crate) cache: TtlCache<DocumentId, E>,
    pub(crate) stats: RepositoryStats,
    pub(crate) codec: EntityCodec<E>,
    pub(crate) batch: BatchWriter,
    pub(crate) transactions: TransactionCoordinator,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<E: Entity> RepositoryInner<E> {
    /// Record a failed operation before handing the error back.
    pub(crate) fn track<T>(&self, operation: &'static str, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            self.stats.record_error(e);
            warn!(
                collection = E::COLLECTION,
                operation,
                kind = %e.kind,
                error = %e.message,
                "Repository operation failed"
            );
        }
        result
    }

    /// Current time from the configured timestamp source.
    pub(crate) async fn now(&self) -> AppResult<DateTime<Utc>> {
        match self.config.timestamps {
            TimestampSource::Client => Ok(self.clock.now()),
            TimestampSource::Server => self.store.server_time().await,
        }
    }

    /// Whether `entity` is returned by a read with the given inclusion flag.
    pub(crate) fn visible(&self, entity: &E, include_deleted: bool) -> bool {
        include_deleted || !self.config.soft_delete || !entity.is_deleted()
    }

    /// Equality filters, operator filters and the default live-only filter.
    pub(crate) fn filters(&self, opts: &FindOptions) -> Vec<FilterField> {
        let mut filters: Vec<FilterField> = opts
            .equals
            .iter()
            .map(|(field, value)| FilterField::eq(field.clone(), value.clone()))
            .collect();
        filters.extend(opts.filters.iter().cloned());
        if self.config.soft_delete && !opts.include_deleted {
            filters.push(FilterField::eq(fields::IS_DELETED, false));
        }
        filters
    }

    /// Store query for `opts`. The offset is emulated by over-fetching
    /// `limit + offset` rows.
    pub(crate) fn build_query(&self, opts: &FindOptions) -> StoreQuery {
        StoreQuery {
            filters: self.filters(opts),
            order_by: opts.order_by.clone(),
            cursors: opts.cursors.clone(),
            limit: opts.limit.map(|limit| limit.saturating_add(opts.offset)),
        }
    }

    /// Drop the emulated offset, apply the limit and decode.
    pub(crate) fn finish_find(&self, rows: Vec<StoredDocument>, opts: &FindOptions) -> AppResult<Vec<E>> {
        rows.into_iter()
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .map(|row| self.codec.decode(&row.id, row.data))
            .collect()
    }

    /// Id, stored document and entity for a create.
    pub(crate) fn prepare_create<D: Serialize + ?Sized>(
        &self,
        data: &D,
        opts: &CreateOptions,
        now: DateTime<Utc>,
    ) -> AppResult<(DocumentId, Document, E)> {
        let id = match &opts.id {
            Some(id) => DocumentId::parse(id.as_str())?,
            None => self.store.generate_id(),
        };
        let payload = EntityCodec::<E>::to_document(data)?;
        let (document, entity) = self.codec.encode_create(&id, payload, now, opts.initial_version)?;
        Ok((id, document, entity))
    }

    pub(crate) fn plan_update(
        &self,
        id: &DocumentId,
        existing: Option<Document>,
        changes: Document,
        opts: &UpdateOptions,
        now: DateTime<Utc>,
    ) -> AppResult<UpdatePlan<E>> {
        let Some(mut current) = existing else {
            return Err(AppError::not_found(format!(
                "{}/{id} not found for update",
                E::COLLECTION
            )));
        };
        let entity = self.codec.decode(id, current.clone())?;

        if self.config.soft_delete && entity.is_deleted() && !opts.bypass_soft_delete_check {
            return Err(AppError::soft_deleted(format!(
                "{}/{id} is soft-deleted",
                E::COLLECTION
            )));
        }
        if let Some(expected) = opts.expected_version {
            if entity.version() != expected {
                return Err(AppError::version_conflict(format!(
                    "{}/{id} is at version {}, expected {expected}",
                    E::COLLECTION,
                    entity.version()
                )));
            }
        }

        let changes = self
            .codec
            .clean_changes(changes, opts.sanitize, opts.bypass_soft_delete_check);
        if opts.skip_unchanged && !patch_changes(&current, &DocumentPatch::from_fields(changes.clone())) {
            return Ok(UpdatePlan::Unchanged(entity));
        }

        let patch = self
            .codec
            .encode_update(changes, now, entity.version(), !opts.suppress_version_bump);
        apply_patch(&mut current, &patch);
        let updated = self.codec.decode(id, current).map_err(|e| {
            AppError::validation(format!("Invalid {} update: {}", E::COLLECTION, e.message))
        })?;
        Ok(UpdatePlan::Write {
            patch,
            entity: updated,
        })
    }

    pub(crate) fn plan_delete(
        &self,
        id: &DocumentId,
        existing: Option<Document>,
        opts: &DeleteOptions,
        now: DateTime<Utc>,
    ) -> AppResult<DeletePlan> {
        let Some(current) = existing else {
            return Err(AppError::not_found(format!(
                "{}/{id} not found for delete",
                E::COLLECTION
            )));
        };
        if !self.config.soft_delete || opts.hard {
            return Ok(DeletePlan::Hard);
        }
        let entity = self.codec.decode(id, current)?;
        if entity.is_deleted() && !opts.bypass_soft_delete_check {
            return Err(AppError::soft_deleted(format!(
                "{}/{id} is already soft-deleted",
                E::COLLECTION
            )));
        }
        Ok(DeletePlan::Soft(self.codec.encode_soft_delete(now)))
    }

    /// Cached entity, counting the hit or miss.
    fn cached(&self, id: &DocumentId) -> Option<E> {
        if !self.cache.is_enabled() {
            return None;
        }
        match self.cache.get(id) {
            Some(entity) => {
                self.stats.increment_cache_hits();
                debug!(collection = E::COLLECTION, id = %id, "Cache hit");
                Some(entity)
            }
            None => {
                self.stats.increment_cache_misses();
                debug!(collection = E::COLLECTION, id = %id, "Cache miss");
                None
            }
        }
    }
}

/// Typed repository for entity `E`.
///
/// Each instance owns its cache and stats. Clones share them.
pub struct DocumentRepository<E: Entity> {
    inner: Arc<RepositoryInner<E>>,
}

impl<E: Entity> Clone for DocumentRepository<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> std::fmt::Debug for DocumentRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("collection", &E::COLLECTION)
            .field("store", &self.inner.store.provider_type())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> DocumentRepository<E> {
    /// Create a repository using the system clock.
    pub fn new(store: Arc<dyn DocumentStore>, config: RepositoryConfig) -> AppResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a repository with an explicit clock for timestamps and cache expiry.
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: RepositoryConfig,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        config.validate()?;
        let inner = RepositoryInner {
            cache: TtlCache::new(&config.cache, Arc::clone(&clock)),
            stats: RepositoryStats::new(),
            codec: EntityCodec::new(&config),
            batch: BatchWriter::new(Arc::clone(&store), &config.batch),
            transactions: TransactionCoordinator::new(Arc::clone(&store), &config.transaction),
            store,
            config,
            clock,
        };
        info!(
            collection = E::COLLECTION,
            store = inner.store.provider_type(),
            soft_delete = inner.config.soft_delete,
            versioning = inner.config.versioning,
            cache = inner.cache.is_enabled(),
            "Repository initialized"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub(crate) fn inner(&self) -> &RepositoryInner<E> {
        &self.inner
    }

    /// Collection this repository reads and writes.
    pub fn collection(&self) -> &'static str {
        E::COLLECTION
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Snapshot of the stats counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// The most recent error, with its batch report if it had one.
    pub fn last_error(&self) -> Option<AppError> {
        self.inner.stats.last_error()
    }

    /// Drop the cached copy of one entity.
    pub fn invalidate(&self, id: &DocumentId) {
        self.inner.cache.delete(id);
    }

    /// Drop every cached entity.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of cached entities, including expired ones not yet evicted.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// View of this repository bound to a running transaction.
    pub fn in_tx<'a>(&'a self, ctx: &'a mut TransactionContext) -> TxRepository<'a, E> {
        TxRepository::new(self, ctx)
    }

    /// Find an entity by id.
    ///
    /// Served from the cache when possible. Soft-deleted entities are
    /// returned only with `include_deleted`.
    pub async fn find_by_id(&self, id: &DocumentId, opts: FindByIdOptions) -> AppResult<Option<E>> {
        let result = self.find_by_id_inner(id, opts).await;
        self.inner.track("find_by_id", result)
    }

    async fn find_by_id_inner(&self, id: &DocumentId, opts: FindByIdOptions) -> AppResult<Option<E>> {
        let inner = &self.inner;
        let entity = match inner.cached(id) {
            Some(entity) => Some(entity),
            None => {
                inner.stats.increment_reads(1);
                match inner.store.get(E::COLLECTION, id).await? {
                    Some(doc) => {
                        let entity = inner.codec.decode(id, doc)?;
                        inner.cache.set(id.clone(), entity.clone());
                        Some(entity)
                    }
                    None => None,
                }
            }
        };

        match entity.filter(|e| inner.visible(e, opts.include_deleted)) {
            Some(entity) => Ok(Some(entity)),
            None if opts.throw_if_not_found => Err(AppError::not_found(format!(
                "{}/{id} not found",
                E::COLLECTION
            ))),
            None => Ok(None),
        }
    }

    /// Find entities matching `opts`.
    pub async fn find(&self, opts: FindOptions) -> AppResult<Vec<E>> {
        let result = self.find_inner(&opts).await;
        self.inner.track("find", result)
    }

    async fn find_inner(&self, opts: &FindOptions) -> AppResult<Vec<E>> {
        let inner = &self.inner;
        let query = inner.build_query(opts);
        inner.stats.increment_reads(1);
        let rows = inner.store.query(E::COLLECTION, &query).await?;
        let fetched = rows.len();
        let items = inner.finish_find(rows, opts)?;

        if !opts.skip_cache_fill && items.len() <= inner.config.query.cache_fill_threshold {
            for entity in &items {
                inner.cache.set(entity.id().clone(), entity.clone());
            }
        }
        debug!(
            collection = E::COLLECTION,
            fetched,
            count = items.len(),
            offset = opts.offset,
            "Query executed"
        );
        Ok(items)
    }

    /// Count entities matching the filters of `opts`.
    ///
    /// Ordering, cursors, limit and offset are ignored. Without a native
    /// count primitive the matching documents are fetched and counted.
    pub async fn count(&self, opts: &FindOptions) -> AppResult<u64> {
        let result = self.count_inner(opts).await;
        self.inner.track("count", result)
    }

    async fn count_inner(&self, opts: &FindOptions) -> AppResult<u64> {
        let inner = &self.inner;
        let filters = inner.filters(opts);
        if inner.store.capabilities().native_count {
            inner.stats.increment_reads(1);
            match inner.store.count(E::COLLECTION, &filters).await {
                Ok(count) => return Ok(count),
                Err(e) if e.kind == ErrorKind::NotImplemented => {
                    debug!(collection = E::COLLECTION, "Native count unavailable, scanning");
                }
                Err(e) => return Err(e),
            }
        }
        inner.stats.increment_reads(1);
        let query = StoreQuery {
            filters,
            ..StoreQuery::default()
        };
        let rows = inner.store.query(E::COLLECTION, &query).await?;
        Ok(rows.len() as u64)
    }

    /// Create an entity from `data`, which must serialize to a map.
    pub async fn create<D: Serialize + ?Sized>(&self, data: &D, opts: CreateOptions) -> AppResult<E> {
        let result = self.create_inner(data, &opts).await;
        self.inner.track("create", result)
    }

    async fn create_inner<D: Serialize + ?Sized>(&self, data: &D, opts: &CreateOptions) -> AppResult<E> {
        let inner = &self.inner;
        let now = inner.now().await?;
        let (id, document, entity) = inner.prepare_create(data, opts, now)?;
        inner.store.write(E::COLLECTION, &id, document).await?;
        inner.stats.increment_writes(1);
        inner.cache.set(id.clone(), entity.clone());
        info!(collection = E::COLLECTION, id = %id, "Entity created");
        Ok(entity)
    }

    /// Update the entity `id` with the fields of `changes`.
    ///
    /// Soft-deleted entities are rejected unless bypassed. With
    /// `expected_version` the read-compare-write runs in a transaction and a
    /// mismatch fails with `VersionConflict`.
    pub async fn update<D: Serialize + ?Sized>(
        &self,
        id: &DocumentId,
        changes: &D,
        opts: UpdateOptions,
    ) -> AppResult<E> {
        let result = self.update_inner(id, changes, opts).await;
        self.inner.track("update", result)
    }

    async fn update_inner<D: Serialize + ?Sized>(
        &self,
        id: &DocumentId,
        changes: &D,
        opts: UpdateOptions,
    ) -> AppResult<E> {
        let changes = EntityCodec::<E>::to_document(changes)?;
        if opts.expected_version.is_some() {
            return self.update_locked(id, changes, opts).await;
        }

        let inner = &self.inner;
        inner.stats.increment_reads(1);
        let existing = inner.store.get(E::COLLECTION, id).await?;
        let now = inner.now().await?;
        let (patch, entity) = match inner.plan_update(id, existing, changes, &opts, now)? {
            UpdatePlan::Unchanged(entity) => {
                debug!(collection = E::COLLECTION, id = %id, "Update changes nothing, skipped");
                return Ok(entity);
            }
            UpdatePlan::Write { patch, entity } => (patch, entity),
        };

        inner.store.update(E::COLLECTION, id, &patch).await?;
        inner.stats.increment_writes(1);
        info!(collection = E::COLLECTION, id = %id, version = entity.version(), "Entity updated");

        inner.cache.delete(id);
        if opts.refresh_cache {
            if let Some(fresh) = self.refresh_cached(id).await? {
                return Ok(fresh);
            }
        }
        Ok(entity)
    }

    async fn update_locked(&self, id: &DocumentId, changes: Document, opts: UpdateOptions) -> AppResult<E> {
        let refresh = opts.refresh_cache;
        let repo = self.clone();
        let key = id.clone();
        let entity = self
            .run_transaction_inner(move |ctx| {
                let repo = repo.clone();
                let id = key.clone();
                let changes = changes.clone();
                let opts = opts.clone();
                Box::pin(async move { repo.in_tx(ctx).update_document(&id, changes, &opts).await })
            })
            .await?;
        if refresh {
            if let Some(fresh) = self.refresh_cached(id).await? {
                return Ok(fresh);
            }
        }
        Ok(entity)
    }

    /// Re-read `id` from the store and cache what it holds now.
    async fn refresh_cached(&self, id: &DocumentId) -> AppResult<Option<E>> {
        let inner = &self.inner;
        inner.stats.increment_reads(1);
        let Some(doc) = inner.store.get(E::COLLECTION, id).await? else {
            return Ok(None);
        };
        let fresh = inner.codec.decode(id, doc)?;
        inner.cache.set(id.clone(), fresh.clone());
        Ok(Some(fresh))
    }

    /// Delete the entity `id`.
    ///
    /// With soft delete enabled and `hard` unset the entity is flagged
    /// `isDeleted` and stamped `deletedAt`; otherwise the document is removed.
    pub async fn delete(&self, id: &DocumentId, opts: DeleteOptions) -> AppResult<()> {
        let result = self.delete_inner(id, opts).await;
        self.inner.track("delete", result)
    }

    async fn delete_inner(&self, id: &DocumentId, opts: DeleteOptions) -> AppResult<()> {
        let inner = &self.inner;
        inner.stats.increment_reads(1);
        let existing = inner.store.get(E::COLLECTION, id).await?;
        let now = inner.now().await?;
        match inner.plan_delete(id, existing, &opts, now)? {
            DeletePlan::Soft(patch) => {
                inner.store.update(E::COLLECTION, id, &patch).await?;
                info!(collection = E::COLLECTION, id = %id, "Entity soft-deleted");
            }
            DeletePlan::Hard => {
                inner.store.remove(E::COLLECTION, id).await?;
                info!(collection = E::COLLECTION, id = %id, "Entity deleted");
            }
        }
        inner.stats.increment_writes(1);
        inner.cache.delete(id);
        Ok(())
    }

    /// Create many entities with store-generated ids.
    ///
    /// Payloads are all validated before anything is written. Chunks commit
    /// independently; see [`BatchWriter::execute`] for failure reporting.
    pub async fn create_batch<D: Serialize>(&self, items: &[D]) -> AppResult<Vec<E>> {
        let result = async {
            let now = self.inner.now().await?;
            let prepared = items
                .iter()
                .map(|item| self.inner.prepare_create(item, &CreateOptions::default(), now))
                .collect::<AppResult<Vec<_>>>()?;
            self.write_created(prepared).await
        }
        .await;
        self.inner.track("create_batch", result)
    }

    /// Create many entities with caller-assigned ids.
    pub async fn create_batch_with_ids<D: Serialize>(&self, items: &[(DocumentId, D)]) -> AppResult<Vec<E>> {
        let result = async {
            let now = self.inner.now().await?;
            let prepared = items
                .iter()
                .map(|(id, item)| {
                    self.inner
                        .prepare_create(item, &CreateOptions::with_id(id.clone()), now)
                })
                .collect::<AppResult<Vec<_>>>()?;
            self.write_created(prepared).await
        }
        .await;
        self.inner.track("create_batch", result)
    }

    async fn write_created(&self, prepared: Vec<(DocumentId, Document, E)>) -> AppResult<Vec<E>> {
        if prepared.is_empty() {
            return Ok(Vec::new());
        }
        let mut entities = Vec::with_capacity(prepared.len());
        let operations: Vec<BatchOperation> = prepared
            .into_iter()
            .map(|(id, document, entity)| {
                entities.push(entity);
                BatchOperation::Set {
                    collection: E::COLLECTION.to_string(),
                    id,
                    document,
                }
            })
            .collect();

        match self.inner.batch.execute(operations).await {
            Ok(outcome) => {
                self.inner.stats.increment_writes(outcome.written_count as u64);
                for entity in &entities {
                    self.inner.cache.set(entity.id().clone(), entity.clone());
                }
                Ok(entities)
            }
            Err(e) => {
                self.after_failed_batch(&e, entities.iter().map(|entity| entity.id()));
                Err(e)
            }
        }
    }

    /// Apply the same `changes` to every entity in `ids`.
    ///
    /// Duplicate ids are applied once. The version is bumped with an atomic
    /// increment. Entities are not read first, so soft-deleted entities are
    /// updated too and `expected_version` is not supported.
    pub async fn update_many<D: Serialize + ?Sized>(
        &self,
        ids: &[DocumentId],
        changes: &D,
        opts: UpdateOptions,
    ) -> AppResult<BatchOutcome> {
        let result = async {
            if opts.expected_version.is_some() {
                return Err(AppError::validation(
                    "expected_version is not supported for batch updates",
                ));
            }
            let ids = validate_batch_ids(ids)?;
            let changes = self.inner.codec.clean_changes(
                EntityCodec::<E>::to_document(changes)?,
                opts.sanitize,
                opts.bypass_soft_delete_check,
            );
            let now = self.inner.now().await?;
            let patch = self
                .inner
                .codec
                .encode_batch_update(changes, now, !opts.suppress_version_bump);
            let operations: Vec<BatchOperation> = ids
                .iter()
                .map(|id| BatchOperation::Update {
                    collection: E::COLLECTION.to_string(),
                    id: id.clone(),
                    patch: patch.clone(),
                })
                .collect();
            self.run_batch(operations, &ids).await
        }
        .await;
        self.inner.track("update_many", result)
    }

    /// Delete every entity in `ids`, softly unless `hard` or soft delete is off.
    pub async fn delete_many(&self, ids: &[DocumentId], opts: DeleteOptions) -> AppResult<BatchOutcome> {
        let result = async {
            let ids = validate_batch_ids(ids)?;
            let operations: Vec<BatchOperation> = if self.inner.config.soft_delete && !opts.hard {
                let patch = self.inner.codec.encode_soft_delete(self.inner.now().await?);
                ids.iter()
                    .map(|id| BatchOperation::Update {
                        collection: E::COLLECTION.to_string(),
                        id: id.clone(),
                        patch: patch.clone(),
                    })
                    .collect()
            } else {
                ids.iter()
                    .map(|id| BatchOperation::Delete {
                        collection: E::COLLECTION.to_string(),
                        id: id.clone(),
                    })
                    .collect()
            };
            self.run_batch(operations, &ids).await
        }
        .await;
        self.inner.track("delete_many", result)
    }

    async fn run_batch(&self, operations: Vec<BatchOperation>, ids: &[DocumentId]) -> AppResult<BatchOutcome> {
        match self.inner.batch.execute(operations).await {
            Ok(outcome) => {
                self.inner.stats.increment_writes(outcome.written_count as u64);
                self.inner.cache.delete_many(ids);
                Ok(outcome)
            }
            Err(e) => {
                self.after_failed_batch(&e, ids.iter());
                Err(e)
            }
        }
    }

    fn after_failed_batch<'a>(&self, err: &AppError, ids: impl Iterator<Item = &'a DocumentId>) {
        if let Some(report) = err.batch_report() {
            self.inner.stats.increment_writes(report.written_count as u64);
        }
        self.inner.cache.delete_many(ids);
    }

    /// Fetch the entities with the given ids.
    ///
    /// Ids are de-duplicated and fetched at most once each, from the cache
    /// when possible. Missing ids are omitted; results follow first
    /// occurrence order.
    pub async fn find_by_ids(&self, ids: &[DocumentId], opts: FindByIdsOptions) -> AppResult<Vec<E>> {
        let result = self.find_by_ids_inner(ids, opts).await;
        self.inner.track("find_by_ids", result)
    }

    async fn find_by_ids_inner(&self, ids: &[DocumentId], opts: FindByIdsOptions) -> AppResult<Vec<E>> {
        let inner = &self.inner;
        let unique = dedupe(ids);
        let mut found: HashMap<DocumentId, E> = HashMap::with_capacity(unique.len());
        let mut missing = Vec::new();
        for id in &unique {
            match inner.cached(id) {
                Some(entity) => {
                    found.insert(id.clone(), entity);
                }
                None => missing.push(id.clone()),
            }
        }

        if !missing.is_empty() {
            let rows = if inner.store.capabilities().multi_get {
                inner.stats.increment_reads(1);
                inner.store.multi_get(E::COLLECTION, &missing).await?
            } else {
                inner.stats.increment_reads(missing.len() as u64);
                let store = &inner.store;
                try_join_all(missing.iter().map(|id| async move {
                    let doc = store.get(E::COLLECTION, id).await?;
                    Ok::<_, AppError>(doc.map(|data| StoredDocument::new(id.clone(), data)))
                }))
                .await?
                .into_iter()
                .flatten()
                .collect()
            };
            for row in rows {
                let entity = inner.codec.decode(&row.id, row.data)?;
                inner.cache.set(row.id.clone(), entity.clone());
                found.insert(row.id, entity);
            }
        }

        Ok(unique
            .iter()
            .filter_map(|id| found.remove(id))
            .filter(|entity| inner.visible(entity, opts.include_deleted))
            .collect())
    }

    /// One page of the entities matching `opts.query`.
    ///
    /// The count and the page query run concurrently. The page size is
    /// capped at `query.max_page_size`.
    pub async fn paginate(&self, opts: PaginateOptions) -> AppResult<PageResponse<E>> {
        let result = self.paginate_inner(opts).await;
        self.inner.track("paginate", result)
    }

    async fn paginate_inner(&self, opts: PaginateOptions) -> AppResult<PageResponse<E>> {
        let request = opts.page.capped(self.inner.config.query.max_page_size);
        let offset = usize::try_from(request.offset())
            .map_err(|_| AppError::validation(format!("Page {} is out of range", request.page)))?;
        let limit = usize::try_from(request.limit())
            .map_err(|_| AppError::validation("Page size is out of range"))?;
        let page_query = opts.query.clone().limit(limit).offset(offset);

        let (total, items) = tokio::try_join!(self.count_inner(&opts.query), self.find_inner(&page_query))?;
        Ok(PageResponse::new(items, request.page, request.page_size, total))
    }

    /// Run `work` in a store transaction.
    ///
    /// `work` may run more than once when the commit hits contention. After
    /// commit, cached entries for every id written in this collection are
    /// invalidated. Use [`in_tx`](Self::in_tx) inside `work` for typed access.
    pub async fn run_transaction<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'c> FnMut(&'c mut TransactionContext) -> TxFuture<'c, T> + Send,
        T: Send,
    {
        let result = self.run_transaction_inner(work).await;
        self.inner.track("run_transaction", result)
    }

    async fn run_transaction_inner<T, F>(&self, work: F) -> AppResult<T>
    where
        F: for<'c> FnMut(&'c mut TransactionContext) -> TxFuture<'c, T> + Send,
        T: Send,
    {
        let outcome = self.inner.transactions.run(work).await?;
        let written: Vec<&DocumentId> = outcome
            .touched
            .iter()
            .filter(|(collection, _)| collection == E::COLLECTION)
            .map(|(_, id)| id)
            .collect();
        self.inner.stats.increment_writes(written.len() as u64);
        self.inner.cache.delete_many(written.iter().copied());
        Ok(outcome.value)
    }
}

/// Unique ids in first-occurrence order.
fn dedupe(ids: &[DocumentId]) -> Vec<DocumentId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}

/// Reject empty id lists and malformed ids, then de-duplicate.
fn validate_batch_ids(ids: &[DocumentId]) -> AppResult<Vec<DocumentId>> {
    if ids.is_empty() {
        return Err(AppError::validation("Batch id list is empty"));
    }
    for id in ids {
        DocumentId::parse(id.as_str())?;
    }
    Ok(dedupe(ids))
}
