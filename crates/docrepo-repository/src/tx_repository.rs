//! Repository operations bound to a running transaction.

use serde::Serialize;
use tracing::debug;

use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::entity::Entity;
use docrepo_core::types::document::Document;
use docrepo_core::types::id::DocumentId;

use crate::codec::EntityCodec;
use crate::options::{CreateOptions, DeleteOptions, FindByIdOptions, FindOptions, UpdateOptions};
use crate::repository::{DeletePlan, DocumentRepository, RepositoryInner, UpdatePlan};
use crate::transaction::TransactionContext;

/// Typed access to one collection inside a transaction.
///
/// Reads go to the transaction, never to the cache, and only count as reads.
/// Writes are staged and take effect when the transaction commits; the
/// owning repository invalidates the cache for them afterwards.
pub struct TxRepository<'a, E: Entity> {
    repo: &'a DocumentRepository<E>,
    ctx: &'a mut TransactionContext,
}

impl<'a, E: Entity> TxRepository<'a, E> {
    pub(crate) fn new(repo: &'a DocumentRepository<E>, ctx: &'a mut TransactionContext) -> Self {
        Self { repo, ctx }
    }

    fn inner(&self) -> &RepositoryInner<E> {
        self.repo.inner()
    }

    /// Attempt number of the surrounding transaction.
    pub fn attempt(&self) -> u32 {
        self.ctx.attempt()
    }

    pub async fn find_by_id(&mut self, id: &DocumentId, opts: FindByIdOptions) -> AppResult<Option<E>> {
        let result = self.find_by_id_inner(id, opts).await;
        self.inner().track("tx_find_by_id", result)
    }

    async fn find_by_id_inner(&mut self, id: &DocumentId, opts: FindByIdOptions) -> AppResult<Option<E>> {
        self.inner().stats.increment_reads(1);
        let doc = self.ctx.get(E::COLLECTION, id).await?;
        let entity = match doc {
            Some(doc) => Some(self.inner().codec.decode(id, doc)?),
            None => None,
        };
        match entity.filter(|e| self.inner().visible(e, opts.include_deleted)) {
            Some(entity) => Ok(Some(entity)),
            None if opts.throw_if_not_found => Err(AppError::not_found(format!(
                "{}/{id} not found",
                E::COLLECTION
            ))),
            None => Ok(None),
        }
    }

    /// Query inside the transaction. Results never fill the cache.
    pub async fn find(&mut self, opts: FindOptions) -> AppResult<Vec<E>> {
        let result = self.find_inner(&opts).await;
        self.inner().track("tx_find", result)
    }

    async fn find_inner(&mut self, opts: &FindOptions) -> AppResult<Vec<E>> {
        let query = self.inner().build_query(opts);
        self.inner().stats.increment_reads(1);
        let rows = self.ctx.query(E::COLLECTION, &query).await?;
        self.inner().finish_find(rows, opts)
    }

    /// Stage a create and return the entity it will produce.
    pub async fn create<D: Serialize + ?Sized>(&mut self, data: &D, opts: CreateOptions) -> AppResult<E> {
        let result = self.create_inner(data, &opts).await;
        self.inner().track("tx_create", result)
    }

    async fn create_inner<D: Serialize + ?Sized>(&mut self, data: &D, opts: &CreateOptions) -> AppResult<E> {
        let now = self.inner().now().await?;
        let (id, document, entity) = self.inner().prepare_create(data, opts, now)?;
        self.ctx.set(E::COLLECTION, &id, document);
        Ok(entity)
    }

    /// Stage an update. `expected_version` is checked against the
    /// transaction's read of the entity.
    pub async fn update<D: Serialize + ?Sized>(
        &mut self,
        id: &DocumentId,
        changes: &D,
        opts: UpdateOptions,
    ) -> AppResult<E> {
        let result = match EntityCodec::<E>::to_document(changes) {
            Ok(changes) => self.update_document(id, changes, &opts).await,
            Err(e) => Err(e),
        };
        self.inner().track("tx_update", result)
    }

    pub(crate) async fn update_document(
        &mut self,
        id: &DocumentId,
        changes: Document,
        opts: &UpdateOptions,
    ) -> AppResult<E> {
        self.inner().stats.increment_reads(1);
        let existing = self.ctx.get(E::COLLECTION, id).await?;
        let now = self.inner().now().await?;
        match self.inner().plan_update(id, existing, changes, opts, now)? {
            UpdatePlan::Unchanged(entity) => Ok(entity),
            UpdatePlan::Write { patch, entity } => {
                self.ctx.update(E::COLLECTION, id, patch);
                debug!(collection = E::COLLECTION, id = %id, version = entity.version(), "Update staged");
                Ok(entity)
            }
        }
    }

    /// Stage a soft or hard delete.
    pub async fn delete(&mut self, id: &DocumentId, opts: DeleteOptions) -> AppResult<()> {
        let result = self.delete_inner(id, opts).await;
        self.inner().track("tx_delete", result)
    }

    async fn delete_inner(&mut self, id: &DocumentId, opts: DeleteOptions) -> AppResult<()> {
        self.inner().stats.increment_reads(1);
        let existing = self.ctx.get(E::COLLECTION, id).await?;
        let now = self.inner().now().await?;
        match self.inner().plan_delete(id, existing, &opts, now)? {
            DeletePlan::Soft(patch) => self.ctx.update(E::COLLECTION, id, patch),
            DeletePlan::Hard => self.ctx.delete(E::COLLECTION, id),
        }
        Ok(())
    }
}
