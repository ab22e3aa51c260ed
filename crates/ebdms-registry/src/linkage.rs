//! Index Linkage Manager: binds committed index files to committed primary
//! files, at most one ACTIVE link per (primary, format).

use std::sync::Arc;

use ebdms_gate::Operation;
use ebdms_ledger::{AuditAction, SubjectType};
use ebdms_types::{ActorContext, FileId, FileKind, FileObject, IndexFormat, IndexLink};

use crate::engine::RegistrationEngine;
use crate::error::{RegistryError, RegistryResult};

pub struct IndexLinkManager {
    engine: Arc<RegistrationEngine>,
}

impl IndexLinkManager {
    pub fn new(engine: Arc<RegistrationEngine>) -> Self {
        Self { engine }
    }

    /// Link `index_id` to `primary_id`, tombstoning any ACTIVE link of the
    /// same format in the same catalog transaction.
    pub async fn attach_index(
        &self,
        ctx: &ActorContext,
        primary_id: &FileId,
        index_id: &FileId,
    ) -> RegistryResult<IndexLink> {
        let primary = match self.engine.file_by_id(primary_id).await {
            Ok(file) => file,
            Err(e) => {
                self.reject(ctx, primary_id, &e);
                return Err(e);
            }
        };
        self.engine.authorize(
            ctx,
            &primary.project_id,
            Operation::AttachIndex,
            &primary_id.to_string(),
        )?;
        self.attach_authorized(ctx, &primary, index_id).await
    }

    /// [`attach_index`](Self::attach_index) for a caller that has already
    /// passed the gate for `primary`.
    pub(crate) async fn attach_authorized(
        &self,
        ctx: &ActorContext,
        primary: &FileObject,
        index_id: &FileId,
    ) -> RegistryResult<IndexLink> {
        let result = self.link(ctx, primary, index_id).await;
        if let Err(e) = &result {
            self.reject(ctx, &primary.file_id, e);
        }
        result
    }

    async fn link(
        &self,
        ctx: &ActorContext,
        primary: &FileObject,
        index_id: &FileId,
    ) -> RegistryResult<IndexLink> {
        let index = self.engine.file_by_id(index_id).await?;
        let spec = check_pair(primary, &index)?;

        let candidate = IndexLink::new(primary.file_id, index.file_id, spec, ctx.actor_id.clone());
        let replacement = self
            .engine
            .catalog_call("catalog.replace_index_link", || {
                self.engine.catalog().replace_index_link(candidate.clone())
            })
            .await?;

        if replacement.active.link_id != candidate.link_id {
            tracing::debug!(primary_id = %primary.file_id, index_id = %index.file_id, "index already attached");
            return Ok(replacement.active);
        }

        if let Some(previous) = &replacement.replaced {
            self.engine.audit(
                &ctx.actor_id,
                AuditAction::IndexReplaced,
                SubjectType::IndexLink,
                previous.link_id,
                Some(format!(
                    "{} index {} superseded by {}",
                    previous.format, previous.index_id, index.file_id
                )),
            )?;
        }
        let active = replacement.active;
        self.engine.audit(
            &ctx.actor_id,
            AuditAction::IndexAttached,
            SubjectType::IndexLink,
            active.link_id,
            Some(format!(
                "{} index {} -> primary {}",
                active.format, active.index_id, active.primary_id
            )),
        )?;
        tracing::info!(
            primary_id = %active.primary_id,
            index_id = %active.index_id,
            format = %active.format,
            replaced = replacement.replaced.is_some(),
            "index attached"
        );
        Ok(active)
    }

    /// ACTIVE links whose primary is `primary_id`.
    pub async fn active_indexes(&self, primary_id: &FileId) -> RegistryResult<Vec<IndexLink>> {
        self.engine
            .catalog_call("catalog.active_links", || {
                self.engine.catalog().active_links(primary_id)
            })
            .await
    }

    pub(crate) fn reject(&self, ctx: &ActorContext, primary_id: &FileId, err: &RegistryError) {
        self.engine.audit_failure(
            &ctx.actor_id,
            AuditAction::IndexRejected,
            SubjectType::FileObject,
            primary_id,
            err,
        );
    }
}

/// Preconditions checked before the catalog transaction, which re-checks
/// them under its own lock.
fn check_pair(primary: &FileObject, index: &FileObject) -> RegistryResult<IndexFormat> {
    if !primary.file_kind.is_primary() {
        return Err(RegistryError::IncompatibleIndex(format!(
            "{} is an {} file and cannot be indexed",
            primary.file_id, primary.file_kind
        )));
    }
    if index.file_kind != FileKind::Index {
        return Err(RegistryError::IncompatibleIndex(format!(
            "{} is a {} file, not an index",
            index.file_id, index.file_kind
        )));
    }
    if !primary.is_committed() {
        return Err(RegistryError::PrimaryNotCommitted(primary.file_id.to_string()));
    }
    if !index.is_committed() {
        return Err(RegistryError::IndexNotCommitted(index.file_id.to_string()));
    }
    if primary.project_id != index.project_id {
        return Err(RegistryError::InvalidRequest(format!(
            "index {} belongs to project {}, primary to {}",
            index.file_id, index.project_id, primary.project_id
        )));
    }
    let spec = index.index_spec.as_ref().ok_or_else(|| {
        RegistryError::IncompatibleIndex(format!("index {} has no index spec", index.file_id))
    })?;
    if !spec.is_compatible_with(primary.file_kind) {
        return Err(RegistryError::IncompatibleIndex(format!(
            "{} index targets {} files, primary is {}",
            spec.format, spec.target, primary.file_kind
        )));
    }
    Ok(spec.format.clone())
}
