//! Audit trail use-cases.
//!
//! # Invariants
//! - Entries are append-only; there is no edit or delete entry point.
//! - History is listed newest first.

use crate::model::history::{HistoryAction, HistoryEntry, NewHistoryEntry};
use crate::model::module::Module;
use crate::model::principal::{AccessOperation, Principal};
use crate::model::record::{Record, RecordId};
use crate::repo::Store;
use crate::service::access_service::AccessService;
use crate::service::permission_cache::PermissionCache;
use crate::service::{require_principal, ServiceError, ServiceResult};

const NOTE_MAX_CHARS: usize = 4000;

pub struct AuditService<'a, S: ?Sized> {
    store: &'a S,
    cache: &'a PermissionCache,
}

impl<'a, S> AuditService<'a, S>
where
    S: Store + ?Sized,
{
    pub fn new(store: &'a S, cache: &'a PermissionCache) -> Self {
        Self { store, cache }
    }

    pub fn list_history(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
    ) -> ServiceResult<Vec<HistoryEntry>> {
        let record = self.load(principal, module_name, record_id, AccessOperation::View)?.1;
        Ok(self.store.list_history(record.id)?)
    }

    /// Appends a free-text `note` entry.
    pub fn add_note(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        description: &str,
    ) -> ServiceResult<HistoryEntry> {
        let (_, record) = self.load(principal, module_name, record_id, AccessOperation::Edit)?;
        let principal = require_principal(principal)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(ServiceError::Validation("note must not be blank".to_string()));
        }
        let len = description.chars().count();
        if len > NOTE_MAX_CHARS {
            return Err(ServiceError::Validation(format!(
                "note is {len} characters; maximum is {NOTE_MAX_CHARS}"
            )));
        }

        let entry = self.store.append_history(
            record.id,
            &NewHistoryEntry::new(HistoryAction::Note, description, Some(principal.id)),
        )?;
        log::info!(
            "event=history_note module=audit status=ok record_id={} entry_id={}",
            record.id,
            entry.id
        );
        Ok(entry)
    }

    fn load(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        operation: AccessOperation,
    ) -> ServiceResult<(Module, Record)> {
        let module = AccessService::new(self.store, self.cache).authorize(
            principal,
            module_name,
            operation,
        )?;
        let record = self
            .store
            .find_record(record_id)?
            .filter(|record| record.module_id == module.id)
            .ok_or_else(|| ServiceError::not_found(&format!("{} record", module.name), record_id))?;
        Ok((module, record))
    }
}
