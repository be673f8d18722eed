//! Record engine use-cases.
//!
//! # Responsibility
//! - CRUD over records validated against their module schema.
//! - Parent/child linkage between a module and its sub-modules.
//! - Field-level diffs written to the audit trail with every update.
//!
//! # Invariants
//! - Every operation is authorized against the record's module first.
//! - A record mutation and its history entries commit together or not at all.
//! - Unknown data keys are rejected; required fields must be present.
//! - View markers, notifications and file cleanup are best-effort.

use crate::model::field::{Field, FieldType};
use crate::model::history::{HistoryAction, NewHistoryEntry};
use crate::model::module::Module;
use crate::model::principal::{AccessOperation, Principal, UserId};
use crate::model::record::{
    ChildrenCount, DeletedRecord, NewRecord, Record, RecordDeleteMode, RecordDetail, RecordId,
    RecordSummary, RecordUpdate,
};
use crate::model::value::{coerce_value, stringify_optional, RecordData};
use crate::notify::{NotificationHub, RecordEvent, RecordEventType};
use crate::repo::record_repo::{RecordChange, RecordListQuery, RecordRow};
use crate::repo::Store;
use crate::service::access_service::AccessService;
use crate::service::permission_cache::PermissionCache;
use crate::service::{require_principal, Outcome, ServiceError, ServiceResult};
use crate::storage::FileStore;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

const NAME_LABEL: &str = "Name";
const STATUS_LABEL: &str = "Status";
const ASSIGNED_TO_LABEL: &str = "Assigned To";
const NO_CHANGES_DESCRIPTION: &str = "no field changes";

pub struct RecordService<'a, S: ?Sized> {
    store: &'a S,
    cache: &'a PermissionCache,
    hub: &'a NotificationHub,
    files: &'a dyn FileStore,
}

impl<'a, S> RecordService<'a, S>
where
    S: Store + ?Sized,
{
    pub fn new(
        store: &'a S,
        cache: &'a PermissionCache,
        hub: &'a NotificationHub,
        files: &'a dyn FileStore,
    ) -> Self {
        Self {
            store,
            cache,
            hub,
            files,
        }
    }

    /// Lists a module's records, newest first, with per-principal view flags.
    pub fn list(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        query: &RecordListQuery,
    ) -> ServiceResult<Vec<RecordSummary>> {
        let module = self.access().authorize(principal, module_name, AccessOperation::View)?;
        let principal = require_principal(principal)?;
        Ok(self.store.list_records(module.id, principal.id, query)?)
    }

    /// Loads one record with its ordered images and marks it viewed.
    pub fn get(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        id: RecordId,
    ) -> ServiceResult<Outcome<RecordDetail>> {
        let module = self.access().authorize(principal, module_name, AccessOperation::View)?;
        let principal = require_principal(principal)?;
        let record = self.load_record(&module, id)?;
        let images = self.store.list_images(record.id)?;

        let mut partial_failures = Vec::new();
        if let Err(err) = self.store.mark_viewed(record.id, principal.id) {
            log::warn!(
                "event=record_view_mark module=records status=error record_id={} user_id={} error={}",
                record.id,
                principal.id,
                err
            );
            partial_failures.push(format!("view marker: {err}"));
        }

        Ok(Outcome {
            value: RecordDetail { record, images },
            partial_failures,
        })
    }

    pub fn create(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        input: &NewRecord,
    ) -> ServiceResult<Outcome<Record>> {
        let module = self.access().authorize(principal, module_name, AccessOperation::Edit)?;
        let principal = require_principal(principal)?;
        let name = require_name(&input.name)?;
        let fields = self.store.list_fields(module.id)?;
        let data = self.build_data(&fields, &input.data, None)?;
        if let Some(parent_id) = input.parent_record_id {
            self.check_parent(&module, parent_id)?;
        }

        let created_by = input.created_by.unwrap_or(principal.id);
        let row = RecordRow {
            module_id: module.id,
            name: name.clone(),
            status: module.config.resolve_status(input.status.as_deref()),
            data,
            parent_record_id: input.parent_record_id,
            assigned_to: input.assigned_to,
            created_by: Some(created_by),
        };
        let created = NewHistoryEntry::new(
            HistoryAction::Created,
            format!("{} \"{name}\" created", module.display_name),
            Some(created_by),
        );
        let record = self.store.insert_record(&row, &created)?;
        log::info!(
            "event=record_create module=records status=ok record_id={} target={} user_id={}",
            record.id,
            module.name,
            principal.id
        );

        let partial_failures = self.publish(RecordEventType::Created, &module, record.id);
        Ok(Outcome {
            value: record,
            partial_failures,
        })
    }

    /// Applies a partial update and records one history entry per change.
    pub fn update(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        id: RecordId,
        update: &RecordUpdate,
    ) -> ServiceResult<Outcome<Record>> {
        let module = self.access().authorize(principal, module_name, AccessOperation::Edit)?;
        let principal = require_principal(principal)?;
        let current = self.load_record(&module, id)?;
        if let Some(expected) = update.expected_version {
            if expected != current.version {
                return Err(ServiceError::Conflict(format!(
                    "record {id} is at version {}, expected {expected}",
                    current.version
                )));
            }
        }

        let fields = self.store.list_fields(module.id)?;
        let name = match update.name.as_deref() {
            Some(value) => require_name(value)?,
            None => current.name.clone(),
        };
        let data = match &update.data {
            Some(raw) => self.build_data(&fields, raw, Some(&current.data))?,
            None => current.data.clone(),
        };
        let status = match update.status.as_deref() {
            Some(value) => module.config.resolve_status(Some(value)),
            None => current.status.clone(),
        };
        let updated_by = update.updated_by.unwrap_or(principal.id);
        let change = RecordChange {
            name,
            status,
            data,
            assigned_to: update.assigned_to.unwrap_or(current.assigned_to),
            updated_by: Some(updated_by),
        };

        let entries = diff_changes(&fields, &current, &change, Some(updated_by));
        let record = self
            .store
            .update_record(id, &change, update.expected_version, &entries)?;
        log::info!(
            "event=record_update module=records status=ok record_id={} target={} changes={} version={}",
            record.id,
            module.name,
            entries
                .iter()
                .filter(|entry| entry.action == HistoryAction::FieldUpdated)
                .count(),
            record.version
        );

        let partial_failures = self.publish(RecordEventType::Updated, &module, record.id);
        Ok(Outcome {
            value: record,
            partial_failures,
        })
    }

    /// Deletes a record according to `mode`, then removes its files.
    pub fn delete(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        id: RecordId,
        mode: RecordDeleteMode,
    ) -> ServiceResult<Outcome<DeletedRecord>> {
        let module = self
            .access()
            .authorize(principal, module_name, AccessOperation::Delete)?;
        self.load_record(&module, id)?;
        if mode == RecordDeleteMode::Cascade {
            self.authorize_subtree_delete(require_principal(principal)?, &module, id)?;
        }

        let removal = self.store.delete_record(id, mode)?;
        let mut partial_failures = Vec::new();
        for path in &removal.file_paths {
            if let Err(err) = self.files.delete(path) {
                log::warn!(
                    "event=record_file_cleanup module=records status=error record_id={} path={} error={}",
                    id,
                    path,
                    err
                );
                partial_failures.push(format!("orphaned file {path}: {err}"));
            }
        }
        log::info!(
            "event=record_delete module=records status=ok record_id={} target={} mode={:?} deleted={} orphaned={}",
            id,
            module.name,
            mode,
            removal.deleted.deleted_record_ids.len(),
            removal.deleted.orphaned_child_ids.len()
        );

        Ok(Outcome {
            value: removal.deleted,
            partial_failures,
        })
    }

    /// A cascade needs Delete on every module the subtree touches.
    fn authorize_subtree_delete(
        &self,
        principal: &Principal,
        root: &Module,
        id: RecordId,
    ) -> ServiceResult<()> {
        for module_id in self.store.subtree_module_ids(id)? {
            if module_id == root.id {
                continue;
            }
            let module = self
                .store
                .find_module(module_id)?
                .ok_or_else(|| ServiceError::not_found("module", module_id))?;
            self.access()
                .authorize_module(principal, &module, AccessOperation::Delete)?;
        }
        Ok(())
    }

    /// Children of `parent_id` that belong to `sub_module_name`.
    pub fn get_children(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        parent_id: RecordId,
        sub_module_name: &str,
    ) -> ServiceResult<Vec<Record>> {
        let access = self.access();
        let module = access.authorize(principal, module_name, AccessOperation::View)?;
        let sub_module = access.authorize(principal, sub_module_name, AccessOperation::View)?;
        if sub_module.parent_module_id != Some(module.id) {
            return Err(ServiceError::Validation(format!(
                "`{}` is not a sub-module of `{}`",
                sub_module.name, module.name
            )));
        }
        self.load_record(&module, parent_id)?;
        Ok(self.store.list_children(parent_id, sub_module.id)?)
    }

    /// Advisory child summary, typically shown before deleting a parent.
    pub fn get_children_count(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        parent_id: RecordId,
    ) -> ServiceResult<ChildrenCount> {
        let module = self.access().authorize(principal, module_name, AccessOperation::View)?;
        self.load_record(&module, parent_id)?;
        Ok(self.store.count_children(parent_id)?)
    }

    fn access(&self) -> AccessService<'a, S> {
        AccessService::new(self.store, self.cache)
    }

    fn load_record(&self, module: &Module, id: RecordId) -> ServiceResult<Record> {
        self.store
            .find_record(id)?
            .filter(|record| record.module_id == module.id)
            .ok_or_else(|| ServiceError::not_found(&format!("{} record", module.name), id))
    }

    fn check_parent(&self, module: &Module, parent_id: RecordId) -> ServiceResult<()> {
        let parent_module_id = module.parent_module_id.ok_or_else(|| {
            ServiceError::Validation(format!(
                "module `{}` is not a sub-module and cannot have parent records",
                module.name
            ))
        })?;
        let parent = self
            .store
            .find_record(parent_id)?
            .ok_or_else(|| ServiceError::Validation(format!("parent record {parent_id} does not exist")))?;
        if parent.module_id != parent_module_id {
            return Err(ServiceError::Validation(format!(
                "record {parent_id} does not belong to the parent module of `{}`",
                module.name
            )));
        }
        Ok(())
    }

    /// Coerces raw input against `fields`, rejecting unknown keys.
    ///
    /// On create (`base` is `None`) missing fields take their defaults. On
    /// update, keys absent from `raw` keep their stored value and `null`
    /// clears one.
    fn build_data(
        &self,
        fields: &[Field],
        raw: &Map<String, JsonValue>,
        base: Option<&RecordData>,
    ) -> ServiceResult<RecordData> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| !fields.iter().any(|field| &field.name == *key))
        {
            return Err(ServiceError::Validation(format!("unknown field `{unknown}`")));
        }

        let mut data = base.cloned().unwrap_or_default();
        for field in fields {
            let value = match (raw.get(&field.name), base) {
                (Some(input), _) => coerce_value(field, input),
                (None, Some(stored)) => Ok(stored.get(&field.name).cloned()),
                (None, None) => match field.default_value.as_deref() {
                    Some(default) => coerce_value(field, &JsonValue::String(default.to_string())),
                    None => Ok(None),
                },
            }
            .map_err(|err| ServiceError::Validation(err.to_string()))?;

            match value {
                Some(value) => {
                    data.insert(field.name.clone(), value);
                }
                None if field.is_required => {
                    return Err(ServiceError::Validation(format!(
                        "field `{}` is required",
                        field.name
                    )));
                }
                None => {
                    data.remove(&field.name);
                }
            }
        }

        let touched: Vec<&Field> = fields
            .iter()
            .filter(|field| base.is_none() || raw.contains_key(&field.name))
            .collect();
        self.check_relations(&touched, &data)?;
        Ok(data)
    }

    fn check_relations(&self, fields: &[&Field], data: &RecordData) -> ServiceResult<()> {
        for field in fields.iter().filter(|field| field.field_type == FieldType::Relation) {
            let Some(target_id) = data.get(&field.name).and_then(|value| value.relation_target())
            else {
                continue;
            };
            let target_module = field.relation_module.as_deref().unwrap_or_default();
            let expected = self.store.find_module_by_name(target_module)?;
            let target = self.store.find_record(target_id)?;
            let matches = match (expected, target) {
                (Some(module), Some(record)) => record.module_id == module.id,
                _ => false,
            };
            if !matches {
                return Err(ServiceError::Validation(format!(
                    "field `{}`: record {target_id} does not exist in module `{target_module}`",
                    field.name
                )));
            }
        }
        Ok(())
    }

    fn publish(&self, event_type: RecordEventType, module: &Module, record_id: RecordId) -> Vec<String> {
        self.hub
            .publish(&RecordEvent::now(event_type, module.name.clone(), record_id))
            .into_iter()
            .map(|failure| format!("notification {failure}"))
            .collect()
    }
}

/// Diffs a stored record against its pending change.
///
/// Built-in columns come first (`Name`, `Status`, `Assigned To`), then every
/// key of the old and new data maps in key order. No change yields a single
/// `updated` entry.
pub fn diff_changes(
    fields: &[Field],
    before: &Record,
    after: &RecordChange,
    by: Option<UserId>,
) -> Vec<NewHistoryEntry> {
    let mut entries = Vec::new();
    let mut push = |key: &str, label: &str, old: String, new: String| {
        if old != new {
            entries.push(NewHistoryEntry::field_change(key, label, old, new, by));
        }
    };

    push("name", NAME_LABEL, before.name.clone(), after.name.clone());
    push("status", STATUS_LABEL, before.status.clone(), after.status.clone());
    push(
        "assigned_to",
        ASSIGNED_TO_LABEL,
        stringify_user(before.assigned_to),
        stringify_user(after.assigned_to),
    );

    let labels: BTreeMap<&str, &str> = fields
        .iter()
        .map(|field| (field.name.as_str(), field.display_name.as_str()))
        .collect();
    let keys: BTreeSet<&String> = before.data.keys().chain(after.data.keys()).collect();
    for key in keys {
        let label = labels.get(key.as_str()).copied().unwrap_or(key.as_str());
        push(
            key.as_str(),
            label,
            stringify_optional(before.data.get(key)),
            stringify_optional(after.data.get(key)),
        );
    }

    if entries.is_empty() {
        entries.push(NewHistoryEntry::new(
            HistoryAction::Updated,
            NO_CHANGES_DESCRIPTION,
            by,
        ));
    }
    entries
}

fn stringify_user(user: Option<UserId>) -> String {
    user.map(|id| id.to_string()).unwrap_or_default()
}

fn require_name(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(
            "record name must not be blank".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
