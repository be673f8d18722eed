//! Schema store use-cases: modules and their fields.
//!
//! # Responsibility
//! - Serve module/field definitions to the record engine and outer layers.
//! - Gate every schema mutation on the administrator role.
//!
//! # Invariants
//! - Module names are immutable; field names are immutable.
//! - The parent chain of a module never loops back to itself.
//! - A module with records, sub-modules or inbound relation fields cannot
//!   be deleted.
//! - Every mutation clears the permission cache.

use crate::model::field::{Field, FieldDefinition, FieldId, FieldType};
use crate::model::module::{validate_slug, Module, ModuleId, ModuleUpdate, NewModule};
use crate::model::principal::Principal;
use crate::model::value::coerce_value;
use crate::repo::schema_repo::{ModuleRow, SchemaRepository};
use crate::service::permission_cache::PermissionCache;
use crate::service::{require_admin, ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Module with its ordered fields and direct sub-modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSchema {
    pub module: Module,
    pub fields: Vec<Field>,
    pub sub_modules: Vec<Module>,
}

pub struct SchemaService<'a, S: ?Sized> {
    store: &'a S,
    cache: &'a PermissionCache,
}

impl<'a, S> SchemaService<'a, S>
where
    S: SchemaRepository + ?Sized,
{
    pub fn new(store: &'a S, cache: &'a PermissionCache) -> Self {
        Self { store, cache }
    }

    pub fn get_module(&self, name: &str) -> ServiceResult<Module> {
        self.store
            .find_module_by_name(name.trim())?
            .ok_or_else(|| ServiceError::not_found("module", name.trim()))
    }

    pub fn get_module_by_id(&self, id: ModuleId) -> ServiceResult<Module> {
        self.store
            .find_module(id)?
            .ok_or_else(|| ServiceError::not_found("module", id))
    }

    /// All modules ordered by display name.
    pub fn list_modules(&self) -> ServiceResult<Vec<Module>> {
        Ok(self.store.list_modules()?)
    }

    /// Fields in render order: `weight`, `sort_order`, `id`.
    pub fn get_fields(&self, module_id: ModuleId) -> ServiceResult<Vec<Field>> {
        Ok(self.store.list_fields(module_id)?)
    }

    pub fn get_sub_modules(&self, parent_module_id: ModuleId) -> ServiceResult<Vec<Module>> {
        Ok(self.store.list_sub_modules(parent_module_id)?)
    }

    pub fn describe_module(&self, name: &str) -> ServiceResult<ModuleSchema> {
        let module = self.get_module(name)?;
        let fields = self.store.list_fields(module.id)?;
        let sub_modules = self.store.list_sub_modules(module.id)?;
        Ok(ModuleSchema {
            module,
            fields,
            sub_modules,
        })
    }

    pub fn create_module(
        &self,
        principal: Option<&Principal>,
        input: &NewModule,
    ) -> ServiceResult<Module> {
        require_admin(principal)?;
        let name = input.name.trim();
        validate_slug(name).map_err(|err| ServiceError::Validation(err.to_string()))?;
        let display_name = require_display_name(&input.display_name)?;
        if self.store.find_module_by_name(name)?.is_some() {
            return Err(ServiceError::Validation(format!(
                "module `{name}` already exists"
            )));
        }
        let parent_module_id = match input.parent_module.as_deref() {
            Some(parent) => Some(self.resolve_parent(parent)?.id),
            None => None,
        };

        let module = self.store.insert_module(&ModuleRow {
            name: name.to_string(),
            display_name,
            description: input.description.trim().to_string(),
            config: input.config.clone(),
            parent_module_id,
        })?;
        self.cache.clear();
        log::info!(
            "event=module_create module=schema status=ok module_id={} name={}",
            module.id,
            module.name
        );
        Ok(module)
    }

    pub fn update_module(
        &self,
        principal: Option<&Principal>,
        name: &str,
        update: &ModuleUpdate,
    ) -> ServiceResult<Module> {
        require_admin(principal)?;
        let current = self.get_module(name)?;

        let display_name = match update.display_name.as_deref() {
            Some(value) => require_display_name(value)?,
            None => current.display_name.clone(),
        };
        let parent_module_id = match &update.parent_module {
            None => current.parent_module_id,
            Some(None) => None,
            Some(Some(parent)) => {
                let parent = self.resolve_parent(parent)?;
                self.ensure_no_parent_cycle(current.id, parent.id)?;
                Some(parent.id)
            }
        };
        if parent_module_id != current.parent_module_id {
            let parented = self.store.count_parented_records(current.id)?;
            if parented > 0 {
                return Err(ServiceError::Validation(format!(
                    "module `{}` has {parented} record(s) linked to parent records; \
                     their parent module cannot change",
                    current.name
                )));
            }
        }

        let module = self.store.update_module(
            current.id,
            &ModuleRow {
                name: current.name.clone(),
                display_name,
                description: update
                    .description
                    .as_deref()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_else(|| current.description.clone()),
                config: update.config.clone().unwrap_or_else(|| current.config.clone()),
                parent_module_id,
            },
        )?;
        self.cache.clear();
        log::info!(
            "event=module_update module=schema status=ok module_id={}",
            module.id
        );
        Ok(module)
    }

    /// Deletes a module that has no records, sub-modules or inbound relations.
    pub fn delete_module(&self, principal: Option<&Principal>, name: &str) -> ServiceResult<()> {
        require_admin(principal)?;
        let module = self.get_module(name)?;

        let record_count = self.store.count_module_records(module.id)?;
        if record_count > 0 {
            return Err(ServiceError::Validation(format!(
                "module `{}` still has {record_count} record(s)",
                module.name
            )));
        }
        let sub_modules = self.store.list_sub_modules(module.id)?;
        if !sub_modules.is_empty() {
            return Err(ServiceError::Validation(format!(
                "module `{}` still has {} sub-module(s)",
                module.name,
                sub_modules.len()
            )));
        }
        if let Some(source) = self.find_inbound_relation(&module.name)? {
            return Err(ServiceError::Validation(format!(
                "module `{}` is the relation target of `{source}`",
                module.name
            )));
        }

        self.store.delete_module(module.id)?;
        self.cache.clear();
        log::info!(
            "event=module_delete module=schema status=ok module_id={} name={}",
            module.id,
            module.name
        );
        Ok(())
    }

    pub fn create_field(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        def: &FieldDefinition,
    ) -> ServiceResult<Field> {
        require_admin(principal)?;
        let module = self.get_module(module_name)?;
        let def = normalize_definition(def);
        self.validate_definition(module.id, &def)?;
        if self
            .store
            .list_fields(module.id)?
            .iter()
            .any(|field| field.name == def.name)
        {
            return Err(ServiceError::Validation(format!(
                "field `{}` already exists in module `{}`",
                def.name, module.name
            )));
        }

        let field = self.store.insert_field(module.id, &def)?;
        self.cache.clear();
        log::info!(
            "event=field_create module=schema status=ok field_id={} module_id={} type={}",
            field.id,
            module.id,
            field.field_type.as_str()
        );
        Ok(field)
    }

    /// Rewrites a field definition. The field name cannot change.
    pub fn update_field(
        &self,
        principal: Option<&Principal>,
        field_id: FieldId,
        def: &FieldDefinition,
    ) -> ServiceResult<Field> {
        require_admin(principal)?;
        let current = self
            .store
            .find_field(field_id)?
            .ok_or_else(|| ServiceError::not_found("field", field_id))?;
        let def = normalize_definition(def);
        if def.name != current.name {
            return Err(ServiceError::Validation(format!(
                "field name `{}` is immutable",
                current.name
            )));
        }
        self.validate_definition(current.module_id, &def)?;

        let field = self.store.update_field(field_id, &def)?;
        self.cache.clear();
        log::info!("event=field_update module=schema status=ok field_id={field_id}");
        Ok(field)
    }

    pub fn delete_field(&self, principal: Option<&Principal>, field_id: FieldId) -> ServiceResult<()> {
        require_admin(principal)?;
        self.store.delete_field(field_id)?;
        self.cache.clear();
        log::info!("event=field_delete module=schema status=ok field_id={field_id}");
        Ok(())
    }

    fn resolve_parent(&self, parent: &str) -> ServiceResult<Module> {
        self.store
            .find_module_by_name(parent.trim())?
            .ok_or_else(|| {
                ServiceError::Validation(format!("parent module `{}` does not exist", parent.trim()))
            })
    }

    fn ensure_no_parent_cycle(&self, module_id: ModuleId, parent_id: ModuleId) -> ServiceResult<()> {
        let mut cursor = Some(parent_id);
        while let Some(current) = cursor {
            if current == module_id {
                return Err(ServiceError::Validation(
                    "a module cannot be its own ancestor".to_string(),
                ));
            }
            cursor = self
                .store
                .find_module(current)?
                .and_then(|module| module.parent_module_id);
        }
        Ok(())
    }

    fn validate_definition(&self, module_id: ModuleId, def: &FieldDefinition) -> ServiceResult<()> {
        def.validate()
            .map_err(|err| ServiceError::Validation(err.to_string()))?;

        if let Some(target) = def.relation_module.as_deref() {
            if self.store.find_module_by_name(target)?.is_none() {
                return Err(ServiceError::Validation(format!(
                    "relation module `{target}` does not exist"
                )));
            }
        }

        if let Some(default) = def.default_value.as_deref() {
            let candidate = field_from_definition(module_id, def);
            coerce_value(&candidate, &JsonValue::String(default.to_string()))
                .map_err(|err| ServiceError::Validation(format!("default value: {err}")))?;
        }
        Ok(())
    }

    fn find_inbound_relation(&self, target: &str) -> ServiceResult<Option<String>> {
        for module in self.store.list_modules()? {
            for field in self.store.list_fields(module.id)? {
                if field.field_type == FieldType::Relation
                    && field.relation_module.as_deref() == Some(target)
                {
                    return Ok(Some(format!("{}.{}", module.name, field.name)));
                }
            }
        }
        Ok(None)
    }
}

fn require_display_name(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(
            "display name must not be blank".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_definition(def: &FieldDefinition) -> FieldDefinition {
    let mut def = def.clone();
    def.name = def.name.trim().to_string();
    def.display_name = def.display_name.trim().to_string();
    def.options = def
        .options
        .iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty())
        .collect();
    def.relation_module = def
        .relation_module
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    def.default_value = def
        .default_value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    def
}

fn field_from_definition(module_id: ModuleId, def: &FieldDefinition) -> Field {
    Field {
        id: 0,
        module_id,
        name: def.name.clone(),
        display_name: def.display_name.clone(),
        field_type: def.field_type,
        options: def.options.clone(),
        relation_module: def.relation_module.clone(),
        is_required: def.is_required,
        show_in_list: def.show_in_list,
        weight: def.weight,
        sort_order: def.sort_order,
        default_value: def.default_value.clone(),
        warning_yellow_days: def.warning_yellow_days,
        warning_red_days: def.warning_red_days,
        warning_mode: def.warning_mode,
    }
}
