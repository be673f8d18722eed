//! Access control evaluation and administration.
//!
//! # Responsibility
//! - Decide whether a principal may view, edit or delete within a module.
//! - Administer users, groups and per-user permission overrides.
//!
//! # Invariants
//! - Evaluation order: missing principal, missing module, admin role,
//!   explicit permission row, group grant, deny.
//! - An explicit `none` row denies even when a group grants the module.
//! - Every group or permission mutation clears the permission cache.

use crate::model::module::{Module, ModuleId};
use crate::model::principal::{
    AccessOperation, GroupId, ModuleAccess, PermissionLevel, Principal, User, UserGroup, UserId,
};
use crate::repo::access_repo::AccessRepository;
use crate::repo::schema_repo::SchemaRepository;
use crate::service::permission_cache::PermissionCache;
use crate::service::{require_admin, require_principal, ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Menu entries a principal may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "items", rename_all = "snake_case")]
pub enum MenuItems {
    /// Administrators see every entry.
    All,
    Only(Vec<String>),
}

impl MenuItems {
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(items) => items.iter().any(|item| item == key),
        }
    }
}

pub struct AccessService<'a, S: ?Sized> {
    store: &'a S,
    cache: &'a PermissionCache,
}

impl<'a, S> AccessService<'a, S>
where
    S: AccessRepository + SchemaRepository + ?Sized,
{
    pub fn new(store: &'a S, cache: &'a PermissionCache) -> Self {
        Self { store, cache }
    }

    /// Evaluates the principal's rights on `module_name` without denying.
    pub fn evaluate(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
    ) -> ServiceResult<ModuleAccess> {
        let principal = require_principal(principal)?;
        let module = self.load_module(module_name)?;
        self.access_for(principal, &module)
    }

    /// Checks `operation` and returns the module on success.
    pub fn authorize(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        operation: AccessOperation,
    ) -> ServiceResult<Module> {
        let principal = require_principal(principal)?;
        let module = self.load_module(module_name)?;
        self.authorize_module(principal, &module, operation)?;
        Ok(module)
    }

    /// Same as [`AccessService::authorize`] for an already loaded module.
    pub fn authorize_module(
        &self,
        principal: &Principal,
        module: &Module,
        operation: AccessOperation,
    ) -> ServiceResult<()> {
        let access = self.access_for(principal, module)?;
        if access.allows(operation) {
            return Ok(());
        }
        log::info!(
            "event=access_check module=access status=denied user_id={} target={} operation={}",
            principal.id,
            module.name,
            operation.as_str()
        );
        Err(ServiceError::Forbidden(format!(
            "no {} access to module `{}`",
            operation.as_str(),
            module.name
        )))
    }

    /// Modules the principal may view; administrators see all of them.
    pub fn accessible_modules(&self, principal: Option<&Principal>) -> ServiceResult<Vec<Module>> {
        let principal = require_principal(principal)?;
        if principal.is_admin() {
            return Ok(self.store.list_modules()?);
        }
        Ok(self.store.visible_modules(principal.id)?)
    }

    pub fn accessible_menu_items(&self, principal: Option<&Principal>) -> ServiceResult<MenuItems> {
        let principal = require_principal(principal)?;
        if principal.is_admin() {
            return Ok(MenuItems::All);
        }
        Ok(MenuItems::Only(self.store.menu_items_for(principal.id)?))
    }

    /// Drops cached decisions for one principal (login, logout, identity change).
    pub fn invalidate_principal(&self, user_id: UserId) {
        self.cache.invalidate_principal(user_id);
    }

    pub fn upsert_user(&self, principal: Option<&Principal>, user: &User) -> ServiceResult<User> {
        require_admin(principal)?;
        if user.email.trim().is_empty() {
            return Err(ServiceError::Validation("user email must not be blank".to_string()));
        }
        let stored = self.store.upsert_user(user)?;
        self.cache.invalidate_principal(stored.id);
        log::info!(
            "event=user_upsert module=access status=ok user_id={} role={}",
            stored.id,
            stored.role.as_str()
        );
        Ok(stored)
    }

    pub fn list_groups(&self, principal: Option<&Principal>) -> ServiceResult<Vec<UserGroup>> {
        require_admin(principal)?;
        Ok(self.store.list_groups()?)
    }

    pub fn create_group(
        &self,
        principal: Option<&Principal>,
        name: &str,
        description: &str,
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("group name must not be blank".to_string()));
        }
        let group = self.store.create_group(name, description)?;
        self.cache.clear();
        log::info!(
            "event=group_create module=access status=ok group_id={}",
            group.id
        );
        Ok(group)
    }

    pub fn delete_group(&self, principal: Option<&Principal>, group_id: GroupId) -> ServiceResult<()> {
        require_admin(principal)?;
        self.store.delete_group(group_id)?;
        self.cache.clear();
        log::info!("event=group_delete module=access status=ok group_id={group_id}");
        Ok(())
    }

    pub fn add_group_member(
        &self,
        principal: Option<&Principal>,
        group_id: GroupId,
        user_id: UserId,
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        self.require_group(group_id)?;
        if self.store.find_user(user_id)?.is_none() {
            return Err(ServiceError::not_found("user", user_id));
        }
        self.store.add_group_member(group_id, user_id)?;
        self.cache.clear();
        self.require_group(group_id)
    }

    pub fn remove_group_member(
        &self,
        principal: Option<&Principal>,
        group_id: GroupId,
        user_id: UserId,
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        self.require_group(group_id)?;
        self.store.remove_group_member(group_id, user_id)?;
        self.cache.clear();
        self.require_group(group_id)
    }

    pub fn grant_group_module(
        &self,
        principal: Option<&Principal>,
        group_id: GroupId,
        module_name: &str,
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        self.require_group(group_id)?;
        let module = self.load_module(module_name)?;
        self.store.grant_group_module(group_id, module.id)?;
        self.cache.clear();
        self.require_group(group_id)
    }

    pub fn revoke_group_module(
        &self,
        principal: Option<&Principal>,
        group_id: GroupId,
        module_name: &str,
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        self.require_group(group_id)?;
        let module = self.load_module(module_name)?;
        self.store.revoke_group_module(group_id, module.id)?;
        self.cache.clear();
        self.require_group(group_id)
    }

    pub fn set_group_menu_items(
        &self,
        principal: Option<&Principal>,
        group_id: GroupId,
        items: &[String],
    ) -> ServiceResult<UserGroup> {
        require_admin(principal)?;
        self.require_group(group_id)?;
        self.store.set_group_menu_items(group_id, items)?;
        self.cache.clear();
        self.require_group(group_id)
    }

    /// Sets or, with `None`, removes a per-user override.
    pub fn set_module_permission(
        &self,
        principal: Option<&Principal>,
        user_id: UserId,
        module_name: &str,
        level: Option<PermissionLevel>,
    ) -> ServiceResult<()> {
        require_admin(principal)?;
        let module = self.load_module(module_name)?;
        self.store.set_module_permission(user_id, module.id, level)?;
        self.cache.clear();
        log::info!(
            "event=permission_set module=access status=ok user_id={} target={} level={}",
            user_id,
            module.name,
            level.map(PermissionLevel::as_str).unwrap_or("inherit")
        );
        Ok(())
    }

    fn access_for(&self, principal: &Principal, module: &Module) -> ServiceResult<ModuleAccess> {
        if principal.is_admin() {
            return Ok(ModuleAccess::FULL);
        }
        if let Some(access) = self.cache.get(principal.id, &module.name) {
            return Ok(access);
        }
        let access = self.compute_access(principal.id, module.id)?;
        self.cache.put(principal.id, &module.name, access);
        Ok(access)
    }

    fn compute_access(&self, user_id: UserId, module_id: ModuleId) -> ServiceResult<ModuleAccess> {
        if let Some(level) = self.store.module_permission(user_id, module_id)? {
            return Ok(ModuleAccess::from_level(level));
        }
        if self.store.group_grants_module(user_id, module_id)? {
            return Ok(ModuleAccess::FULL);
        }
        Ok(ModuleAccess::NONE)
    }

    fn load_module(&self, module_name: &str) -> ServiceResult<Module> {
        self.store
            .find_module_by_name(module_name.trim())?
            .ok_or_else(|| ServiceError::not_found("module", module_name.trim()))
    }

    fn require_group(&self, group_id: GroupId) -> ServiceResult<UserGroup> {
        self.store
            .find_group(group_id)?
            .ok_or_else(|| ServiceError::not_found("group", group_id))
    }
}
