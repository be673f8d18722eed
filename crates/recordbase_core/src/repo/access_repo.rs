//! Access-control persistence: users, groups, grants and overrides.
//!
//! # Responsibility
//! - Mirror identity-provider users.
//! - Store group membership, group module/menu grants and per-user
//!   module permission overrides.
//! - Answer the raw facts the access evaluator combines.
//!
//! # Invariants
//! - A user's explicit permission row for a module shadows every group grant.

use crate::model::module::{Module, ModuleId};
use crate::model::principal::{GroupId, PermissionLevel, Role, User, UserGroup, UserId};
use crate::repo::schema_repo::{query_modules, MODULE_SELECT_SQL};
use crate::repo::{RepoError, RepoResult, SqliteStore};
use rusqlite::{params, Connection, OptionalExtension};

pub trait AccessRepository {
    fn upsert_user(&self, user: &User) -> RepoResult<User>;
    fn find_user(&self, id: UserId) -> RepoResult<Option<User>>;

    fn module_permission(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> RepoResult<Option<PermissionLevel>>;
    /// `None` removes the override so group grants apply again.
    fn set_module_permission(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        level: Option<PermissionLevel>,
    ) -> RepoResult<()>;
    /// True iff any group of `user_id` grants `module_id`.
    fn group_grants_module(&self, user_id: UserId, module_id: ModuleId) -> RepoResult<bool>;
    /// Modules a non-admin user may view, ordered by display name.
    fn visible_modules(&self, user_id: UserId) -> RepoResult<Vec<Module>>;
    /// Distinct menu item keys granted through the user's groups.
    fn menu_items_for(&self, user_id: UserId) -> RepoResult<Vec<String>>;

    fn create_group(&self, name: &str, description: &str) -> RepoResult<UserGroup>;
    fn delete_group(&self, id: GroupId) -> RepoResult<()>;
    fn find_group(&self, id: GroupId) -> RepoResult<Option<UserGroup>>;
    fn list_groups(&self) -> RepoResult<Vec<UserGroup>>;
    fn add_group_member(&self, group_id: GroupId, user_id: UserId) -> RepoResult<()>;
    fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> RepoResult<()>;
    fn grant_group_module(&self, group_id: GroupId, module_id: ModuleId) -> RepoResult<()>;
    fn revoke_group_module(&self, group_id: GroupId, module_id: ModuleId) -> RepoResult<()>;
    /// Replaces the group's menu item set.
    fn set_group_menu_items(&self, group_id: GroupId, items: &[String]) -> RepoResult<()>;
}

impl AccessRepository for SqliteStore<'_> {
    fn upsert_user(&self, user: &User) -> RepoResult<User> {
        self.conn.execute(
            "INSERT INTO users (id, email, display_name, role)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                role = excluded.role,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                user.id,
                user.email.trim(),
                user.display_name.trim(),
                user.role.as_str(),
            ],
        )?;
        self.find_user(user.id)?
            .ok_or_else(|| RepoError::not_found("user", user.id))
    }

    fn find_user(&self, id: UserId) -> RepoResult<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, email, display_name, role FROM users WHERE id = ?1;",
                [id],
                |row| {
                    let role: String = row.get(3)?;
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        role: Role::parse(&role),
                    })
                },
            )
            .optional()?)
    }

    fn module_permission(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> RepoResult<Option<PermissionLevel>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT permission FROM module_permissions
                 WHERE user_id = ?1 AND module_id = ?2;",
                params![user_id, module_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|value| {
            PermissionLevel::parse(&value).ok_or_else(|| {
                RepoError::InvalidData(format!("unknown permission level `{value}`"))
            })
        })
        .transpose()
    }

    fn set_module_permission(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        level: Option<PermissionLevel>,
    ) -> RepoResult<()> {
        match level {
            Some(level) => {
                self.conn.execute(
                    "INSERT INTO module_permissions (user_id, module_id, permission)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (user_id, module_id) DO UPDATE SET
                        permission = excluded.permission,
                        updated_at = (strftime('%s', 'now') * 1000);",
                    params![user_id, module_id, level.as_str()],
                )?;
            }
            None => {
                self.conn.execute(
                    "DELETE FROM module_permissions WHERE user_id = ?1 AND module_id = ?2;",
                    params![user_id, module_id],
                )?;
            }
        }
        Ok(())
    }

    fn group_grants_module(&self, user_id: UserId, module_id: ModuleId) -> RepoResult<bool> {
        let granted: i64 = self.conn.query_row(
            "SELECT EXISTS (
                SELECT 1
                FROM user_group_members gm
                JOIN user_group_modules gmod ON gmod.group_id = gm.group_id
                WHERE gm.user_id = ?1 AND gmod.module_id = ?2
            );",
            params![user_id, module_id],
            |row| row.get(0),
        )?;
        Ok(granted != 0)
    }

    fn visible_modules(&self, user_id: UserId) -> RepoResult<Vec<Module>> {
        let sql = format!(
            "{MODULE_SELECT_SQL}
             WHERE EXISTS (
                 SELECT 1 FROM module_permissions p
                 WHERE p.module_id = m.id AND p.user_id = ?1 AND p.permission <> 'none'
             )
             OR (
                 NOT EXISTS (
                     SELECT 1 FROM module_permissions p
                     WHERE p.module_id = m.id AND p.user_id = ?1
                 )
                 AND EXISTS (
                     SELECT 1
                     FROM user_group_members gm
                     JOIN user_group_modules gmod ON gmod.group_id = gm.group_id
                     WHERE gm.user_id = ?1 AND gmod.module_id = m.id
                 )
             )
             ORDER BY m.display_name COLLATE NOCASE ASC, m.id ASC;"
        );
        query_modules(self.conn, &sql, [user_id])
    }

    fn menu_items_for(&self, user_id: UserId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT mi.menu_item
             FROM user_group_members gm
             JOIN user_group_menu_items mi ON mi.group_id = gm.group_id
             WHERE gm.user_id = ?1
             ORDER BY mi.menu_item ASC;",
        )?;
        let items = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(items)
    }

    fn create_group(&self, name: &str, description: &str) -> RepoResult<UserGroup> {
        self.conn.execute(
            "INSERT INTO user_groups (name, description) VALUES (?1, ?2);",
            params![name.trim(), description.trim()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.find_group(id)?
            .ok_or_else(|| RepoError::not_found("group", id))
    }

    fn delete_group(&self, id: GroupId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM user_groups WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("group", id));
        }
        Ok(())
    }

    fn find_group(&self, id: GroupId) -> RepoResult<Option<UserGroup>> {
        let header: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, description FROM user_groups WHERE id = ?1;",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        header
            .map(|(name, description)| load_group(self.conn, id, name, description))
            .transpose()
    }

    fn list_groups(&self) -> RepoResult<Vec<UserGroup>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description FROM user_groups ORDER BY name COLLATE NOCASE ASC;",
        )?;
        let headers = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<(GroupId, String, String)>, _>>()?;
        headers
            .into_iter()
            .map(|(id, name, description)| load_group(self.conn, id, name, description))
            .collect()
    }

    fn add_group_member(&self, group_id: GroupId, user_id: UserId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO user_group_members (group_id, user_id) VALUES (?1, ?2);",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM user_group_members WHERE group_id = ?1 AND user_id = ?2;",
            params![group_id, user_id],
        )?;
        Ok(())
    }

    fn grant_group_module(&self, group_id: GroupId, module_id: ModuleId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO user_group_modules (group_id, module_id) VALUES (?1, ?2);",
            params![group_id, module_id],
        )?;
        Ok(())
    }

    fn revoke_group_module(&self, group_id: GroupId, module_id: ModuleId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM user_group_modules WHERE group_id = ?1 AND module_id = ?2;",
            params![group_id, module_id],
        )?;
        Ok(())
    }

    fn set_group_menu_items(&self, group_id: GroupId, items: &[String]) -> RepoResult<()> {
        let tx = self.immediate()?;
        tx.execute(
            "DELETE FROM user_group_menu_items WHERE group_id = ?1;",
            [group_id],
        )?;
        for item in items.iter().map(|item| item.trim()).filter(|item| !item.is_empty()) {
            tx.execute(
                "INSERT OR IGNORE INTO user_group_menu_items (group_id, menu_item)
                 VALUES (?1, ?2);",
                params![group_id, item],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn load_group(
    conn: &Connection,
    id: GroupId,
    name: String,
    description: String,
) -> RepoResult<UserGroup> {
    let member_ids = query_ids(
        conn,
        "SELECT user_id FROM user_group_members WHERE group_id = ?1 ORDER BY user_id ASC;",
        id,
    )?;
    let module_ids = query_ids(
        conn,
        "SELECT module_id FROM user_group_modules WHERE group_id = ?1 ORDER BY module_id ASC;",
        id,
    )?;
    let mut stmt = conn.prepare(
        "SELECT menu_item FROM user_group_menu_items WHERE group_id = ?1 ORDER BY menu_item ASC;",
    )?;
    let menu_items = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(UserGroup {
        id,
        name,
        description,
        member_ids,
        module_ids,
        menu_items,
    })
}

fn query_ids(conn: &Connection, sql: &str, id: i64) -> RepoResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}
