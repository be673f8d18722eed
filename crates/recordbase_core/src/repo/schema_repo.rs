//! Schema store persistence: modules and fields.
//!
//! # Responsibility
//! - CRUD over `modules` and `fields`.
//! - Keep module `config` and field `options` JSON encoding inside storage.
//!
//! # Invariants
//! - Module names never change; the storage trigger rejects renames.
//! - Field lists are returned in render order.

use crate::model::field::{Field, FieldDefinition, FieldId, FieldType, WarningMode};
use crate::model::module::{Module, ModuleConfig, ModuleId};
use crate::repo::{
    bool_to_int, int_to_bool, parse_json_column, to_json_column, RepoError, RepoResult,
    SqliteStore,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) const MODULE_SELECT_SQL: &str = "SELECT
    m.id,
    m.name,
    m.display_name,
    m.description,
    m.config,
    m.parent_module_id,
    m.created_at,
    m.updated_at
FROM modules m";

const FIELD_SELECT_SQL: &str = "SELECT
    id,
    module_id,
    name,
    display_name,
    field_type,
    options,
    relation_module,
    is_required,
    show_in_list,
    weight,
    sort_order,
    default_value,
    warning_yellow_days,
    warning_red_days,
    warning_mode
FROM fields";

/// Fully resolved module columns for insert and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRow {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub config: ModuleConfig,
    pub parent_module_id: Option<ModuleId>,
}

/// Repository interface for the schema store.
pub trait SchemaRepository {
    fn find_module_by_name(&self, name: &str) -> RepoResult<Option<Module>>;
    fn find_module(&self, id: ModuleId) -> RepoResult<Option<Module>>;
    /// All modules ordered by display name.
    fn list_modules(&self) -> RepoResult<Vec<Module>>;
    fn list_sub_modules(&self, parent_module_id: ModuleId) -> RepoResult<Vec<Module>>;
    fn insert_module(&self, row: &ModuleRow) -> RepoResult<Module>;
    /// Rewrites every mutable column; `row.name` is ignored.
    fn update_module(&self, id: ModuleId, row: &ModuleRow) -> RepoResult<Module>;
    fn delete_module(&self, id: ModuleId) -> RepoResult<()>;
    fn count_module_records(&self, id: ModuleId) -> RepoResult<i64>;
    /// Records of the module that point at a parent record.
    fn count_parented_records(&self, id: ModuleId) -> RepoResult<i64>;
    fn list_fields(&self, module_id: ModuleId) -> RepoResult<Vec<Field>>;
    fn find_field(&self, id: FieldId) -> RepoResult<Option<Field>>;
    fn insert_field(&self, module_id: ModuleId, def: &FieldDefinition) -> RepoResult<Field>;
    /// Rewrites every column except `name` and `module_id`.
    fn update_field(&self, id: FieldId, def: &FieldDefinition) -> RepoResult<Field>;
    fn delete_field(&self, id: FieldId) -> RepoResult<()>;
}

impl SchemaRepository for SqliteStore<'_> {
    fn find_module_by_name(&self, name: &str) -> RepoResult<Option<Module>> {
        let sql = format!("{MODULE_SELECT_SQL} WHERE m.name = ?1;");
        self.conn
            .query_row(&sql, [name], |row| Ok(load_module_row(row)))
            .optional()?
            .transpose()
    }

    fn find_module(&self, id: ModuleId) -> RepoResult<Option<Module>> {
        find_module_on(self.conn, id)
    }

    fn list_modules(&self) -> RepoResult<Vec<Module>> {
        let sql = format!("{MODULE_SELECT_SQL} ORDER BY m.display_name COLLATE NOCASE ASC, m.id ASC;");
        query_modules(self.conn, &sql, [])
    }

    fn list_sub_modules(&self, parent_module_id: ModuleId) -> RepoResult<Vec<Module>> {
        let sql = format!(
            "{MODULE_SELECT_SQL}
             WHERE m.parent_module_id = ?1
             ORDER BY m.display_name COLLATE NOCASE ASC, m.id ASC;"
        );
        query_modules(self.conn, &sql, [parent_module_id])
    }

    fn insert_module(&self, row: &ModuleRow) -> RepoResult<Module> {
        self.conn.execute(
            "INSERT INTO modules (
                name,
                display_name,
                description,
                config,
                parent_module_id
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                row.name.as_str(),
                row.display_name.as_str(),
                row.description.as_str(),
                to_json_column(&row.config, "config")?,
                row.parent_module_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        require_module(self.conn, id)
    }

    fn update_module(&self, id: ModuleId, row: &ModuleRow) -> RepoResult<Module> {
        let changed = self.conn.execute(
            "UPDATE modules
             SET display_name = ?2,
                 description = ?3,
                 config = ?4,
                 parent_module_id = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id,
                row.display_name.as_str(),
                row.description.as_str(),
                to_json_column(&row.config, "config")?,
                row.parent_module_id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("module", id));
        }
        require_module(self.conn, id)
    }

    fn delete_module(&self, id: ModuleId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM modules WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("module", id));
        }
        Ok(())
    }

    fn count_module_records(&self, id: ModuleId) -> RepoResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE module_id = ?1;",
            [id],
            |row| row.get(0),
        )?)
    }

    fn count_parented_records(&self, id: ModuleId) -> RepoResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM records
             WHERE module_id = ?1 AND parent_record_id IS NOT NULL;",
            [id],
            |row| row.get(0),
        )?)
    }

    fn list_fields(&self, module_id: ModuleId) -> RepoResult<Vec<Field>> {
        let sql = format!(
            "{FIELD_SELECT_SQL}
             WHERE module_id = ?1
             ORDER BY weight ASC, sort_order ASC, id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([module_id])?;
        let mut fields = Vec::new();
        while let Some(row) = rows.next()? {
            fields.push(parse_field_row(row)?);
        }
        Ok(fields)
    }

    fn find_field(&self, id: FieldId) -> RepoResult<Option<Field>> {
        let sql = format!("{FIELD_SELECT_SQL} WHERE id = ?1;");
        self.conn
            .query_row(&sql, [id], |row| Ok(parse_field_row(row)))
            .optional()?
            .transpose()
    }

    fn insert_field(&self, module_id: ModuleId, def: &FieldDefinition) -> RepoResult<Field> {
        self.conn.execute(
            "INSERT INTO fields (
                module_id,
                name,
                display_name,
                field_type,
                options,
                relation_module,
                is_required,
                show_in_list,
                weight,
                sort_order,
                default_value,
                warning_yellow_days,
                warning_red_days,
                warning_mode
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            params![
                module_id,
                def.name.as_str(),
                def.display_name.trim(),
                def.field_type.as_str(),
                to_json_column(&def.options, "options")?,
                def.relation_module.as_deref(),
                bool_to_int(def.is_required),
                bool_to_int(def.show_in_list),
                def.weight,
                def.sort_order,
                def.default_value.as_deref(),
                def.warning_yellow_days,
                def.warning_red_days,
                def.warning_mode.map(WarningMode::as_str),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.find_field(id)?
            .ok_or_else(|| RepoError::not_found("field", id))
    }

    fn update_field(&self, id: FieldId, def: &FieldDefinition) -> RepoResult<Field> {
        let changed = self.conn.execute(
            "UPDATE fields
             SET display_name = ?2,
                 field_type = ?3,
                 options = ?4,
                 relation_module = ?5,
                 is_required = ?6,
                 show_in_list = ?7,
                 weight = ?8,
                 sort_order = ?9,
                 default_value = ?10,
                 warning_yellow_days = ?11,
                 warning_red_days = ?12,
                 warning_mode = ?13,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id,
                def.display_name.trim(),
                def.field_type.as_str(),
                to_json_column(&def.options, "options")?,
                def.relation_module.as_deref(),
                bool_to_int(def.is_required),
                bool_to_int(def.show_in_list),
                def.weight,
                def.sort_order,
                def.default_value.as_deref(),
                def.warning_yellow_days,
                def.warning_red_days,
                def.warning_mode.map(WarningMode::as_str),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("field", id));
        }
        self.find_field(id)?
            .ok_or_else(|| RepoError::not_found("field", id))
    }

    fn delete_field(&self, id: FieldId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM fields WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("field", id));
        }
        Ok(())
    }
}

pub(crate) fn find_module_on(conn: &Connection, id: ModuleId) -> RepoResult<Option<Module>> {
    let sql = format!("{MODULE_SELECT_SQL} WHERE m.id = ?1;");
    conn.query_row(&sql, [id], |row| Ok(load_module_row(row)))
        .optional()?
        .transpose()
}

fn require_module(conn: &Connection, id: ModuleId) -> RepoResult<Module> {
    find_module_on(conn, id)?.ok_or_else(|| RepoError::not_found("module", id))
}

pub(crate) fn query_modules<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> RepoResult<Vec<Module>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut modules = Vec::new();
    while let Some(row) = rows.next()? {
        modules.push(load_module_row(row)?);
    }
    Ok(modules)
}

/// Parses one `MODULE_SELECT_SQL` row.
pub(crate) fn load_module_row(row: &Row<'_>) -> RepoResult<Module> {
    let raw_config: String = row.get(4)?;
    Ok(Module {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        config: parse_json_column(&raw_config, "modules.config")?,
        parent_module_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn parse_field_row(row: &Row<'_>) -> RepoResult<Field> {
    let raw_type: String = row.get(4)?;
    let field_type = FieldType::parse(&raw_type)
        .ok_or_else(|| RepoError::InvalidData(format!("unknown field type `{raw_type}`")))?;
    let raw_options: String = row.get(5)?;
    let warning_mode = match row.get::<_, Option<String>>(14)? {
        Some(raw) => Some(
            WarningMode::parse(&raw)
                .ok_or_else(|| RepoError::InvalidData(format!("unknown warning mode `{raw}`")))?,
        ),
        None => None,
    };

    Ok(Field {
        id: row.get(0)?,
        module_id: row.get(1)?,
        name: row.get(2)?,
        display_name: row.get(3)?,
        field_type,
        options: parse_json_column(&raw_options, "fields.options")?,
        relation_module: row.get(6)?,
        is_required: int_to_bool(row.get(7)?),
        show_in_list: int_to_bool(row.get(8)?),
        weight: row.get(9)?,
        sort_order: row.get(10)?,
        default_value: row.get(11)?,
        warning_yellow_days: row.get(12)?,
        warning_red_days: row.get(13)?,
        warning_mode,
    })
}
