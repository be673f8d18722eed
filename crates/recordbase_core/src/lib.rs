//! Core domain logic for recordbase.
//! Schema-driven records: modules and fields stored as data, records
//! validated against them, access control, audit trail and attachments.

pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;
pub mod storage;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, start_logging, LogLevel,
    LogSettings, LoggingError,
};
pub use model::attachment::{DataUri, RecordDocument, RecordImage, RecordLink};
pub use model::field::{Field, FieldDefinition, FieldId, FieldType, WarningMode};
pub use model::history::{HistoryAction, HistoryEntry};
pub use model::module::{Module, ModuleConfig, ModuleFeature, ModuleId, ModuleUpdate, NewModule};
pub use model::principal::{
    AccessOperation, GroupId, ModuleAccess, PermissionLevel, Principal, Role, User, UserGroup,
    UserId,
};
pub use model::record::{
    ChildrenCount, DeletedRecord, NewRecord, Record, RecordDeleteMode, RecordDetail, RecordId,
    RecordSummary, RecordUpdate,
};
pub use model::value::{FieldValue, RecordData};
pub use notify::{
    NoopNotificationSink, NotificationHub, NotificationHubError, NotificationSink, RecordEvent,
    RecordEventType, SinkError,
};
pub use repo::record_repo::RecordListQuery;
pub use repo::{RepoError, RepoResult, SqliteStore, Store};
pub use service::access_service::MenuItems;
pub use service::permission_cache::PermissionCache;
pub use service::schema_service::ModuleSchema;
pub use service::{Outcome, ServiceError, ServiceResult, Services};
pub use storage::{FileStore, FileStoreError, LocalFileStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current Unix time in milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
