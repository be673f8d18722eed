use recordbase_core::db::open_db_in_memory;
use recordbase_core::{
    HistoryAction, LocalFileStore, NewModule, NewRecord, NotificationHub, PermissionCache,
    PermissionLevel, Principal, Role, ServiceError, Services, User,
};

#[test]
fn notes_are_appended_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let (cache, hub, files) = collaborators();
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    let record = seed_record(&services);
    let audit = services.audit();

    let note = audit
        .add_note(Some(&admin), "tickets", record, "  called the customer  ")
        .unwrap();
    assert_eq!(note.action, HistoryAction::Note);
    assert_eq!(note.description, "called the customer");
    assert_eq!(note.created_by, Some(admin.id));
    assert_eq!(note.record_id, record);

    let history = audit.list_history(Some(&admin), "tickets", record).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, note.id);
    assert_eq!(history[1].action, HistoryAction::Created);
    assert_eq!(history[1].description, "Tickets \"Printer jam\" created");
}

#[test]
fn notes_are_validated() {
    let conn = open_db_in_memory().unwrap();
    let (cache, hub, files) = collaborators();
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    let record = seed_record(&services);
    let audit = services.audit();

    let err = audit
        .add_note(Some(&admin), "tickets", record, "   ")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = audit
        .add_note(Some(&admin), "tickets", record, &"x".repeat(4001))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    audit
        .add_note(Some(&admin), "tickets", record, &"x".repeat(4000))
        .unwrap();
}

#[test]
fn viewers_read_history_but_cannot_add_notes() {
    let conn = open_db_in_memory().unwrap();
    let (cache, hub, files) = collaborators();
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    let record = seed_record(&services);
    services
        .access()
        .upsert_user(
            Some(&admin),
            &User {
                id: 4,
                email: "viewer@example.com".to_string(),
                display_name: String::new(),
                role: Role::User,
            },
        )
        .unwrap();
    services
        .access()
        .set_module_permission(Some(&admin), 4, "tickets", Some(PermissionLevel::Viewer))
        .unwrap();
    let viewer = Principal::new(4, Role::User, "viewer@example.com");

    let history = services
        .audit()
        .list_history(Some(&viewer), "tickets", record)
        .unwrap();
    assert_eq!(history.len(), 1);

    let err = services
        .audit()
        .add_note(Some(&viewer), "tickets", record, "hello")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn history_goes_away_with_its_record() {
    let conn = open_db_in_memory().unwrap();
    let (cache, hub, files) = collaborators();
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    let record = seed_record(&services);
    services
        .audit()
        .add_note(Some(&admin), "tickets", record, "bye")
        .unwrap();

    services
        .records()
        .delete(Some(&admin), "tickets", record, Default::default())
        .unwrap();
    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM record_history WHERE record_id = ?1;",
            [record],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);

    let err = services
        .audit()
        .list_history(Some(&admin), "tickets", record)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

fn collaborators() -> (PermissionCache, NotificationHub, LocalFileStore) {
    (
        PermissionCache::default(),
        NotificationHub::new(),
        LocalFileStore::new(std::env::temp_dir().join("recordbase-audit-tests")),
    )
}

fn admin() -> Principal {
    Principal::new(1, Role::Admin, "admin@example.com")
}

fn seed_record(services: &Services<'_>) -> i64 {
    let input = NewModule {
        name: "tickets".to_string(),
        display_name: "Tickets".to_string(),
        ..NewModule::default()
    };
    services.schema().create_module(Some(&admin()), &input).unwrap();
    services
        .records()
        .create(Some(&admin()), "tickets", &NewRecord::named("Printer jam"))
        .unwrap()
        .value
        .id
}
