use recordbase_core::db::open_db_in_memory;
use recordbase_core::{
    FileStore, HistoryAction, LocalFileStore, ModuleConfig, ModuleFeature, NewModule, NewRecord,
    NotificationHub, PermissionCache, Principal, RecordDeleteMode, Role, ServiceError, Services,
};

const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";
const TEXT_URI: &str = "data:text/plain;base64,aGVsbG8gd29ybGQ=";

#[test]
fn images_are_stored_ordered_and_reordered() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "assets", &[ModuleFeature::Images]);
    let record = seed_record(&services, "assets");
    let attachments = services.attachments();

    let first = attachments
        .add_image(Some(&admin), "assets", record, PNG_URI)
        .unwrap();
    let second = attachments
        .add_image(Some(&admin), "assets", record, PNG_URI)
        .unwrap();
    assert_eq!(first.sort_order, 0);
    assert_eq!(second.sort_order, 1);
    assert_eq!(first.mime_type, "image/png");
    assert!(first.file_path.starts_with(&format!("assets/{record}/")));
    assert!(first.file_path.ends_with(".png"));
    assert_ne!(first.file_path, second.file_path);
    let stored = files.read(&first.file_path).unwrap();
    assert_eq!(&stored[..4], b"\x89PNG");

    let reordered = attachments
        .reorder_images(Some(&admin), "assets", record, &[second.id, first.id])
        .unwrap();
    assert_eq!(reordered[0].id, second.id);

    let detail = services.records().get(Some(&admin), "assets", record).unwrap();
    assert_eq!(detail.value.images[0].id, second.id);
    let summary = services
        .records()
        .list(Some(&admin), "assets", &Default::default())
        .unwrap();
    assert_eq!(summary[0].thumbnail.as_deref(), Some(second.file_path.as_str()));

    let err = attachments
        .reorder_images(Some(&admin), "assets", record, &[second.id])
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn image_changes_are_audited_and_files_removed() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "assets", &[ModuleFeature::Images]);
    let record = seed_record(&services, "assets");
    let attachments = services.attachments();

    let image = attachments
        .add_image(Some(&admin), "assets", record, PNG_URI)
        .unwrap();
    let outcome = attachments
        .delete_image(Some(&admin), "assets", record, image.id)
        .unwrap();
    assert!(outcome.is_complete());
    assert!(matches!(
        files.read(&image.file_path),
        Err(recordbase_core::FileStoreError::NotFound(_))
    ));

    let actions: Vec<HistoryAction> = services
        .audit()
        .list_history(Some(&admin), "assets", record)
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::ImageDeleted,
            HistoryAction::ImageAdded,
            HistoryAction::Created
        ]
    );
}

#[test]
fn uploads_are_validated() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "assets", &[ModuleFeature::Images]);
    let record = seed_record(&services, "assets");
    let attachments = services.attachments();

    for uri in ["not a uri", TEXT_URI, "data:image/png;base64,", "data:image/png;base64,@@"] {
        let err = attachments
            .add_image(Some(&admin), "assets", record, uri)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{uri}");
    }
    assert!(attachments
        .list_images(Some(&admin), "assets", record)
        .unwrap()
        .is_empty());
}

#[test]
fn attachment_kinds_require_module_features() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "plain", &[]);
    let record = seed_record(&services, "plain");
    let other = seed_record(&services, "plain");
    let attachments = services.attachments();

    let err = attachments
        .add_image(Some(&admin), "plain", record, PNG_URI)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = attachments
        .add_document(Some(&admin), "plain", record, TEXT_URI, "a.txt")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = attachments
        .add_link(Some(&admin), "plain", record, other, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn documents_keep_sanitized_names_and_bytes() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "contracts", &[ModuleFeature::Documents]);
    let record = seed_record(&services, "contracts");
    let attachments = services.attachments();

    let document = attachments
        .add_document(Some(&admin), "contracts", record, TEXT_URI, "../Q3 report (final).txt")
        .unwrap();
    assert_eq!(document.file_name, "Q3_report__final_.txt");
    assert_eq!(document.mime_type, "text/plain");
    assert_eq!(document.file_size, 11);
    assert!(document.file_path.ends_with("-Q3_report__final_.txt"));

    let (loaded, bytes) = attachments
        .read_document(Some(&admin), "contracts", record, document.id)
        .unwrap();
    assert_eq!(loaded.id, document.id);
    assert_eq!(bytes, b"hello world");

    let outcome = attachments
        .delete_document(Some(&admin), "contracts", record, document.id)
        .unwrap();
    assert!(outcome.is_complete());
    assert!(attachments
        .list_documents(Some(&admin), "contracts", record)
        .unwrap()
        .is_empty());
}

#[test]
fn attachments_are_reachable_only_through_their_record() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "contracts", &[ModuleFeature::Documents]);
    let owner = seed_record(&services, "contracts");
    let stranger = seed_record(&services, "contracts");
    let attachments = services.attachments();

    let document = attachments
        .add_document(Some(&admin), "contracts", owner, TEXT_URI, "a.txt")
        .unwrap();
    let err = attachments
        .read_document(Some(&admin), "contracts", stranger, document.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[test]
fn deleting_a_record_removes_its_files_and_tolerates_missing_ones() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(
        &services,
        "assets",
        &[ModuleFeature::Images, ModuleFeature::Documents],
    );
    let record = seed_record(&services, "assets");
    let attachments = services.attachments();

    let image = attachments
        .add_image(Some(&admin), "assets", record, PNG_URI)
        .unwrap();
    let document = attachments
        .add_document(Some(&admin), "assets", record, TEXT_URI, "notes.txt")
        .unwrap();
    assert!(files.delete(&image.file_path).unwrap());

    let outcome = services
        .records()
        .delete(Some(&admin), "assets", record, RecordDeleteMode::Restrict)
        .unwrap();
    assert!(outcome.is_complete());
    assert!(files.read(&document.file_path).is_err());

    let images: i64 = conn
        .query_row("SELECT COUNT(*) FROM record_images;", [], |row| row.get(0))
        .unwrap();
    let documents: i64 = conn
        .query_row("SELECT COUNT(*) FROM record_documents;", [], |row| row.get(0))
        .unwrap();
    assert_eq!((images, documents), (0, 0));
}

#[test]
fn links_are_undirected_and_unique() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "tickets", &[ModuleFeature::Links]);
    let a = seed_record(&services, "tickets");
    let b = seed_record(&services, "tickets");
    let attachments = services.attachments();

    let link = attachments
        .add_link(Some(&admin), "tickets", a, b, Some(" duplicate of "))
        .unwrap();
    assert_eq!(link.note.as_deref(), Some("duplicate of"));
    assert_eq!(link.other_side(a), b);

    let from_b = attachments.list_links(Some(&admin), "tickets", b).unwrap();
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].other_side(b), a);

    let err = attachments
        .add_link(Some(&admin), "tickets", b, a, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = attachments
        .add_link(Some(&admin), "tickets", a, a, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    attachments
        .delete_link(Some(&admin), "tickets", b, link.id)
        .unwrap();
    assert!(attachments
        .list_links(Some(&admin), "tickets", a)
        .unwrap()
        .is_empty());
}

#[test]
fn linking_needs_view_access_on_the_target_module() {
    let conn = open_db_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (cache, hub, files) = collaborators(dir.path());
    let services = Services::new(&conn, &cache, &hub, &files);
    let admin = admin();
    seed_module(&services, "tickets", &[ModuleFeature::Links]);
    seed_module(&services, "secrets", &[]);
    let ticket = seed_record(&services, "tickets");
    let secret = seed_record(&services, "secrets");

    services
        .access()
        .upsert_user(
            Some(&admin),
            &recordbase_core::User {
                id: 3,
                email: "editor@example.com".to_string(),
                display_name: String::new(),
                role: Role::User,
            },
        )
        .unwrap();
    services
        .access()
        .set_module_permission(
            Some(&admin),
            3,
            "tickets",
            Some(recordbase_core::PermissionLevel::Editor),
        )
        .unwrap();
    let editor = Principal::new(3, Role::User, "editor@example.com");

    let err = services
        .attachments()
        .add_link(Some(&editor), "tickets", ticket, secret, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

fn collaborators(root: &std::path::Path) -> (PermissionCache, NotificationHub, LocalFileStore) {
    (
        PermissionCache::default(),
        NotificationHub::new(),
        LocalFileStore::new(root),
    )
}

fn admin() -> Principal {
    Principal::new(1, Role::Admin, "admin@example.com")
}

fn seed_module(services: &Services<'_>, name: &str, features: &[ModuleFeature]) {
    let input = NewModule {
        name: name.to_string(),
        display_name: name.to_string(),
        config: ModuleConfig {
            features: features.iter().copied().collect(),
            ..ModuleConfig::default()
        },
        ..NewModule::default()
    };
    services.schema().create_module(Some(&admin()), &input).unwrap();
}

fn seed_record(services: &Services<'_>, module: &str) -> i64 {
    services
        .records()
        .create(Some(&admin()), module, &NewRecord::named("record"))
        .unwrap()
        .value
        .id
}
