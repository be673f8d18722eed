//! Attachment use-cases: images, documents and record links.
//!
//! # Responsibility
//! - Store uploaded bytes through a `FileStore` and index them per record.
//! - Keep image order and the primary image (index 0) stable.
//! - Audit image and document changes in the record history.
//!
//! # Invariants
//! - Each attachment kind needs its module feature (`images`, `documents`,
//!   `links`).
//! - An attachment is only reachable through the record that owns it.
//! - Files are written before their row and removed after it; a failed
//!   removal leaves an orphaned file, never a dangling row.

use crate::model::attachment::{
    sanitize_file_name, DataUri, DocumentId, ImageId, LinkId, RecordDocument, RecordImage,
    RecordLink,
};
use crate::model::history::{HistoryAction, NewHistoryEntry};
use crate::model::module::{Module, ModuleFeature};
use crate::model::principal::{AccessOperation, Principal};
use crate::model::record::{Record, RecordId};
use crate::now_epoch_ms;
use crate::repo::attachment_repo::DocumentRow;
use crate::repo::Store;
use crate::service::access_service::AccessService;
use crate::service::permission_cache::PermissionCache;
use crate::service::{require_principal, Outcome, ServiceError, ServiceResult};
use crate::storage::FileStore;
use uuid::Uuid;

pub struct AttachmentService<'a, S: ?Sized> {
    store: &'a S,
    cache: &'a PermissionCache,
    files: &'a dyn FileStore,
}

impl<'a, S> AttachmentService<'a, S>
where
    S: Store + ?Sized,
{
    pub fn new(store: &'a S, cache: &'a PermissionCache, files: &'a dyn FileStore) -> Self {
        Self {
            store,
            cache,
            files,
        }
    }

    /// Stores a `data:image/<ext>;base64,...` upload at the end of the image list.
    pub fn add_image(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        data_uri: &str,
    ) -> ServiceResult<RecordImage> {
        let (module, record, principal) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Images,
        )?;
        let (upload, ext) =
            DataUri::parse_image(data_uri).map_err(|err| ServiceError::Validation(err.to_string()))?;

        let path = format!(
            "{}/{}/{}-{}.{}",
            module.name,
            record.id,
            now_epoch_ms(),
            short_token(),
            ext
        );
        self.files.write(&path, &upload.bytes)?;

        let added = NewHistoryEntry::new(HistoryAction::ImageAdded, "Image added", Some(principal.id));
        let image = self
            .store
            .insert_image(record.id, &path, &upload.mime_type, &added)
            .map_err(|err| {
                self.discard_file(&path);
                ServiceError::from(err)
            })?;
        log::info!(
            "event=image_add module=attachments status=ok record_id={} image_id={} bytes={}",
            record.id,
            image.id,
            upload.bytes.len()
        );
        Ok(image)
    }

    /// Images ordered by `sort_order`, primary first.
    pub fn list_images(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
    ) -> ServiceResult<Vec<RecordImage>> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::View,
            ModuleFeature::Images,
        )?;
        Ok(self.store.list_images(record.id)?)
    }

    /// Reorders images; `ordered_ids` must be exactly the record's image set.
    pub fn reorder_images(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        ordered_ids: &[ImageId],
    ) -> ServiceResult<Vec<RecordImage>> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Images,
        )?;
        self.store.reorder_images(record.id, ordered_ids)?;
        log::info!(
            "event=image_reorder module=attachments status=ok record_id={} count={}",
            record.id,
            ordered_ids.len()
        );
        Ok(self.store.list_images(record.id)?)
    }

    pub fn delete_image(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        image_id: ImageId,
    ) -> ServiceResult<Outcome<()>> {
        let (_, record, principal) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Images,
        )?;
        let image = self
            .store
            .find_image(image_id)?
            .filter(|image| image.record_id == record.id)
            .ok_or_else(|| ServiceError::not_found("image", image_id))?;

        let deleted =
            NewHistoryEntry::new(HistoryAction::ImageDeleted, "Image deleted", Some(principal.id));
        self.store.delete_image(image.id, &deleted)?;
        log::info!(
            "event=image_delete module=attachments status=ok record_id={} image_id={}",
            record.id,
            image.id
        );
        Ok(self.remove_file(&image.file_path))
    }

    /// Stores any-MIME upload under a sanitized display name.
    pub fn add_document(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        data_uri: &str,
        display_name: &str,
    ) -> ServiceResult<RecordDocument> {
        let (module, record, principal) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Documents,
        )?;
        let upload =
            DataUri::parse(data_uri).map_err(|err| ServiceError::Validation(err.to_string()))?;
        let file_name = sanitize_file_name(display_name);
        let path = format!(
            "{}/{}/{}-{}-{}",
            module.name,
            record.id,
            now_epoch_ms(),
            short_token(),
            file_name
        );
        self.files.write(&path, &upload.bytes)?;

        let added = NewHistoryEntry::new(
            HistoryAction::DocumentAdded,
            format!("Document \"{file_name}\" added"),
            Some(principal.id),
        );
        let row = DocumentRow {
            record_id: record.id,
            file_path: path.clone(),
            file_name,
            mime_type: upload.mime_type.clone(),
            file_size: upload.bytes.len() as i64,
            uploaded_by: Some(principal.id),
        };
        let document = self.store.insert_document(&row, &added).map_err(|err| {
            self.discard_file(&path);
            ServiceError::from(err)
        })?;
        log::info!(
            "event=document_add module=attachments status=ok record_id={} document_id={} bytes={}",
            record.id,
            document.id,
            document.file_size
        );
        Ok(document)
    }

    pub fn list_documents(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
    ) -> ServiceResult<Vec<RecordDocument>> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::View,
            ModuleFeature::Documents,
        )?;
        Ok(self.store.list_documents(record.id)?)
    }

    /// Returns the document row and its stored bytes.
    pub fn read_document(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        document_id: DocumentId,
    ) -> ServiceResult<(RecordDocument, Vec<u8>)> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::View,
            ModuleFeature::Documents,
        )?;
        let document = self.owned_document(&record, document_id)?;
        let bytes = self.files.read(&document.file_path)?;
        Ok((document, bytes))
    }

    pub fn delete_document(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        document_id: DocumentId,
    ) -> ServiceResult<Outcome<()>> {
        let (_, record, principal) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Documents,
        )?;
        let document = self.owned_document(&record, document_id)?;
        let deleted = NewHistoryEntry::new(
            HistoryAction::DocumentDeleted,
            format!("Document \"{}\" deleted", document.file_name),
            Some(principal.id),
        );
        self.store.delete_document(document.id, &deleted)?;
        log::info!(
            "event=document_delete module=attachments status=ok record_id={} document_id={}",
            record.id,
            document.id
        );
        Ok(self.remove_file(&document.file_path))
    }

    /// Links `record_id` to another record the principal can view.
    pub fn add_link(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        linked_record_id: RecordId,
        note: Option<&str>,
    ) -> ServiceResult<RecordLink> {
        let (_, record, principal) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Links,
        )?;
        if linked_record_id == record.id {
            return Err(ServiceError::Validation(
                "a record cannot be linked to itself".to_string(),
            ));
        }
        let linked = self
            .store
            .find_record(linked_record_id)?
            .ok_or_else(|| ServiceError::Validation(format!("record {linked_record_id} does not exist")))?;
        let linked_module = self
            .store
            .find_module(linked.module_id)?
            .ok_or_else(|| ServiceError::not_found("module", linked.module_id))?;
        self.access()
            .authorize_module(principal, &linked_module, AccessOperation::View)?;

        let note = note.map(str::trim).filter(|value| !value.is_empty());
        let link = self
            .store
            .insert_link(record.id, linked.id, note, Some(principal.id))?;
        log::info!(
            "event=link_add module=attachments status=ok record_id={} linked_record_id={}",
            record.id,
            linked.id
        );
        Ok(link)
    }

    /// Links touching the record from either side.
    pub fn list_links(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
    ) -> ServiceResult<Vec<RecordLink>> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::View,
            ModuleFeature::Links,
        )?;
        Ok(self.store.list_links(record.id)?)
    }

    pub fn delete_link(
        &self,
        principal: Option<&Principal>,
        module_name: &str,
        record_id: RecordId,
        link_id: LinkId,
    ) -> ServiceResult<()> {
        let (_, record, _) = self.resolve(
            principal,
            module_name,
            record_id,
            AccessOperation::Edit,
            ModuleFeature::Links,
        )?;
        let link = self
            .store
            .find_link(link_id)?
            .filter(|link| link.record_id == record.id || link.linked_record_id == record.id)
            .ok_or_else(|| ServiceError::not_found("link", link_id))?;
        self.store.delete_link(link.id)?;
        log::info!(
            "event=link_delete module=attachments status=ok record_id={} link_id={}",
            record.id,
            link.id
        );
        Ok(())
    }

    fn access(&self) -> AccessService<'a, S> {
        AccessService::new(self.store, self.cache)
    }

    /// Authorizes, loads the record and checks the module feature.
    fn resolve<'p>(
        &self,
        principal: Option<&'p Principal>,
        module_name: &str,
        record_id: RecordId,
        operation: AccessOperation,
        feature: ModuleFeature,
    ) -> ServiceResult<(Module, Record, &'p Principal)> {
        let module = self.access().authorize(principal, module_name, operation)?;
        let principal = require_principal(principal)?;
        if !module.config.has_feature(feature) {
            return Err(ServiceError::Validation(format!(
                "module `{}` does not enable {}",
                module.name,
                feature.as_str()
            )));
        }
        let record = self
            .store
            .find_record(record_id)?
            .filter(|record| record.module_id == module.id)
            .ok_or_else(|| ServiceError::not_found(&format!("{} record", module.name), record_id))?;
        Ok((module, record, principal))
    }

    fn owned_document(&self, record: &Record, document_id: DocumentId) -> ServiceResult<RecordDocument> {
        self.store
            .find_document(document_id)?
            .filter(|document| document.record_id == record.id)
            .ok_or_else(|| ServiceError::not_found("document", document_id))
    }

    fn remove_file(&self, path: &str) -> Outcome<()> {
        match self.files.delete(path) {
            Ok(_) => Outcome::complete(()),
            Err(err) => {
                log::warn!(
                    "event=attachment_file_cleanup module=attachments status=error path={} error={}",
                    path,
                    err
                );
                Outcome {
                    value: (),
                    partial_failures: vec![format!("orphaned file {path}: {err}")],
                }
            }
        }
    }

    fn discard_file(&self, path: &str) {
        if let Err(err) = self.files.delete(path) {
            log::warn!(
                "event=attachment_rollback module=attachments status=error path={} error={}",
                path,
                err
            );
        }
    }
}

fn short_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}
