//! Record attachment model: images, documents and record links.
//!
//! # Responsibility
//! - Define attachment rows owned by a record.
//! - Parse base64 data URIs handed in by upload clients.
//! - Sanitize user-supplied document names.
//!
//! # Invariants
//! - `file_path` is always relative to the upload root.
//! - Image order is `sort_order ASC, id ASC`; index 0 is the primary image.

use crate::model::principal::UserId;
use crate::model::record::RecordId;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ImageId = i64;
pub type DocumentId = i64;
pub type LinkId = i64;

static DATA_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,(.*)$").expect("valid data uri regex")
});
static IMAGE_EXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]{1,10}$").expect("valid image ext regex"));

/// Name used when sanitizing leaves nothing usable.
const FALLBACK_FILE_NAME: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordImage {
    pub id: ImageId,
    pub record_id: RecordId,
    pub file_path: String,
    pub mime_type: String,
    pub sort_order: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDocument {
    pub id: DocumentId,
    pub record_id: RecordId,
    pub file_path: String,
    /// Sanitized display name.
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_by: Option<UserId>,
    pub created_at: i64,
}

/// Undirected association between two records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLink {
    pub id: LinkId,
    pub record_id: RecordId,
    pub linked_record_id: RecordId,
    pub note: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: i64,
}

impl RecordLink {
    /// The side of the link that is not `record_id`.
    pub fn other_side(&self, record_id: RecordId) -> RecordId {
        if self.record_id == record_id {
            self.linked_record_id
        } else {
            self.record_id
        }
    }
}

/// Decoded `data:<mime>;base64,<payload>` upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn parse(input: &str) -> Result<Self, DataUriError> {
        let caps = DATA_URI_RE
            .captures(input.trim())
            .ok_or(DataUriError::Malformed)?;
        let mime_type = caps[1].to_ascii_lowercase();
        let payload: String = caps[2].chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if payload.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|err| DataUriError::InvalidBase64(err.to_string()))?;
        Ok(Self { mime_type, bytes })
    }

    /// Parses an image upload and returns it with its file extension.
    pub fn parse_image(input: &str) -> Result<(Self, String), DataUriError> {
        let uri = Self::parse(input)?;
        let ext = uri.image_extension()?;
        Ok((uri, ext))
    }

    fn image_extension(&self) -> Result<String, DataUriError> {
        let subtype = self
            .mime_type
            .strip_prefix("image/")
            .ok_or_else(|| DataUriError::NotAnImage(self.mime_type.clone()))?;
        let ext = match subtype {
            "jpeg" => "jpg",
            "svg+xml" => "svg",
            other => other,
        };
        if !IMAGE_EXT_RE.is_match(ext) {
            return Err(DataUriError::NotAnImage(self.mime_type.clone()));
        }
        Ok(ext.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataUriError {
    Malformed,
    EmptyPayload,
    InvalidBase64(String),
    NotAnImage(String),
}

impl Display for DataUriError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "expected a `data:<mime>;base64,<data>` uri"),
            Self::EmptyPayload => write!(f, "data uri payload is empty"),
            Self::InvalidBase64(details) => write!(f, "data uri payload is not base64: {details}"),
            Self::NotAnImage(mime) => write!(f, "`{mime}` is not a supported image type"),
        }
    }
}

impl Error for DataUriError {}

/// Replaces every char outside `[A-Za-z0-9._-]` with `_`.
///
/// Leading dots are replaced too so the result never names a hidden file.
pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed);
    let mut sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.starts_with('.') {
        sanitized.replace_range(0..1, "_");
    }
    if sanitized.chars().all(|c| c == '_' || c == '.') {
        return FALLBACK_FILE_NAME.to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::{sanitize_file_name, DataUri, DataUriError};

    #[test]
    fn parses_image_data_uri() {
        let (uri, ext) = DataUri::parse_image("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(uri.mime_type, "image/png");
        assert_eq!(uri.bytes, b"hello");
        assert_eq!(ext, "png");

        let (_, ext) = DataUri::parse_image("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(ext, "jpg");
    }

    #[test]
    fn rejects_bad_data_uris() {
        assert_eq!(DataUri::parse("hello"), Err(DataUriError::Malformed));
        assert_eq!(
            DataUri::parse("data:text/plain;base64,"),
            Err(DataUriError::EmptyPayload)
        );
        assert!(matches!(
            DataUri::parse("data:text/plain;base64,@@@"),
            Err(DataUriError::InvalidBase64(_))
        ));
        assert!(matches!(
            DataUri::parse_image("data:application/pdf;base64,aGVsbG8="),
            Err(DataUriError::NotAnImage(_))
        ));
    }

    #[test]
    fn sanitizes_file_names() {
        assert_eq!(sanitize_file_name("Q3 report (final).pdf"), "Q3_report__final_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(".env"), "_env");
        assert_eq!(sanitize_file_name("   "), "document");
        assert_eq!(sanitize_file_name("résumé.txt"), "r_sum_.txt");
    }
}
