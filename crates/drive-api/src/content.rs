//! File metadata and content classification

use serde::{Deserialize, Serialize};

/// Prefix shared by every Google Workspace mime type.
pub const WORKSPACE_PREFIX: &str = "application/vnd.google-apps";

/// Mime types downloaded and returned as text (besides `text/*`).
const TEXT_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-python",
];

/// Metadata fields requested for listings.
pub const LIST_FIELDS: &str = "files(id,name,mimeType,modifiedTime,size)";

/// Metadata fields requested before reading a file.
pub const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,webViewLink";

/// Drive file metadata as returned by `files.list` and `files.get`.
///
/// Drive encodes `size` as a decimal string and omits it for Workspace files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// What `read_file` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Workspace document exported to a text format.
    Exported {
        file: DriveFile,
        exported_as: &'static str,
        content: String,
    },
    /// Plain file whose bytes were valid UTF-8 of a text mime type.
    Text { file: DriveFile, content: String },
    /// Anything else; only metadata is returned.
    Binary { file: DriveFile },
    /// Workspace type with no text export (forms, drawings, folders...).
    Unsupported { file: DriveFile },
}

impl FileContent {
    pub fn file(&self) -> &DriveFile {
        match self {
            FileContent::Exported { file, .. }
            | FileContent::Text { file, .. }
            | FileContent::Binary { file }
            | FileContent::Unsupported { file } => file,
        }
    }
}

/// Export target for a Workspace mime type, if it has one.
pub fn export_format(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/vnd.google-apps.document" => Some("text/plain"),
        "application/vnd.google-apps.spreadsheet" => Some("text/csv"),
        "application/vnd.google-apps.presentation" => Some("text/plain"),
        _ => None,
    }
}

pub fn is_workspace(mime_type: &str) -> bool {
    mime_type.starts_with(WORKSPACE_PREFIX)
}

pub fn is_text(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || TEXT_MIME_TYPES.iter().any(|t| mime_type.starts_with(t))
}
