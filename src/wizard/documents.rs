//! Document slots and the file constraints enforced before any upload.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// The four named uploads a loan application needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSlot {
    BankStatement,
    NationalId,
    AddressVerification,
    GuarantorId,
}

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 4] = [
        DocumentSlot::BankStatement,
        DocumentSlot::NationalId,
        DocumentSlot::AddressVerification,
        DocumentSlot::GuarantorId,
    ];

    /// Name used on the wire.
    pub fn key(&self) -> &'static str {
        match self {
            DocumentSlot::BankStatement => "bank_statement",
            DocumentSlot::NationalId => "national_id",
            DocumentSlot::AddressVerification => "address_verification",
            DocumentSlot::GuarantorId => "guarantor_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentSlot::BankStatement => "Bank statement",
            DocumentSlot::NationalId => "National ID",
            DocumentSlot::AddressVerification => "Address verification",
            DocumentSlot::GuarantorId => "Guarantor ID",
        }
    }
}

impl fmt::Display for DocumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Svg,
    Jpeg,
    Png,
    Pdf,
}

impl MediaType {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "svg" => Some(MediaType::Svg),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Svg => "image/svg+xml",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Pdf => "application/pdf",
        }
    }
}

/// Reference to a file the user picked. Contents are only read at upload time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRef {
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size_bytes: u64,
    pub media_type: Option<MediaType>,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let media_type = MediaType::from_file_name(&name);
        Self {
            name,
            path,
            size_bytes,
            media_type,
        }
    }

    /// Builds a reference from a file on disk, reading only its metadata.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        Ok(Self::new(path, metadata.len()))
    }
}

/// Files attached per slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentSet(BTreeMap<DocumentSlot, FileRef>);

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: DocumentSlot, file: FileRef) -> Self {
        self.insert(slot, file);
        self
    }

    pub fn insert(&mut self, slot: DocumentSlot, file: FileRef) {
        self.0.insert(slot, file);
    }

    pub fn remove(&mut self, slot: DocumentSlot) -> Option<FileRef> {
        self.0.remove(&slot)
    }

    pub fn get(&self, slot: DocumentSlot) -> Option<&FileRef> {
        self.0.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentSlot, &FileRef)> {
        self.0.iter().map(|(slot, file)| (*slot, file))
    }

    pub fn missing(&self) -> Vec<DocumentSlot> {
        DocumentSlot::ALL
            .iter()
            .copied()
            .filter(|slot| !self.0.contains_key(slot))
            .collect()
    }
}

/// Checks that every slot is filled with an accepted file under the limit.
pub fn validate_set(set: &DocumentSet, max_bytes: u64) -> Result<(), String> {
    let missing = set.missing();
    if !missing.is_empty() {
        let labels = missing
            .iter()
            .map(|slot| slot.label())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!("Upload all four documents (missing: {})", labels));
    }
    for (slot, file) in set.iter() {
        validate_file(slot, file, max_bytes)?;
    }
    Ok(())
}

pub fn validate_file(slot: DocumentSlot, file: &FileRef, max_bytes: u64) -> Result<(), String> {
    if file.media_type.is_none() {
        return Err(format!(
            "{} must be an SVG, JPEG, PNG or PDF file",
            slot.label()
        ));
    }
    if file.size_bytes > max_bytes {
        return Err(format!(
            "{} exceeds the {} limit",
            slot.label(),
            size_limit(max_bytes)
        ));
    }
    Ok(())
}

/// Prompt hint naming the accepted types and the configured size limit.
pub fn upload_hint(max_bytes: u64) -> String {
    format!(
        "Path to an SVG, JPEG, PNG or PDF file up to {}",
        size_limit(max_bytes)
    )
}

fn size_limit(max_bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    if max_bytes >= MB {
        format!("{} MB", max_bytes / MB)
    } else {
        format!("{} KB", max_bytes / 1024)
    }
}
