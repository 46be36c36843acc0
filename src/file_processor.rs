use md5::{Digest, Md5};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::context::SharefileSettings;
use crate::errors::AppResult;
use crate::security::InputValidator;

/// Read size used when hashing large files.
const CHECKSUM_READ_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Others,
}

impl FileCategory {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "webp" => FileCategory::Image,
            "mp4" => FileCategory::Video,
            _ => FileCategory::Others,
        }
    }

    /// Endpoint under `/message` or `/group` that accepts this category.
    pub fn endpoint(&self) -> &'static str {
        match self {
            FileCategory::Image => "photo_original/upload",
            FileCategory::Video | FileCategory::Others => "asyncfile/upload",
        }
    }

    /// Whether the server finishes this upload later over the real-time
    /// channel instead of in the HTTP response.
    pub fn completes_asynchronously(&self) -> bool {
        !matches!(self, FileCategory::Image)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub file_name: String,
    pub total_size: u64,
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct ClassifiedFile {
    pub file_path: String,
    pub category: FileCategory,
    pub metadata: FileMetadata,
}

pub fn get_file_extension(file_path: &str) -> String {
    Path::new(file_path)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn get_file_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

pub fn get_file_size(file_path: &str) -> AppResult<u64> {
    let metadata = std::fs::metadata(file_path)?;
    Ok(metadata.len())
}

/// Width, height and byte size of an image, read from its header.
pub fn get_image_info(file_path: &str) -> AppResult<(u32, u32, u64)> {
    let file_size = get_file_size(file_path)?;

    let reader = image::ImageReader::open(file_path)?.with_guessed_format()?;
    let dimensions = reader.into_dimensions()?;

    Ok((dimensions.0, dimensions.1, file_size))
}

/// Classify a file and collect the metadata its category needs, enforcing
/// the server's extension and size policy on the way.
pub fn classify_file(file_path: &str, settings: &SharefileSettings) -> AppResult<ClassifiedFile> {
    InputValidator::validate_file_exists(file_path)?;

    let ext = get_file_extension(file_path);
    let file_name = get_file_name(file_path);

    InputValidator::validate_extension(settings, &ext)?;

    let category = FileCategory::from_extension(&ext);
    let metadata = match category {
        FileCategory::Image => {
            let (width, height, total_size) = get_image_info(file_path)?;
            FileMetadata {
                file_name,
                total_size,
                dimensions: Some((width, height)),
            }
        }
        FileCategory::Video | FileCategory::Others => FileMetadata {
            file_name,
            total_size: get_file_size(file_path)?,
            dimensions: None,
        },
    };

    InputValidator::validate_file_size(settings, &metadata.file_name, metadata.total_size)?;

    log::debug!(
        "Classified {} as {:?} ({} bytes)",
        file_path,
        category,
        metadata.total_size
    );

    Ok(ClassifiedFile {
        file_path: file_path.to_string(),
        category,
        metadata,
    })
}

/// MD5 of the whole file as lowercase hex, read in 2 MiB pieces so large
/// videos are never held in memory twice.
pub async fn compute_checksum(file_path: &str) -> AppResult<String> {
    let mut file = tokio::fs::File::open(file_path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHECKSUM_READ_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
