use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::AppError;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";
/// Route prefix the upload directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

const OCTET_STREAM: &str = "application/octet-stream";
const MAX_EXTENSION_LEN: usize = 10;

/// A file written to the upload directory for a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub storage_path: PathBuf,
    pub stored_name: String,
    pub original_filename: String,
    pub mime_type: String,
}

impl UploadedFile {
    /// URL path the file is reachable at through the static uploads route.
    pub fn public_path(&self) -> String {
        format!("{}/{}", UPLOADS_ROUTE, self.stored_name)
    }
}

/// Builds the on-disk name for an upload: `<unix-millis>-<token><.ext>`.
///
/// The clock reading and the random token are inputs, so the name is fully
/// determined by its arguments. Two calls with different tokens never collide.
/// The original extension is kept (lower-cased) only if it is short and
/// alphanumeric; anything else is dropped rather than written into the path.
pub fn generate_storage_name(original_filename: &str, now: DateTime<Utc>, token: Uuid) -> String {
    let stem = format!("{}-{}", now.timestamp_millis(), token.simple());
    match safe_extension(original_filename) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

fn safe_extension(original_filename: &str) -> Option<String> {
    // Browsers on Windows may send full paths
    let base = original_filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let ext = Path::new(base).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Prefer the part's declared content type, falling back to sniffing the leading bytes.
fn resolve_mime_type(declared: Option<&str>, head: &[u8]) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != OCTET_STREAM => mime.to_string(),
        _ => image::guess_format(head)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| OCTET_STREAM.to_string()),
    }
}

fn invalid_multipart(err: MultipartError) -> AppError {
    AppError::InvalidUpload(format!("Invalid multipart request: {err}"))
}

/// Persists uploaded images into a single directory.
///
/// Stored files are never removed once a request completes.
#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Extract the single `image` file from the form and write it to disk.
    ///
    /// Other fields are skipped. An `image` part with an empty filename and no
    /// content (an empty file input) counts as absent. A second image part
    /// rejects the whole request. Any failure after the image was written
    /// removes it again, so an error response never leaves a file behind.
    pub async fn save(&self, multipart: &mut Multipart) -> Result<UploadedFile, AppError> {
        let mut uploaded: Option<UploadedFile> = None;

        match self.read_fields(multipart, &mut uploaded).await {
            Ok(()) => uploaded.ok_or(AppError::NoImage),
            Err(err) => {
                if let Some(file) = uploaded.take() {
                    discard(&file.storage_path).await;
                }
                Err(err)
            }
        }
    }

    async fn read_fields(
        &self,
        multipart: &mut Multipart,
        uploaded: &mut Option<UploadedFile>,
    ) -> Result<(), AppError> {
        while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
            if field.name() != Some(IMAGE_FIELD) {
                continue;
            }
            // Plain text value under the image name, not a file
            let Some(original_filename) = field.file_name().map(str::to_string) else {
                continue;
            };

            let Some(file) = self.write_field(field, original_filename).await? else {
                continue;
            };

            if uploaded.is_some() {
                discard(&file.storage_path).await;
                return Err(AppError::InvalidUpload(
                    "Only one image may be uploaded".to_string(),
                ));
            }
            *uploaded = Some(file);
        }

        Ok(())
    }

    async fn write_field(
        &self,
        mut field: Field<'_>,
        original_filename: String,
    ) -> Result<Option<UploadedFile>, AppError> {
        let declared = field.content_type().map(str::to_string);
        let first = field.chunk().await.map_err(invalid_multipart)?;
        if first.is_none() && original_filename.is_empty() {
            return Ok(None);
        }

        let stored_name = generate_storage_name(&original_filename, Utc::now(), Uuid::new_v4());
        let storage_path = self.dir.join(&stored_name);
        let mime_type = resolve_mime_type(declared.as_deref(), first.as_deref().unwrap_or_default());

        match write_chunks(&storage_path, first, &mut field).await {
            Ok(size) => {
                tracing::debug!(
                    path = %storage_path.display(),
                    original = %original_filename,
                    mime = %mime_type,
                    size,
                    "stored upload"
                );
                Ok(Some(UploadedFile {
                    storage_path,
                    stored_name,
                    original_filename,
                    mime_type,
                }))
            }
            Err(err) => {
                discard(&storage_path).await;
                Err(err)
            }
        }
    }
}

async fn write_chunks(
    path: &Path,
    first: Option<Bytes>,
    field: &mut Field<'_>,
) -> Result<u64, AppError> {
    let mut file = fs::File::create(path).await?;
    let mut size = 0u64;

    let mut next = first;
    while let Some(chunk) = next {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
        next = field.chunk().await.map_err(invalid_multipart)?;
    }

    file.flush().await?;
    Ok(size)
}

async fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), "failed to remove partial upload: {}", err);
    }
}
