use anyhow::{anyhow, Context};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Path of the saved file relative to the workspace, usable as a
    /// handle for later existence checks and deletion.
    pub handle: String,
    pub sha256: String,
    pub size: usize,
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn resolve_handle(workspace: &Path, handle: &str) -> anyhow::Result<PathBuf> {
    let relative = Path::new(handle);
    if relative.is_absolute()
        || relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(anyhow!("invalid upload handle: {handle}"));
    }
    Ok(workspace.join(relative))
}

/// Save raw sheet bytes under the workspace uploads directory. The stored
/// name is a timestamp prefix plus the sanitized original name, so repeat
/// uploads of the same file never clobber each other.
pub fn save_upload(
    workspace: &Path,
    bytes: &[u8],
    original_name: &str,
) -> anyhow::Result<StoredUpload> {
    let dir = workspace.join(UPLOADS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;

    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let filename = format!("{}_{}", stamp, sanitize_filename(original_name));
    let path = dir.join(&filename);
    std::fs::write(&path, bytes)
        .with_context(|| format!("failed to write upload {}", path.to_string_lossy()))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    Ok(StoredUpload {
        handle: format!("{UPLOADS_DIR}/{filename}"),
        sha256,
        size: bytes.len(),
    })
}

pub fn upload_exists(workspace: &Path, handle: &str) -> anyhow::Result<bool> {
    Ok(resolve_handle(workspace, handle)?.is_file())
}

pub fn delete_upload(workspace: &Path, handle: &str) -> anyhow::Result<()> {
    let path = resolve_handle(workspace, handle)?;
    std::fs::remove_file(&path)
        .with_context(|| format!("failed to delete upload {}", path.to_string_lossy()))
}
