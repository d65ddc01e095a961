use crate::error::DownloadError;
use crate::handles::HandleRegistry;
use crate::session::ResultAsset;
use std::path::{Path, PathBuf};
use tracing::info;

const LAST_RESORT_NAME: &str = "image";

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Builds `<name>.<extension>` from a user-edited name.
///
/// The custom name is trimmed; when nothing is left the default name is used.
/// Path separators and control characters become `_`.
pub fn build_file_name(custom_name: &str, default_name: &str, extension: &str) -> String {
    let custom = custom_name.trim();
    let stem = if !custom.is_empty() {
        custom
    } else if !default_name.trim().is_empty() {
        default_name.trim()
    } else {
        LAST_RESORT_NAME
    };
    format!("{}.{}", sanitize(stem), extension)
}

/// Writes the bytes behind the result's current handle to `dir/file_name`
pub fn trigger_download(
    handles: &HandleRegistry,
    result: Option<&ResultAsset>,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf, DownloadError> {
    let result = result.ok_or(DownloadError::NoResult)?;
    let (bytes, _mime) = handles
        .resolve(&result.handle)
        .ok_or_else(|| DownloadError::HandleRevoked(result.handle.to_string()))?;

    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .map_err(|_| DownloadError::DirectoryCreationFailed(dir.to_path_buf()))?;
    }

    let path = dir.join(file_name);
    std::fs::write(&path, &bytes)?;
    info!(path = %path.display(), size = bytes.len(), "saved result");
    Ok(path)
}
