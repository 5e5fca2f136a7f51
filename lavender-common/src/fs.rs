use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use crate::error::{CommonError, CommonResult};

fn write_error(path: &Path, source: std::io::Error) -> CommonError {
    CommonError::Write {
        path: path.display().to_string(),
        source,
    }
}

/// Replaces `path` with the bytes of `reader`.
///
/// The data goes to a sibling temporary file first which is renamed over
/// `path` once complete, so readers observe either the old or the new
/// content. If anything fails before the rename the temporary file is
/// removed and `path` is untouched.
pub fn write_atomic_from<R: Read>(path: &Path, mut reader: R) -> CommonResult<u64> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| write_error(path, e))?;

    let written = std::io::copy(&mut reader, temp.as_file_mut()).map_err(|e| write_error(path, e))?;
    temp.as_file_mut()
        .sync_all()
        .map_err(|e| write_error(path, e))?;
    temp.persist(path).map_err(|e| write_error(path, e.error))?;

    tracing::trace!("atomically replaced {} ({} bytes)", path.display(), written);
    Ok(written)
}

pub fn write_atomic(path: &Path, data: &[u8]) -> CommonResult<()> {
    write_atomic_from(path, data).map(|_| ())
}

/// Writes a file nobody can reference yet: parent directories are created
/// and the content is written in place.
pub fn write_new_from<R: Read>(path: &Path, mut reader: R) -> CommonResult<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
    }
    let mut file = File::create(path).map_err(|e| write_error(path, e))?;
    let written = std::io::copy(&mut reader, &mut file).map_err(|e| write_error(path, e))?;
    file.flush().map_err(|e| write_error(path, e))?;
    Ok(written)
}
