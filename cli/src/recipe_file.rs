use std::path::Path;

use anyhow::{Context, Result, bail};

use larder_core::models::RecipeUpload;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10 MB

/// Build an upload from raw file contents.
///
/// The title is the override if given, else the `title` metadata of a
/// Cooklang file, else the file name without its extension.
pub fn build_upload(
    original_name: &str,
    bytes: Vec<u8>,
    title: Option<String>,
) -> Result<RecipeUpload> {
    if bytes.is_empty() {
        bail!("Recipe file '{original_name}' is empty");
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        bail!(
            "Recipe file '{original_name}' is too large ({} bytes, limit {MAX_UPLOAD_BYTES})",
            bytes.len()
        );
    }

    let is_cook = Path::new(original_name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("cook"));

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            if is_cook {
                std::str::from_utf8(&bytes).ok().and_then(cooklang_title)
            } else {
                None
            }
        })
        .or_else(|| {
            Path::new(original_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(String::from)
        })
        .unwrap_or_else(|| "Untitled recipe".to_string());

    let content_type = if is_cook {
        "text/plain".to_string()
    } else {
        mime_guess::from_path(original_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    };

    Ok(RecipeUpload {
        title,
        original_name: original_name.to_string(),
        content_type,
        bytes,
    })
}

/// Read a recipe file from disk and build its upload.
pub fn read_upload(path: &Path, title: Option<String>) -> Result<RecipeUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Recipe file name is not valid UTF-8")?;
    build_upload(name, bytes, title)
}

fn cooklang_title(input: &str) -> Option<String> {
    match cooklang::parse(input).into_result() {
        Ok((recipe, _report)) => recipe
            .metadata
            .title()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::debug!("not a valid Cooklang file: {e}");
            None
        }
    }
}
