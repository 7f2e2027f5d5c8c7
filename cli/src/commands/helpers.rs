use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use larder_core::images::ImageStore;
use larder_core::models::IngredientInput;
use larder_core::service::store_image;

/// Parse `NAME[:QTY[:UNIT]]`, e.g. `"Flour:2:cups"` or `"Salt"`.
pub(crate) fn parse_ingredient_arg(s: &str) -> Result<IngredientInput> {
    let mut parts = s.splitn(3, ':').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        bail!("Invalid ingredient '{s}'. Use NAME[:QTY[:UNIT]], e.g. 'Flour:2:cups'");
    }
    let quantity = parts.next().unwrap_or_default();
    let unit = parts.next().unwrap_or_default();
    Ok(IngredientInput::new(name, quantity, unit))
}

/// Parse `KEY=NOTE` for `grocery --note`.
pub(crate) fn parse_note_arg(s: &str) -> Result<(&str, &str)> {
    let (key, note) = s
        .split_once('=')
        .with_context(|| format!("Invalid note '{s}'. Use KEY=NOTE, e.g. '12=organic'"))?;
    Ok((key.trim(), note.trim()))
}

pub(crate) fn content_type_for_path(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        _ => bail!(
            "Unsupported image '{}'. Use a png, jpg, gif, or webp file",
            path.display()
        ),
    }
}

/// Copy an image file into the store and return its reference.
pub(crate) fn upload_image_file(images: &dyn ImageStore, path: &Path) -> Result<String> {
    let content_type = content_type_for_path(path)?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(store_image(images, &bytes, content_type)?)
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// `2 cups`, `3`, or empty, for table cells.
pub(crate) fn amount(quantity: &str, unit: &str) -> String {
    match (quantity.trim(), unit.trim()) {
        ("", "") => String::new(),
        (q, "") => q.to_string(),
        ("", u) => u.to_string(),
        (q, u) => format!("{q} {u}"),
    }
}
