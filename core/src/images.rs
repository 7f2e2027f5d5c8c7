use anyhow::Result;

/// Storage for recipe images, addressed by an opaque reference string.
///
/// The server implements this on local disk; tests use an in-memory fake.
pub trait ImageStore: Send + Sync {
    /// Store `bytes` and return the reference to record on the recipe.
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String>;
    fn delete(&self, reference: &str) -> Result<()>;
}

/// Map an accepted image MIME type to the file extension it is stored under.
#[must_use]
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
