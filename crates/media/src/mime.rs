use std::path::Path;

/// Fallback extension when neither the MIME type nor a file name helps.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Declared by senders that do not know the type; says nothing about the file.
const OPAQUE: &str = "application/octet-stream";

/// Strip parameters (`audio/ogg; codecs=opus` → `audio/ogg`) and lowercase.
pub fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Extensions for types whose registered list does not lead with the
/// conventional one (`image/jpeg` lists `jfif` first).
fn preferred(essence: &str) -> Option<&'static str> {
    let ext = match essence {
        "image/jpeg" | "image/jpg" => "jpg",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/aac" => "aac",
        "audio/amr" => "amr",
        "video/3gpp" => "3gp",
        "text/plain" => "txt",
        _ => return None,
    };
    Some(ext)
}

/// Map a MIME type to a file extension (without the dot).
///
/// Falls through to the `mime_guess` registry, preferring an extension equal
/// to the subtype (`audio/ogg` → `ogg`, not `oga`).
pub fn extension_for(mime: &str) -> Option<&'static str> {
    let essence = essence(mime);
    if let Some(ext) = preferred(&essence) {
        return Some(ext);
    }
    if essence == OPAQUE || !essence.contains('/') || essence.contains('*') {
        return None;
    }
    let known = mime_guess::get_mime_extensions_str(&essence)?;
    let subtype = essence.split('/').nth(1).unwrap_or_default();
    known
        .iter()
        .find(|ext| **ext == subtype)
        .or_else(|| known.first())
        .copied()
}

/// Pick an extension from the MIME type, then the original file name, then `bin`.
pub fn choose_extension(mime: &str, file_name: Option<&str>) -> String {
    if let Some(ext) = extension_for(mime) {
        return ext.to_string();
    }
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
