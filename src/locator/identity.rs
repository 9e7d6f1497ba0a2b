pub fn normalize_label(raw: &str) -> Option<String> {
    let text = raw.trim();

    if text.is_empty() {
        return None;
    }

    // Drop obvious JS blobs that leak into text content
    if text.contains("function(") || text.contains("window.") || text.contains("document.") {
        return None;
    }

    // Collapse whitespace
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.chars().count() > 120 {
        return Some(normalized.chars().take(120).collect());
    }

    Some(normalized)
}

/// Section name for a landmark: lowercase, single spaces.
pub fn normalize_section(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if collapsed.is_empty() {
        "main".to_string()
    } else {
        collapsed
    }
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
