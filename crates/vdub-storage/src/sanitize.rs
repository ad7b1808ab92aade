//! Filename sanitization for client uploads.

/// Maximum length kept from a client-supplied filename.
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Reduce a client-supplied filename to a safe ASCII basename.
///
/// Directory components are dropped and whitespace becomes `_`. Anything
/// outside `[A-Za-z0-9._-]` is removed, runs of dots collapse to one, and
/// leading dots/underscores are stripped. The result may be empty, which
/// callers must treat as invalid.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for c in base.split_whitespace().collect::<Vec<_>>().join("_").chars() {
        let allowed = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        if allowed && !(c == '.' && cleaned.ends_with('.')) {
            cleaned.push(c);
        }
    }

    let trimmed = cleaned.trim_start_matches(|c: char| c == '.' || c == '_');

    if trimmed.len() > MAX_FILENAME_LENGTH {
        // Keep the extension when truncating
        match trimmed.rsplit_once('.') {
            Some((stem, ext)) if ext.len() < 10 => {
                let keep = MAX_FILENAME_LENGTH.saturating_sub(ext.len() + 1);
                format!("{}.{}", &stem[..keep.min(stem.len())], ext)
            }
            _ => trimmed[..MAX_FILENAME_LENGTH].to_string(),
        }
    } else {
        trimmed.to_string()
    }
}

/// Validate a stored artifact name.
///
/// Valid format: alphanumeric, hyphens, underscores, dots. No path traversal.
pub fn is_valid_artifact_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 256 {
        return false;
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("sample.mp4"), "sample.mp4");
        assert_eq!(secure_filename("my holiday video.mov"), "my_holiday_video.mov");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\clip.mp4"), "clip.mp4");
        assert_eq!(secure_filename(".hidden.mp4"), "hidden.mp4");
        assert_eq!(secure_filename("vidéo.mp4"), "vido.mp4");
        assert_eq!(secure_filename(""), "");
        assert_eq!(secure_filename("../.."), "");
    }

    #[test]
    fn test_dot_runs_collapse_into_a_valid_name() {
        assert_eq!(secure_filename("my..clip.mp4"), "my.clip.mp4");
        assert_eq!(secure_filename("take...2 .mp4"), "take.2_.mp4");
        assert!(is_valid_artifact_name(&format!(
            "5f0c_{}",
            secure_filename("my..clip.mp4")
        )));
    }

    #[test]
    fn test_secure_filename_truncates_keeping_extension() {
        let long = format!("{}.mp4", "a".repeat(300));
        let safe = secure_filename(&long);
        assert_eq!(safe.len(), MAX_FILENAME_LENGTH);
        assert!(safe.ends_with(".mp4"));
    }

    #[test]
    fn test_artifact_name_validation() {
        assert!(is_valid_artifact_name("5f0c_sample.mp4"));
        assert!(is_valid_artifact_name("abc_merged.mp4"));
        assert!(!is_valid_artifact_name("../etc/passwd"));
        assert!(!is_valid_artifact_name("dir/file.mp4"));
        assert!(!is_valid_artifact_name(""));
    }
}
