use std::path::{Path, PathBuf};

/// Maximum length of a single path component on common filesystems
const MAX_COMPONENT_LENGTH: usize = 255;

/// Validate that a remote filename can be written as a single entry inside an album folder.
pub fn validate_item_filename(filename: &str) -> Result<(), String> {
    if filename.is_empty() {
        return Err("Filename is empty".to_string());
    }

    if filename.len() > MAX_COMPONENT_LENGTH {
        return Err(format!("Filename too long (max {MAX_COMPONENT_LENGTH} bytes)"));
    }

    if filename.bytes().any(|b| b == 0) {
        return Err("Filename contains null bytes".to_string());
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err("Filename contains a path separator".to_string());
    }

    if filename == "." || filename == ".." {
        return Err("Filename is a relative directory reference".to_string());
    }

    Ok(())
}

/// Turn an album title into a folder name that stays inside the local sync folder.
///
/// Separators become `_` and a title made only of dots is prefixed so it can't
/// address a parent directory. Ordinary titles pass through unchanged.
pub fn album_folder_name(title: &str) -> String {
    let mut name: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        name = format!("_{name}");
    }

    name
}

/// Resolve the local folder for an album under `root`.
pub fn album_folder(root: &Path, title: &str) -> PathBuf {
    root.join(album_folder_name(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Component;

    fn is_direct_child(base: &Path, candidate: &Path) -> bool {
        let Ok(rest) = candidate.strip_prefix(base) else {
            return false;
        };

        let mut components = rest.components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }

    #[test]
    fn test_validate_item_filename_rejects_traversal() {
        assert!(validate_item_filename("../evil.jpg").is_err());
        assert!(validate_item_filename("..\\evil.jpg").is_err());
        assert!(validate_item_filename("..").is_err());
        assert!(validate_item_filename("sub/dir.jpg").is_err());
    }

    #[test]
    fn test_validate_item_filename_rejects_null_bytes() {
        assert!(validate_item_filename("p1\0.jpg").is_err());
        assert!(validate_item_filename("").is_err());
    }

    #[test]
    fn test_validate_item_filename_accepts_valid() {
        assert!(validate_item_filename("p1.jpg").is_ok());
        assert!(validate_item_filename("IMG 2023-07-01 (1).HEIC").is_ok());
        assert!(validate_item_filename("..hidden.jpg").is_ok());
    }

    #[test]
    fn test_album_folder_name_keeps_plain_titles() {
        assert_eq!(album_folder_name("Vacation 2023"), "Vacation 2023");
        assert_eq!(album_folder_name("A"), "A");
    }

    #[test]
    fn test_album_folder_name_neutralises_separators() {
        assert_eq!(album_folder_name("2023/2024"), "2023_2024");
        assert_eq!(album_folder_name(".."), "_..");
        assert_eq!(album_folder_name(""), "_");
    }

    #[test]
    fn test_album_folder_stays_under_root() {
        let root = Path::new("/tmp/x");
        for title in ["A", "../escape", "..", "a\\b", " "] {
            let folder = album_folder(root, title);
            assert!(is_direct_child(root, &folder), "{title:?} -> {folder:?}");
        }
    }
}
