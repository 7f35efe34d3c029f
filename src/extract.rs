//! Reference extraction: field splitting and Drive-id recognition.

use regex::Regex;
use std::sync::OnceLock;

static FILE_PATH_RE: OnceLock<Regex> = OnceLock::new();
static ID_PARAM_RE: OnceLock<Regex> = OnceLock::new();

/// Split a raw field value into trimmed, non-empty reference tokens.
/// Separators are runs of comma, semicolon, or newline; encounter order
/// is preserved.
pub fn split_references(field_value: &str) -> Vec<String> {
    field_value
        .split(|c: char| matches!(c, ',' | ';' | '\n' | '\r'))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract the opaque Drive file id from a share link, if the reference
/// matches one of the recognized URL shapes (checked in order):
///   1. `/file/d/<id>/` path segment (id runs to the next `/`)
///   2. `id=<id>` query parameter (id runs to the next `&` or end)
/// Any other reference is opaque and passes through untouched.
pub fn extract_drive_id(reference: &str) -> Option<String> {
    let path_re =
        FILE_PATH_RE.get_or_init(|| Regex::new(r"/file/d/([^/]+)").expect("static regex"));
    if let Some(caps) = path_re.captures(reference) {
        return Some(caps[1].to_string());
    }
    let id_re = ID_PARAM_RE.get_or_init(|| Regex::new(r"[?&]id=([^&]+)").expect("static regex"));
    id_re.captures(reference).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_file_path_shape() {
        assert_eq!(
            extract_drive_id("https://drive.google.com/file/d/ABC123/view?usp=sharing"),
            Some("ABC123".to_string())
        );
    }

    #[test]
    fn test_extract_id_query_shape() {
        assert_eq!(
            extract_drive_id("https://drive.google.com/open?id=XYZ987"),
            Some("XYZ987".to_string())
        );
        assert_eq!(
            extract_drive_id("https://drive.google.com/uc?export=view&id=XYZ987&foo=1"),
            Some("XYZ987".to_string())
        );
    }

    #[test]
    fn test_path_shape_wins_over_query_shape() {
        assert_eq!(
            extract_drive_id("https://drive.google.com/file/d/PATH1/view?id=QUERY2"),
            Some("PATH1".to_string())
        );
    }

    #[test]
    fn test_opaque_references_yield_none() {
        assert_eq!(extract_drive_id("https://example.com/img.png"), None);
        assert_eq!(extract_drive_id("not a url at all"), None);
        assert_eq!(extract_drive_id(""), None);
    }

    #[test]
    fn test_split_preserves_order_and_drops_empties() {
        assert_eq!(
            split_references(" a.png ,, b.png ;\nc.png\n"),
            vec!["a.png", "b.png", "c.png"]
        );
        assert!(split_references("").is_empty());
        assert!(split_references(" , ;\n").is_empty());
    }

    #[test]
    fn test_split_keeps_duplicates_for_downstream_dedup() {
        assert_eq!(split_references("x,y,x"), vec!["x", "y", "x"]);
    }
}
