//! Content-Type resolution
//!
//! Turns whatever the client put in `content_type` (a MIME type, a MIME type
//! with parameters, or a bare file extension) into a canonical image MIME
//! type. Anything unrecognised resolves to [`DEFAULT_CONTENT_TYPE`].

use mime::Mime;

/// Fallback for empty or unrecognised hints
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Non-canonical image type names seen in the wild
const ALIASES: &[(&str, &str)] = &[
    ("image/jpg", "image/jpeg"),
    ("image/pjpeg", "image/jpeg"),
    ("image/x-png", "image/png"),
    ("image/x-bmp", "image/bmp"),
    ("image/x-ms-bmp", "image/bmp"),
    ("image/tif", "image/tiff"),
    ("image/svg", "image/svg+xml"),
    ("image/vnd.microsoft.icon", "image/x-icon"),
];

/// Resolve a client-supplied hint to a canonical content type.
///
/// Never fails and never returns an empty string.
pub fn content_type_from(raw: &str) -> String {
    // Whitespace is never significant outside quoted parameter values,
    // which are discarded anyway.
    let hint: String = raw.split_whitespace().collect();

    let resolved = match hint.parse::<Mime>() {
        Ok(mime) => canonical_image(&mime),
        Err(_) => from_extension(hint.strip_prefix('.').unwrap_or(&hint)),
    };
    resolved.unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Canonical essence of a known `image/*` type
fn canonical_image(mime: &Mime) -> Option<String> {
    if mime.type_() != mime::IMAGE {
        return None;
    }
    let essence = mime.essence_str();
    if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == essence) {
        return Some((*canonical).to_string());
    }
    mime_guess::get_mime_extensions_str(essence).map(|_| essence.to_string())
}

fn from_extension(ext: &str) -> Option<String> {
    if ext.is_empty() {
        return None;
    }
    mime_guess::from_ext(ext)
        .iter()
        .find_map(|mime| canonical_image(&mime))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &[&str] = &[
        "image/png",
        "image/jpeg",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/tiff",
        "image/svg+xml",
        "image/x-icon",
    ];

    #[test]
    fn test_default_matches_mime_constant() {
        assert_eq!(DEFAULT_CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.essence_str());
    }

    #[test]
    fn test_canonical_types_pass_through() {
        for canonical in CANONICAL {
            assert_eq!(content_type_from(canonical), *canonical);
        }
    }

    #[test]
    fn test_aliases_and_case() {
        assert_eq!(content_type_from("image/jpg"), "image/jpeg");
        assert_eq!(content_type_from("image/x-png"), "image/png");
        assert_eq!(content_type_from("IMAGE/PNG"), "image/png");
        assert_eq!(content_type_from("image/vnd.microsoft.icon"), "image/x-icon");
        assert_eq!(content_type_from("image/svg"), "image/svg+xml");
    }

    #[test]
    fn test_parameters_and_whitespace_are_ignored() {
        assert_eq!(content_type_from(" image/webp ; q=0.9"), "image/webp");
        assert_eq!(content_type_from("image/gif;charset=binary"), "image/gif");
    }

    #[test]
    fn test_extensions() {
        assert_eq!(content_type_from("jpg"), "image/jpeg");
        assert_eq!(content_type_from(".PNG"), "image/png");
        assert_eq!(content_type_from("tif"), "image/tiff");
        assert_eq!(content_type_from("svg"), "image/svg+xml");
    }

    #[test]
    fn test_non_image_extensions_fall_back() {
        assert_eq!(content_type_from("pdf"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_from(".html"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_fallback_is_never_empty() {
        for raw in ["", "   ", ";", ".", "text/plain", "application/pdf", "image/unknown"] {
            let resolved = content_type_from(raw);
            assert_eq!(resolved, DEFAULT_CONTENT_TYPE, "hint {raw:?}");
            assert!(!resolved.is_empty());
        }
    }
}
