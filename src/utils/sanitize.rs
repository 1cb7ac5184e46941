//! Name validation for identifiers that end up in storage paths or table names.

use crate::AutoembedError;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a vector collection name before it becomes a table name.
///
/// Alphanumeric with underscores or hyphens, not starting with a hyphen.
pub fn validate_collection_name(name: &str) -> Result<&str, AutoembedError> {
    if name.is_empty() || name.starts_with('-') || !name.chars().all(is_valid_name_char) {
        return Err(AutoembedError::Validation(format!(
            "Invalid collection name '{}': must be alphanumeric with underscores or hyphens",
            name
        )));
    }
    Ok(name)
}

/// Validate a registry or model id before it is joined onto a filesystem path.
pub fn validate_path_segment(segment: &str) -> Result<&str, AutoembedError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || !segment
            .chars()
            .all(|c| is_valid_name_char(c) || c == '.')
    {
        return Err(AutoembedError::Validation(format!(
            "Invalid path segment '{}'",
            segment
        )));
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_collection_names() {
        assert!(validate_collection_name("listings").is_ok());
        assert!(validate_collection_name("car_listings-v2").is_ok());
    }

    #[test]
    fn test_invalid_collection_names() {
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("-listings").is_err());
        assert!(validate_collection_name("listings; REMOVE TABLE x").is_err());
        assert!(validate_collection_name("lis'tings").is_err());
    }

    #[test]
    fn test_path_segments() {
        assert!(validate_path_segment("model-2026-01-01-00-00-00-abc").is_ok());
        assert!(validate_path_segment("cars.v2").is_ok());
        assert!(validate_path_segment("..").is_err());
        assert!(validate_path_segment("a/b").is_err());
        assert!(validate_path_segment("").is_err());
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_valid_names_always_pass(name in "[a-zA-Z0-9_][a-zA-Z0-9_-]{0,30}") {
                prop_assert!(validate_collection_name(&name).is_ok());
            }

            #[test]
            fn prop_separators_never_pass(prefix in "[a-z]{1,5}", sep in "[/\\\\;' ]", suffix in "[a-z]{0,5}") {
                let name = format!("{prefix}{sep}{suffix}");
                prop_assert!(validate_collection_name(&name).is_err());
                prop_assert!(validate_path_segment(&name).is_err());
            }
        }
    }
}
