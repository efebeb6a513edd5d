//! Shared request validation helpers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{Error, Result};

/// Repo and branch names end up as pool/dataset names and mount directories,
/// so they are restricted to DNS-label style slugs.
static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,62}$").expect("valid slug regex"));

/// Validate a repo or branch name
pub fn validate_slug(name: &str, what: &str) -> Result<()> {
    if SLUG.is_match(name) {
        Ok(())
    } else {
        Err(Error::validation_field(
            format!(
                "{} '{}' must start with a lowercase letter and contain only lowercase letters, digits and hyphens (max 63 chars)",
                what, name
            ),
            "name",
        ))
    }
}

/// validator-crate adapter for request DTO derive annotations
pub fn slug_rule(name: &str) -> std::result::Result<(), validator::ValidationError> {
    if SLUG.is_match(name) {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("slug");
        err.message = Some("must be a lowercase slug (letters, digits, hyphens)".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_slugs() {
        for name in ["main", "orders-db", "a", "feature-x2"] {
            assert!(validate_slug(name, "branch").is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn rejects_bad_slugs() {
        for name in ["", "Main", "9lives", "has_underscore", "has space", "-lead"] {
            assert!(validate_slug(name, "branch").is_err(), "{} should be invalid", name);
        }
    }

    #[test]
    fn rejects_overlong_slug() {
        let name = format!("a{}", "b".repeat(63));
        assert!(validate_slug(&name, "repo").is_err());
    }
}
