//! Authenticated account identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display identity scraped from an authenticated portal session.
///
/// `sanitized_name` is the display name with every whitespace run replaced by
/// a single underscore. It is never empty: an empty or blank display name does
/// not produce an `Identity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    display_name: String,
    sanitized_name: String,
}

impl Identity {
    /// Build an identity from raw scraped text.
    ///
    /// Returns `None` when the text is absent after trimming.
    pub fn from_display_name(raw: &str) -> Option<Self> {
        let display_name = raw.trim();
        if display_name.is_empty() {
            return None;
        }

        Some(Self {
            display_name: display_name.to_string(),
            sanitized_name: sanitize(display_name),
        })
    }

    /// The display name as shown by the portal (trimmed).
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The whitespace-free form used in aliases and filenames.
    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    /// Filename-safe form of the sanitized name.
    ///
    /// Path separators and characters rejected by common filesystems are
    /// replaced with underscores so a display name can never escape the
    /// working directory.
    pub fn file_stem(&self) -> String {
        self.sanitized_name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect::<String>()
            .replace("..", "__")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

fn sanitize(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_runs_become_single_underscore() {
        let identity = Identity::from_display_name("  PEREZ   JUAN\tCARLOS \n").unwrap();
        assert_eq!(identity.display_name(), "PEREZ   JUAN\tCARLOS");
        assert_eq!(identity.sanitized_name(), "PEREZ_JUAN_CARLOS");
    }

    #[test]
    fn test_blank_text_is_not_an_identity() {
        assert!(Identity::from_display_name("").is_none());
        assert!(Identity::from_display_name("   \n\t").is_none());
    }

    #[test]
    fn test_file_stem_strips_path_components() {
        let identity = Identity::from_display_name("ACME S/A ../etc").unwrap();
        assert_eq!(identity.sanitized_name(), "ACME_S/A_../etc");
        let stem = identity.file_stem();
        assert!(!stem.contains('/'));
        assert!(!stem.contains(".."));
    }

    #[test]
    fn test_file_stem_keeps_accented_letters() {
        let identity = Identity::from_display_name("MUÑOZ JOSÉ").unwrap();
        assert_eq!(identity.file_stem(), "MUÑOZ_JOSÉ");
    }
}
