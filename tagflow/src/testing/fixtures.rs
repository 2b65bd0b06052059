//! Item name fixtures.

use crate::core::Envelope;

/// The three names of the registration demo.
#[must_use]
pub fn registration_names() -> Vec<String> {
    vec!["Alice".to_string(), "Bob".to_string(), "Charlie".to_string()]
}

/// Returns `count` distinct names: `item-000`, `item-001`, ...
#[must_use]
pub fn numbered_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("item-{i:03}")).collect()
}

/// Builds submissions for `names`, skipping any invalid name.
#[must_use]
pub fn submissions<S: AsRef<str>>(names: &[S]) -> Vec<Envelope> {
    names
        .iter()
        .filter_map(|name| Envelope::submission(name.as_ref()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_names_are_distinct() {
        let names = numbered_names(12);
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "item-000");
        assert_eq!(names[11], "item-011");

        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn test_submissions_skip_invalid() {
        let envs = submissions(&["Alice", "", "Bob"]);
        assert_eq!(envs.len(), 2);
        assert_eq!(registration_names().len(), 3);
    }
}
