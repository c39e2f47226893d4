//! Property-based tests for path manipulation functions.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{clean, is_within, relative_to};
    use proptest::prelude::*;
    use std::path::{Component, Path, PathBuf};

    fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                "[a-z0-9_-]{1,8}",
                Just(".".to_string()),
                Just("..".to_string()),
            ],
            0..8,
        )
    }

    fn join(parts: &[String]) -> PathBuf {
        let mut path = PathBuf::from("/");
        for part in parts {
            path.push(part);
        }
        path
    }

    // ============================================================================
    // clean property tests
    // ============================================================================

    proptest! {
        /// Property: clean always yields an absolute path
        #[test]
        fn clean_is_absolute(parts in segments()) {
            let cleaned = clean(&join(&parts));
            prop_assert!(cleaned.is_absolute());
        }

        /// Property: clean never leaves `.` or `..` segments behind
        #[test]
        fn clean_removes_dot_segments(parts in segments()) {
            let cleaned = clean(&join(&parts));
            for component in cleaned.components() {
                prop_assert!(
                    !matches!(component, Component::CurDir | Component::ParentDir),
                    "found dot segment in {:?}",
                    cleaned
                );
            }
        }

        /// Property: clean is idempotent
        #[test]
        fn clean_is_idempotent(parts in segments()) {
            let once = clean(&join(&parts));
            let twice = clean(&once);
            prop_assert_eq!(once, twice);
        }

        /// Property: a prefixed, cleaned path cannot escape its prefix
        #[test]
        fn prefixed_clean_stays_within_prefix(parts in segments()) {
            let prefix = Path::new("/sandbox");
            let inner = clean(&join(&parts));
            let translated = prefix.join(inner.strip_prefix("/").unwrap());
            prop_assert!(is_within(&translated, prefix));
        }
    }

    // ============================================================================
    // relative_to property tests
    // ============================================================================

    proptest! {
        /// Property: joining the relative path back onto its base restores the target
        #[test]
        fn relative_to_round_trips(from in segments(), to in segments()) {
            let from = clean(&join(&from));
            let to = clean(&join(&to));
            let relative = relative_to(&from, &to);
            prop_assert_eq!(clean(&from.join(relative)), to);
        }
    }
}
