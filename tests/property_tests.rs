//! Property-based tests for core domain types.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use tiny11_builder::core::catalog;
use tiny11_builder::core::types::{ImageIndex, IndexError, RegistryPatch};
use tiny11_builder::tools::parse_image_list;

proptest! {
    /// Every in-range number is accepted and round-trips.
    #[test]
    fn in_range_indices_accepted(count in 1u32..64, pick in 0u32..64) {
        let value = pick % count + 1;
        let index = ImageIndex::parse_in_range(&value.to_string(), count).unwrap();
        prop_assert_eq!(index.get(), value);
    }

    /// Zero and anything above the count are out of range.
    #[test]
    fn out_of_range_rejected(count in 1u32..64, excess in 1u64..1_000_000) {
        let above = u64::from(count) + excess;
        prop_assert_eq!(
            ImageIndex::parse_in_range(&above.to_string(), count),
            Err(IndexError::OutOfRange { value: above, count })
        );
        prop_assert!(
            matches!(
                ImageIndex::parse_in_range("0", count),
                Err(IndexError::OutOfRange { value: 0, .. })
            ),
            "zero must be out of range"
        );
    }

    /// Anything containing a non-digit is not a number, whatever the count.
    #[test]
    fn non_digits_rejected(input in ".*[^0-9\\s].*", count in 1u32..64) {
        prop_assert!(
            matches!(
                ImageIndex::parse_in_range(&input, count),
                Err(IndexError::NotANumber(_))
            ),
            "accepted {:?}",
            input
        );
    }

    /// Parsing never panics, and success implies the documented bounds.
    #[test]
    fn parse_is_total(input in "\\PC*", count in 0u32..16) {
        if let Ok(index) = ImageIndex::parse_in_range(&input, count) {
            prop_assert!(index.get() >= 1 && index.get() <= count);
        }
    }

    /// Surrounding whitespace is ignored.
    #[test]
    fn whitespace_is_trimmed(value in 1u32..10, pad in "[ \t]{0,3}") {
        let input = format!("{}{}{}\n", pad, value, pad);
        prop_assert_eq!(ImageIndex::parse_in_range(&input, 10).unwrap().get(), value);
    }

    /// Bloatware matching ignores case.
    #[test]
    fn bloatware_match_ignores_case(i in 0usize..catalog::BLOATWARE.len(), suffix in "[A-Za-z0-9_.]{0,20}") {
        let name = format!("{}{}", catalog::BLOATWARE[i].to_uppercase(), suffix);
        prop_assert!(catalog::is_bloatware(&name));
        prop_assert!(catalog::is_bloatware(&name.to_lowercase()));
    }

    /// The rendered edit script carries one DWORD line per value.
    #[test]
    fn registry_script_has_one_line_per_value(values in prop::collection::vec(("[A-Za-z]{1,12}", any::<u32>()), 0..8)) {
        let patch = RegistryPatch {
            root: "HKEY_LOCAL_MACHINE\\SYSTEM".to_string(),
            key: "Setup\\LabConfig".to_string(),
            comment: "test".to_string(),
            values,
        };
        let script = patch.render();
        prop_assert!(script.starts_with("Windows Registry Editor Version 5.00\n"));
        prop_assert_eq!(script.matches("=dword:").count(), patch.values.len());
    }

    /// The image-list parser never panics on arbitrary text.
    #[test]
    fn image_list_parser_is_total(text in "\\PC*") {
        let _ = parse_image_list(&text);
    }
}
