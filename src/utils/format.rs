//! Number formatting for progress messages

use num_format::{Locale, ToFormattedString};

/// Format an integer with comma thousands separators, e.g. `1234567` → `1,234,567`
pub fn group_thousands(value: u64) -> String {
    value.to_formatted_string(&Locale::en)
}
