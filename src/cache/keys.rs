//! Cache key derivation.
//!
//! The key strings are a compatibility surface: existing deployments hold
//! entries under exactly these names, so the derivation must not change.

use crate::domain::types::UserCode;

/// Suffix of the per-user header-list key. An item-set heading equal to this
/// string would derive the same key as the header list itself, so writes to
/// the item namespace must refuse it.
pub const HEADER_LIST_SUFFIX: &str = "db_cache_headers";

/// Key holding the ordered list of headings for a user.
pub fn header_list(user_code: &UserCode) -> String {
    format!("{user_code}-{HEADER_LIST_SUFFIX}")
}

/// Key holding the cached item window for one heading.
pub fn item_window(user_code: &UserCode, heading: &str) -> String {
    format!("{user_code}-{heading}")
}

/// Key holding the full-availability flag for one heading.
pub fn full_flag(user_code: &UserCode, heading: &str) -> String {
    format!("{user_code}-{heading}-full_available")
}

/// Prefix shared by every cache key belonging to a user. Used for purge on
/// logout.
pub fn user_prefix(user_code: &UserCode) -> String {
    format!("{user_code}-")
}

/// True when a heading would clobber the header-list entry. The edit
/// boundary rejects such headings; the sync engine additionally skips the
/// write defensively.
pub fn heading_collides_with_header_key(heading: &str) -> bool {
    heading == HEADER_LIST_SUFFIX
}
