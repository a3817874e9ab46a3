//! UUID utilities

use uuid::Uuid;

/// Generate a new record id in its stored (hyphenated string) form
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}
