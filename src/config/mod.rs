//! Centralized configuration constants.

mod constants;

pub use constants::{MAX_COLUMNS, MAX_SLOTS_PER_PAGE, MIN_COLUMN_ID};
