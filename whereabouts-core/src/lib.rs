//! WHEREABOUTS Core - Entity Types
//!
//! Pure data types shared by every crate in the workspace. This crate
//! contains ONLY data types and their validation - no I/O, no pipeline
//! logic.

pub mod error;
pub mod location;
pub mod username;

pub use error::{StoreError, ValidationError, WhereaboutsError, WhereaboutsResult};
pub use location::{CachedLocation, Location, StoredLocation, LOCATION_MAX_LEN};
pub use username::{Username, USERNAME_MAX_LEN};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
