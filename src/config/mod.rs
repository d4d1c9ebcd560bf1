//! Service settings.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MirrorSettings (validated, immutable)
//!     → MirrorOptions / admin / observability at startup
//! ```
//!
//! # Design Decisions
//! - Settings are read once at startup; the datacenter config itself is the
//!   live, store-backed part
//! - All fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, parse_settings, ConfigError};
pub use schema::{AdminSettings, MirrorSettings, ObservabilitySettings, StoreSettings, SyncSettings};
pub use validation::{validate_settings, ValidationError};
