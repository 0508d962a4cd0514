//! # SOR Configuration
//!
//! Configuration structures and loading for the smart order router.
//!
//! ## Features
//!
//! - **Router Parameters**: hop and pool bounds, optimizer tolerance, gas model
//! - **Settings Loading**: TOML file plus `SOR_` environment overrides
//! - **Validation**: every loaded config is checked before use
//!
//! ## Usage
//!
//! ```no_run
//! use sor_config::SorSettings;
//!
//! let settings = SorSettings::load(Some(std::path::Path::new("router.toml")))?;
//! assert!(settings.router.max_hops >= 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod router;
pub mod settings;

// Re-export commonly used types
pub use router::{defaults, RouterConfig};
pub use settings::{SorSettings, ENV_PREFIX};
