//! Configuration for serial-events.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the first location that exists:
//!
//! 1. `SERIAL_EVENTS_CONFIG` environment variable (explicit path)
//! 2. `./serial-events.toml` (current directory)
//! 3. `~/.config/serial-events/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-events\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Values can be overridden with `SERIAL_EVENTS_<SECTION>_<KEY>`, e.g.
//! `SERIAL_EVENTS_SERIAL_DEFAULT_BAUD=9600` or `SERIAL_EVENTS_LOGGING_LEVEL=debug`.
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_events::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Default baud: {}", loader.config().serial.default_baud);
//! # Ok::<(), serial_events::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
