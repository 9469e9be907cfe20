//! Console configuration
//!
//! Four layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config (~/.config/dromio/console.toml)
//! 3. Explicit file passed with `--config`
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::{ApiSettings, ConsoleSettings, PollSettings};
