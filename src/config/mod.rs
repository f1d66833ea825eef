//! Configuration module.
//!
//! Settings come from an optional TOML file, then environment overrides. See
//! [`loader`] for the precedence rules.

pub mod loader;

pub use loader::{
    apply_env_overrides, default_config_path, default_log_path, load_config, load_config_file,
    load_config_with_precedence, merge_config, ConfigError, ConfigFile, ResolvedConfig,
};

use crate::view_state::{capacity_for, ScreenBuffer};

impl ResolvedConfig {
    /// Number of lines a buffer for this view size holds.
    pub fn buffer_capacity(&self) -> usize {
        capacity_for(self.view_size)
    }

    /// An empty screen buffer set up from this configuration.
    pub fn screen_buffer(&self) -> ScreenBuffer {
        ScreenBuffer::new(self.view_size)
            .with_initial_position(self.initial_position)
            .with_position_search_iterations(self.position_search_iterations)
    }
}
