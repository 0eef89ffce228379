//! Configuration: database location, logging and display settings.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, DisplaySettings, LoggingSettings, Settings, SettingsError,
    CONFIG_ENV, LOCAL_CONFIG,
};
