pub mod actions;
pub mod loggers;
pub mod properties;
pub mod services;
