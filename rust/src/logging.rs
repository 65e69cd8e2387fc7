//! Per-model log handle.
//!
//! Each model owns a [`ModelLogger`] instead of reaching for a shared
//! logger. Records go through the `log` facade under the logger's own
//! target, so an application decides where (and whether) they end up.
//! Nothing is printed when no backend is installed.

use std::borrow::Cow;
use std::fmt;

use log::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLogger {
    target: Cow<'static, str>,
    enabled: bool,
}

impl Default for ModelLogger {
    fn default() -> Self {
        Self::new("synd::markov")
    }
}

impl ModelLogger {
    /// Create an enabled logger emitting under `target`.
    pub fn new(target: impl Into<Cow<'static, str>>) -> Self {
        Self {
            target: target.into(),
            enabled: true,
        }
    }

    /// Create a logger that drops every record.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled {
            log::log!(target: self.target.as_ref(), level, "{}", args);
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let logger = ModelLogger::default();
        assert_eq!(logger.target(), "synd::markov");
        assert!(logger.is_enabled());
    }

    #[test]
    fn test_disabled_logger() {
        let logger = ModelLogger::disabled();
        assert!(!logger.is_enabled());
        // Should not panic
        logger.info(format_args!("created model with {} states", 3));
    }

    #[test]
    fn test_owned_target() {
        let logger = ModelLogger::new(format!("synd::{}", "replica-2"));
        assert_eq!(logger.target(), "synd::replica-2");
        logger.debug(format_args!("no backend installed"));
    }
}
