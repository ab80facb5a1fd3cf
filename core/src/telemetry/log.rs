use log::{debug, info};

/// Thin facade over the `log` macros, optionally tagged with the pipeline
/// component it reports for.
pub struct LogManager {
    scope: Option<&'static str>,
}

impl LogManager {
    pub fn new() -> Self {
        Self { scope: None }
    }

    pub fn scoped(scope: &'static str) -> Self {
        Self { scope: Some(scope) }
    }

    pub fn record(&self, message: &str) {
        match self.scope {
            Some(scope) => info!("[{}] {}", scope, message),
            None => info!("{}", message),
        }
    }

    pub fn record_debug(&self, message: &str) {
        match self.scope {
            Some(scope) => debug!("[{}] {}", scope, message),
            None => debug!("{}", message),
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
