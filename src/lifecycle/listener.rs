//! Application context listeners.
//!
//! Listeners are told once when the pipeline is ready and once when it is
//! torn down. Initialization runs in registration order and aborts startup
//! on the first failure; teardown runs in reverse order and only logs
//! failures so shutdown always completes.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error raised by a listener hook.
#[derive(Debug, Error)]
#[error("listener '{listener}': {message}")]
pub struct ListenerError {
    pub listener: String,
    pub message: String,
}

impl ListenerError {
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

/// Lifecycle hooks for the application context.
pub trait ContextListener: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn context_initialized(&self) -> Result<(), ListenerError> {
        Ok(())
    }

    fn context_destroyed(&self) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Logs context teardown.
#[derive(Debug, Default)]
pub struct LoggingContextListener;

impl ContextListener for LoggingContextListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn context_destroyed(&self) -> Result<(), ListenerError> {
        tracing::info!("Application context destroyed");
        Ok(())
    }
}

/// Ordered set of context listeners.
#[derive(Debug, Default, Clone)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn ContextListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: impl ContextListener + 'static) {
        tracing::debug!(listener = listener.name(), "Context listener registered");
        self.listeners.push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notify listeners in registration order; the first failure aborts.
    pub fn initialize_all(&self) -> Result<(), ListenerError> {
        for listener in &self.listeners {
            listener.context_initialized()?;
            tracing::debug!(listener = listener.name(), "Context listener initialized");
        }
        Ok(())
    }

    /// Notify listeners in reverse order. Returns the number of failures.
    pub fn destroy_all(&self) -> usize {
        let mut failures = 0;
        for listener in self.listeners.iter().rev() {
            if let Err(e) = listener.context_destroyed() {
                failures += 1;
                tracing::error!(listener = listener.name(), error = %e, "Context listener teardown failed");
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
        fail_destroy: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                fail_init: false,
                fail_destroy: false,
            }
        }
    }

    impl ContextListener for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn context_initialized(&self) -> Result<(), ListenerError> {
            self.log.lock().unwrap().push(format!("init:{}", self.name));
            if self.fail_init {
                return Err(ListenerError::new(self.name, "init failed"));
            }
            Ok(())
        }

        fn context_destroyed(&self) -> Result<(), ListenerError> {
            self.log.lock().unwrap().push(format!("destroy:{}", self.name));
            if self.fail_destroy {
                return Err(ListenerError::new(self.name, "destroy failed"));
            }
            Ok(())
        }
    }

    #[test]
    fn init_in_order_destroy_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.register(Recorder::new("a", &log));
        registry.register(Recorder::new("b", &log));

        registry.initialize_all().unwrap();
        assert_eq!(registry.destroy_all(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["init:a", "init:b", "destroy:b", "destroy:a"]
        );
    }

    #[test]
    fn init_failure_stops_startup() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.register(Recorder {
            fail_init: true,
            ..Recorder::new("a", &log)
        });
        registry.register(Recorder::new("b", &log));

        let err = registry.initialize_all().unwrap_err();
        assert_eq!(err.listener, "a");
        assert_eq!(*log.lock().unwrap(), vec!["init:a"]);
    }

    #[test]
    fn teardown_failures_do_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.register(Recorder::new("a", &log));
        registry.register(Recorder {
            fail_destroy: true,
            ..Recorder::new("b", &log)
        });

        assert_eq!(registry.destroy_all(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["destroy:b", "destroy:a"]);
    }
}
