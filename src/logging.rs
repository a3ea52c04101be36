use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Handle to the installed log filter. `CONFIG SET loglevel` swaps the
/// filter through it while the server runs.
#[derive(Clone)]
pub struct LogHandle(reload::Handle<EnvFilter, Registry>);

impl LogHandle {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>) -> Self {
        LogHandle(handle)
    }

    pub fn set(&self, directives: &str) -> Result<(), String> {
        let filter = parse_filter(directives)?;
        self.0.reload(filter).map_err(|e| e.to_string())
    }

    /// The active filter directives.
    pub fn current(&self) -> Option<String> {
        self.0.with_current(|filter| filter.to_string()).ok()
    }
}

pub fn parse_filter(directives: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directives).map_err(|e| format!("Invalid loglevel '{directives}': {e}"))
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `loglevel`.
pub fn init(loglevel: &str) -> LogHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(loglevel));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogHandle::new(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_changes_active_filter() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        let _subscriber = Registry::default().with(layer);
        let handle = LogHandle::new(handle);

        handle.set("debug").unwrap();
        assert_eq!(handle.current().as_deref(), Some("debug"));

        assert!(handle.set("stockd=loud").is_err());
        assert_eq!(handle.current().as_deref(), Some("debug"));
    }
}
