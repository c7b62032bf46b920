//! Per-connection event name → handler table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sokio_core::Event;

/// A locally registered event handler.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Ordered handler lists keyed by event name.
///
/// Handlers run synchronously, in registration order, on the task that
/// dispatches the event. The table lock is not held while they run, so a
/// handler may register further handlers.
#[derive(Default)]
pub struct CallbackRouter {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `name`.
    pub fn register(&self, name: impl Into<String>, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.handlers
            .lock()
            .entry(name.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every handler registered for the event's name. Returns how many ran.
    pub fn execute(&self, event: &Event) -> usize {
        let handlers = match self.handlers.lock().get(event.name()) {
            Some(list) => list.clone(),
            None => return 0,
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.lock().get(name).map_or(0, Vec::len)
    }

    pub fn clear(&self, name: &str) {
        self.handlers.lock().remove(name);
    }

    pub fn clear_all(&self) {
        self.handlers.lock().clear();
    }
}

impl std::fmt::Debug for CallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        let mut names: Vec<&String> = handlers.keys().collect();
        names.sort();
        f.debug_struct("CallbackRouter").field("events", &names).finish()
    }
}
