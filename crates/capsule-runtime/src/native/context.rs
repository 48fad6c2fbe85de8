//! Thread-local qualification context for native initializers.
//!
//! Native initializers only know their unit's short name. While one runs,
//! the loader publishes the full qualified name here so registrations made
//! under the short name land under the right key. Scopes nest: entering a
//! scope saves whatever was published before and dropping it restores that.

use crate::reclaim::ReclamationGate;
use crate::registry::UnitRegistry;
use crate::unit::{short_name, UnitRef};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<NativeContext>> = const { RefCell::new(None) };
}

/// What a native initializer may see of the loader.
#[derive(Debug, Clone)]
pub struct NativeContext {
    registry: Arc<UnitRegistry>,
    qualified_name: String,
    registered: Option<UnitRef>,
    reclamation: Option<Arc<ReclamationGate>>,
}

impl NativeContext {
    pub fn new(registry: Arc<UnitRegistry>, qualified_name: impl Into<String>) -> Self {
        Self {
            registry,
            qualified_name: qualified_name.into(),
            registered: None,
            reclamation: None,
        }
    }

    /// Publish the gate the loading runtime holds suspended.
    pub fn with_reclamation(mut self, gate: Arc<ReclamationGate>) -> Self {
        self.reclamation = Some(gate);
        self
    }

    pub fn reclamation(&self) -> Option<&ReclamationGate> {
        self.reclamation.as_deref()
    }

    /// Qualified name of the unit being initialized.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    /// Expand a short name to the unit's qualified name.
    pub fn qualify(&self, requested: &str) -> String {
        if requested == short_name(&self.qualified_name) {
            self.qualified_name.clone()
        } else {
            requested.to_string()
        }
    }

    /// Unit most recently registered through this context.
    pub fn registered(&self) -> Option<&UnitRef> {
        self.registered.as_ref()
    }

    pub(crate) fn set_registered(&mut self, unit: UnitRef) {
        self.registered = Some(unit);
    }
}

/// Publishes a context for the current thread until dropped.
#[must_use = "the context is withdrawn as soon as the scope is dropped"]
pub struct QualificationScope {
    previous: Option<NativeContext>,
}

impl QualificationScope {
    pub fn enter(context: NativeContext) -> Self {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(context));
        Self { previous }
    }
}

impl Drop for QualificationScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Run `f` with the current context, if one is published.
pub fn with_current<T>(f: impl FnOnce(Option<&mut NativeContext>) -> T) -> T {
    CURRENT.with(|current| f(current.borrow_mut().as_mut()))
}
