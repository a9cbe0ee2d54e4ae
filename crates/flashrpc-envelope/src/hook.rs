use std::sync::{Arc, RwLock};

use crate::error::ValidationErrors;

/// Callback observing every envelope validation failure in the process.
pub type ValidationHook = Arc<dyn Fn(&ValidationErrors) + Send + Sync>;

static HOOK: RwLock<Option<ValidationHook>> = RwLock::new(None);

/// Install the process-wide validation hook, replacing any previous one.
///
/// The hook is notified only; it cannot change the outcome.
pub fn set_validation_hook(hook: ValidationHook) {
    if let Ok(mut slot) = HOOK.write() {
        *slot = Some(hook);
    }
}

/// Remove the process-wide validation hook.
pub fn clear_validation_hook() {
    if let Ok(mut slot) = HOOK.write() {
        *slot = None;
    }
}

pub(crate) fn report(errors: &ValidationErrors) {
    tracing::debug!(errors = %errors, "envelope validation failed");
    let hook = match HOOK.read() {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };
    if let Some(hook) = hook {
        hook(errors);
    }
}
