//! Key-value container holding every field of the active wizard.

use std::collections::BTreeMap;

use tracing::debug;

use crate::wizard::value::{FieldValue, WizardState};

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Set { field: String, value: FieldValue },
    Cleared { field: String },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&StoreEvent) + Send + Sync>;

/// Single source of truth for field values. Performs no validation.
pub struct FormStore {
    values: WizardState,
    defaults: WizardState,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
}

impl FormStore {
    pub fn new(defaults: WizardState) -> Self {
        Self {
            values: defaults.clone(),
            defaults,
            listeners: BTreeMap::new(),
            next_listener: 0,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let field = field.into();
        let value = value.into();
        debug!(field = %field, "field updated");
        self.values.insert(field.clone(), value.clone());
        self.notify(&StoreEvent::Set { field, value });
    }

    /// Removes a value. Returns whether anything was removed; subscribers only
    /// hear about actual removals.
    pub fn clear(&mut self, field: &str) -> bool {
        if self.values.remove(field).is_some() {
            debug!(field = %field, "field cleared");
            self.notify(&StoreEvent::Cleared {
                field: field.to_string(),
            });
            true
        } else {
            false
        }
    }

    /// Snapshot of all current values.
    pub fn get_all(&self) -> WizardState {
        self.values.clone()
    }

    /// Borrowed view used by validation and payload building.
    pub fn state(&self) -> &WizardState {
        &self.values
    }

    /// Restores the initial defaults.
    pub fn reset(&mut self) {
        self.values = self.defaults.clone();
        self.notify(&StoreEvent::Reset);
    }

    pub fn subscribe(
        &mut self,
        listener: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, Box::new(listener));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    fn notify(&self, event: &StoreEvent) {
        for listener in self.listeners.values() {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn defaults() -> WizardState {
        let mut defaults = WizardState::new();
        defaults.insert("tenureMonths".into(), FieldValue::Number(6.0));
        defaults
    }

    #[test]
    fn set_get_and_reset_to_defaults() {
        let mut store = FormStore::new(defaults());
        store.set("loanAmount", 2500.0);
        store.set("tenureMonths", 12.0);
        assert_eq!(store.get("loanAmount"), Some(&FieldValue::Number(2500.0)));

        store.reset();
        assert!(store.get("loanAmount").is_none());
        assert_eq!(store.get("tenureMonths"), Some(&FieldValue::Number(6.0)));
    }

    #[test]
    fn subscribers_are_notified_synchronously() {
        let mut store = FormStore::new(WizardState::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        store.set("email", "ada@example.com");
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(!store.clear("phone"));
        assert!(store.clear("email"));
        store.reset();
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&StoreEvent::Reset),
        );
        assert_eq!(seen.lock().unwrap().len(), 3);

        assert!(store.unsubscribe(id));
        store.set("email", "x@example.com");
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut store = FormStore::new(WizardState::new());
        store.set("purpose", "School fees");
        let snapshot = store.get_all();
        store.set("purpose", "Rent");
        assert_eq!(snapshot.get("purpose"), Some(&FieldValue::from("School fees")));
    }
}
