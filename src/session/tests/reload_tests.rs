use std::cell::RefCell;
use std::rc::Rc;

use crate::config::OverlayConfig;
use crate::session::{
    ConversationPiiState, Entity, MemoryPersistence, ModifierRequest, ScopeKey, ScopePersistence, SessionStore,
};

/// Backend shared between two stores, standing in for browser storage across reloads
#[derive(Clone, Default)]
struct SharedPersistence(Rc<RefCell<MemoryPersistence>>);

impl ScopePersistence for SharedPersistence {
    fn load_scope_state(&self, key: &str) -> Result<Option<ConversationPiiState>, String> {
        self.0.borrow().load_scope_state(key)
    }

    fn save_scope_state(&mut self, key: &str, state: &ConversationPiiState) -> Result<(), String> {
        self.0.borrow_mut().save_scope_state(key, state)
    }
}

fn store_on(backend: &SharedPersistence) -> SessionStore {
    SessionStore::new(Box::new(backend.clone()), &OverlayConfig::default())
}

fn john() -> Entity {
    Entity::new(1, "PERSON_1", "PERSON", "John Doe").with_occurrence(8, 16)
}

#[test]
fn test_durable_scope_survives_reload() {
    let backend = SharedPersistence::default();
    let chat = ScopeKey::conversation("chat-1");
    {
        let mut store = store_on(&backend);
        store.merge_detected_entities(&chat, vec![john()]);
        store.toggle_masking(&chat, "PERSON_1", None);
        store.add_modifier(&chat, ModifierRequest::ignore("Acme"));
        store.set_session_id("chat-1", Some("svc-77".into()));
    }

    let mut reloaded = store_on(&backend);
    let entities = reloaded.get_entities_for_display(&chat);
    assert_eq!(entities.len(), 1);
    assert!(!entities[0].should_mask);
    assert_eq!(reloaded.get_active_modifiers(&chat).len(), 1);
    assert_eq!(reloaded.scope_state("chat-1").and_then(|s| s.session_id.clone()), Some("svc-77".into()));
}

#[test]
fn test_temporary_scope_is_never_persisted() {
    let backend = SharedPersistence::default();
    {
        let mut store = store_on(&backend);
        store.activate_temporary_scope();
        store.merge_detected_entities(&ScopeKey::Temporary, vec![john()]);
    }

    assert!(backend.0.borrow().is_empty());
}

#[test]
fn test_transfer_then_reload_sees_transferred_state() {
    let backend = SharedPersistence::default();
    {
        let mut store = store_on(&backend);
        store.activate_temporary_scope();
        store.merge_detected_entities(&ScopeKey::Temporary, vec![john()]);
        store.add_modifier(&ScopeKey::Temporary, ModifierRequest::mask("Falcon", Some("PROJECT")));
        store.transfer_temporary_to_scope("chat-2");
    }

    let mut reloaded = store_on(&backend);
    let chat = ScopeKey::conversation("chat-2");
    assert_eq!(reloaded.get_entities_for_display(&chat).len(), 1);
    assert_eq!(reloaded.get_active_modifiers(&chat)[0].entity, "Falcon");
    assert!(reloaded.temporary_state().entities.is_empty());
}

#[test]
fn test_scopes_are_isolated() {
    let mut store = SessionStore::in_memory();
    let a = ScopeKey::conversation("a");
    let b = ScopeKey::conversation("b");

    store.merge_detected_entities(&a, vec![john()]);
    store.add_modifier(&b, ModifierRequest::ignore("John Doe"));

    assert!(store.get_entities_for_display(&b).is_empty());
    assert!(store.get_active_modifiers(&a).is_empty());
}
