use crate::annotation::{AnnotationBuilder, SourceKind, SpanPayload};
use crate::config::OverlayConfig;
use crate::document::{extract, Document};
use crate::session::{Entity, ModifierRequest, ScopeKey, SessionStore};

const HOST_DOC: &str = r#"{
  "type": "doc",
  "content": [
    { "type": "heading", "content": [{ "type": "text", "text": "Notes for Anna" }] },
    { "type": "bullet_list", "content": [
      { "type": "list_item", "content": [
        { "type": "paragraph", "content": [
          { "type": "text", "text": "Call John Doe" },
          { "type": "hardBreak" },
          { "type": "text", "text": "at Acme Corp" }
        ]}
      ]}
    ]}
  ]
}"#;

fn render(store: &mut SessionStore, scope: &ScopeKey, doc: &Document) -> Vec<(String, SourceKind)> {
    let mapping = extract(doc);
    let builder = AnnotationBuilder::new(&OverlayConfig::default());
    let entities = store.get_entities_for_display(scope);
    let modifiers = store.get_active_modifiers(scope);
    let set = builder.build(&mapping, &entities, &modifiers);

    for pair in set.spans.windows(2) {
        assert!(pair[0].to <= pair[1].from, "spans share a character");
    }
    set.spans
        .iter()
        .map(|span| (doc.text_between(span.from, span.to), span.source_kind))
        .collect()
}

#[test]
fn test_stored_entities_render_on_nested_document() {
    let doc = Document::from_json(HOST_DOC).unwrap();
    let flat = extract(&doc);
    assert_eq!(flat.flat_text(), "Notes for Anna\nCall John Doe\nat Acme Corp");

    let scope = ScopeKey::conversation("chat-1");
    let mut store = SessionStore::in_memory();
    store.merge_detected_entities(
        &scope,
        vec![
            Entity::new(1, "PERSON_1", "PERSON", "Anna").with_occurrence(10, 14),
            Entity::new(2, "PERSON_2", "PERSON", "John Doe").with_occurrence(20, 28),
            Entity::new(3, "ORGANISATION_3", "ORGANISATION", "Acme Corp").with_occurrence(32, 41),
        ],
    );

    let rendered = render(&mut store, &scope, &doc);
    let texts: Vec<&str> = rendered.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(texts, vec!["Anna", "John Doe", "Acme Corp"]);
}

#[test]
fn test_modifiers_change_what_renders() {
    let doc = Document::from_json(HOST_DOC).unwrap();
    let scope = ScopeKey::conversation("chat-1");
    let mut store = SessionStore::in_memory();
    store.merge_detected_entities(
        &scope,
        vec![
            Entity::new(1, "PERSON_1", "PERSON", "Anna").with_occurrence(10, 14),
            Entity::new(2, "PERSON_2", "PERSON", "John Doe").with_occurrence(20, 28),
        ],
    );
    store.add_modifier(&scope, ModifierRequest::ignore("anna"));
    store.add_modifier(&scope, ModifierRequest::mask("Acme Corp", Some("COMPANY")));

    let rendered = render(&mut store, &scope, &doc);

    assert_eq!(
        rendered,
        vec![
            ("Anna".to_string(), SourceKind::Modifier),
            ("John Doe".to_string(), SourceKind::Entity),
            ("Acme Corp".to_string(), SourceKind::Modifier),
        ]
    );
}

#[test]
fn test_toggle_applies_to_every_occurrence_of_label() {
    let doc = Document::from_plain_text("John Doe and John Doe");
    let scope = ScopeKey::Temporary;
    let mut store = SessionStore::in_memory();
    store.merge_detected_entities(
        &scope,
        vec![Entity::new(1, "PERSON_1", "PERSON", "John Doe").with_occurrence(0, 8).with_occurrence(13, 21)],
    );
    assert!(store.toggle_masking(&scope, "PERSON_1", Some(1)));

    let mapping = extract(&doc);
    let set = AnnotationBuilder::new(&OverlayConfig::default()).build(
        &mapping,
        &store.get_entities_for_display(&scope),
        &store.get_active_modifiers(&scope),
    );

    let masks: Vec<bool> = set
        .spans
        .iter()
        .map(|span| match &span.payload {
            SpanPayload::Entity { should_mask, .. } => *should_mask,
            SpanPayload::Modifier { .. } => panic!("unexpected modifier span"),
        })
        .collect();
    assert_eq!(masks.len(), 2);
    assert!(masks.iter().all(|m| !m));
}
