//! Grammar loader tests: document shape, attribute typing and load errors.

use protodissect::ast::{
    AttributeKind, AttributeValue, CompareOp, Descriptor, FieldDescriptor, Grammar, Length, Literal,
    Structure, TriggerAction, TriggerTarget, ValueSpec,
};
use protodissect::format::Format;
use protodissect::{load_file, parse, GrammarError};

const FULL: &str = r#"
top: [Header]
Header:
  - Flags: {length: 8, values: [1, 2, "0x03"]}
  - Len: {length: varint, triggers: [{Body: {byte_length: set}}, {save_to_context: ~}]}
  - Kind: {length: pn, values: {eq: 1, neq: 2}}
  - Opt: {length: 8, conditions: [{Flags: {eq: 1}}], format: hex}
  - Body: {parse: Thing}
  - Tail: {length: '*', repeated: true}
  - next: Footer
Item:
  - type: Thing
  - v: {length: 8, triggers: [{w: {length: {1: 16, 2: 32}}}]}
  - w: {length: 0}
Other:
  - type: Thing
Footer:
  - f:
"#;

fn field<'a>(s: &'a Structure, name: &str) -> &'a FieldDescriptor {
    s.descriptors
        .iter()
        .find_map(|d| match d {
            Descriptor::Field(f) if f.name == name => Some(f),
            _ => None,
        })
        .expect("field")
}

// ==================== Valid documents ====================

#[test]
fn roots_and_structures_in_document_order() {
    let g = parse(FULL).expect("parse");
    assert_eq!(g.roots, vec!["Header"]);
    let names: Vec<_> = g.structures.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Header", "Item", "Other", "Footer"]);
    let header = g.get_structure("Header").expect("header");
    assert_eq!(header.descriptors.len(), 7);
    assert!(matches!(header.descriptors.last(), Some(Descriptor::Next(n)) if n == "Footer"));
    assert!(header.type_name().is_none());
}

#[test]
fn structures_of_type_in_document_order() {
    let g = parse(FULL).expect("parse");
    let alts: Vec<_> = g.structures_of_type("Thing").iter().map(|s| s.name.as_str()).collect();
    assert_eq!(alts, vec!["Item", "Other"]);
    assert!(g.structures_of_type("Nothing").is_empty());
}

#[test]
fn length_forms() {
    let g = parse(FULL).expect("parse");
    let h = g.get_structure("Header").expect("header");
    assert_eq!(field(h, "Flags").attributes.length, Some(Length::Bits(8)));
    assert_eq!(field(h, "Len").attributes.length, Some(Length::Varint));
    assert_eq!(field(h, "Kind").attributes.length, Some(Length::PacketNumber));
    assert_eq!(field(h, "Tail").attributes.length, Some(Length::Rest));
    assert!(field(h, "Tail").repeated);
    assert!(!field(h, "Flags").repeated);
}

#[test]
fn value_specs() {
    let g = parse(FULL).expect("parse");
    let h = g.get_structure("Header").expect("header");
    assert_eq!(
        field(h, "Flags").attributes.values,
        Some(ValueSpec::OneOf(vec![
            Literal::Int(1),
            Literal::Int(2),
            Literal::Str("0x03".into())
        ]))
    );
    assert_eq!(
        field(h, "Kind").attributes.values,
        Some(ValueSpec::Ops(vec![
            (CompareOp::Eq, Literal::Int(1)),
            (CompareOp::Neq, Literal::Int(2))
        ]))
    );
}

#[test]
fn conditions_and_format() {
    let g = parse(FULL).expect("parse");
    let opt = &field(g.get_structure("Header").expect("header"), "Opt").attributes;
    let conds = opt.conditions.as_ref().expect("conditions");
    assert_eq!(conds.len(), 1);
    assert_eq!(conds[0].field, "Flags");
    assert_eq!(conds[0].op, CompareOp::Eq);
    assert_eq!(opt.format, Some(Format::Hex));
}

#[test]
fn triggers_typed_at_load() {
    let g = parse(FULL).expect("parse");
    let len = &field(g.get_structure("Header").expect("header"), "Len").attributes;
    let triggers = len.triggers.as_ref().expect("triggers");
    assert_eq!(triggers.len(), 2);
    assert_eq!(triggers[0].target, TriggerTarget::Field("Body".into()));
    assert_eq!(triggers[0].rules, vec![(AttributeKind::ByteLength, TriggerAction::Set)]);
    assert_eq!(triggers[1].target, TriggerTarget::SaveToContext);

    let v = &field(g.get_structure("Item").expect("item"), "v").attributes;
    let table = &v.triggers.as_ref().expect("triggers")[0].rules[0];
    assert_eq!(
        table,
        &(
            AttributeKind::Length,
            TriggerAction::Lookup(vec![
                (Literal::Int(1), AttributeValue::Length(Length::Bits(16))),
                (Literal::Int(2), AttributeValue::Length(Length::Bits(32))),
            ])
        )
    );
}

#[test]
fn bare_field_has_no_attributes() {
    let g = parse(FULL).expect("parse");
    let f = field(g.get_structure("Footer").expect("footer"), "f");
    assert!(f.attributes.is_empty());
    assert!(g.get_structure("Other").expect("other").descriptors.len() == 1);
}

#[test]
fn load_file_reads_grammar() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("g.yaml");
    std::fs::write(&path, FULL).expect("write");
    let g = load_file(&path).expect("load");
    assert_eq!(g.structures.len(), 4);
    assert!(matches!(
        load_file(&dir.path().join("missing.yaml")),
        Err(GrammarError::Io(_))
    ));
}

// ==================== Document errors ====================

#[test]
fn error_missing_roots() {
    assert!(matches!(
        parse("A:\n  - x: {length: 8}\n"),
        Err(GrammarError::MissingRoots)
    ));
    assert!(matches!(
        parse("top: []\nA:\n  - x: {length: 8}\n"),
        Err(GrammarError::MissingRoots)
    ));
}

#[test]
fn error_unknown_root() {
    match parse("top: [Nope]\nA:\n  - x: {length: 8}\n") {
        Err(GrammarError::UnknownRoot(r)) => assert_eq!(r, "Nope"),
        other => panic!("expected UnknownRoot, got {:?}", other),
    }
}

#[test]
fn error_duplicate_structure() {
    let s = Structure {
        name: "A".into(),
        descriptors: Vec::new(),
    };
    match Grammar::new(vec!["A".into()], vec![s.clone(), s]) {
        Err(GrammarError::DuplicateStructure(n)) => assert_eq!(n, "A"),
        other => panic!("expected DuplicateStructure, got {:?}", other),
    }
}

#[test]
fn error_yaml_syntax() {
    assert!(matches!(parse("top: [A\n"), Err(GrammarError::Yaml(_))));
}

#[test]
fn error_document_not_a_mapping() {
    assert!(matches!(parse("- a\n- b\n"), Err(GrammarError::Malformed { .. })));
}

#[test]
fn error_structure_not_a_list() {
    match parse("top: [A]\nA: 5\n") {
        Err(GrammarError::Malformed { structure, .. }) => assert_eq!(structure, "A"),
        other => panic!("expected Malformed, got {:?}", other),
    }
}

#[test]
fn error_descriptor_with_two_entries() {
    let src = "top: [A]\nA:\n  - x: {length: 8}\n    y: {length: 8}\n";
    assert!(matches!(parse(src), Err(GrammarError::Malformed { .. })));
}

// ==================== Attribute errors ====================

fn bad_attribute(src: &str) -> (String, String) {
    match parse(src) {
        Err(GrammarError::BadAttribute { structure, field, .. }) => (structure, field),
        other => panic!("expected BadAttribute, got {:?}", other),
    }
}

#[test]
fn error_unknown_attribute() {
    let at = bad_attribute("top: [A]\nA:\n  - x: {size: 8}\n");
    assert_eq!(at, ("A".to_string(), "x".to_string()));
}

#[test]
fn error_invalid_length() {
    bad_attribute("top: [A]\nA:\n  - x: {length: abc}\n");
    bad_attribute("top: [A]\nA:\n  - x: {length: -8}\n");
}

#[test]
fn error_unknown_format() {
    bad_attribute("top: [A]\nA:\n  - x: {length: 8, format: base64}\n");
}

#[test]
fn error_repeated_not_boolean() {
    bad_attribute("top: [A]\nA:\n  - x: {length: 8, repeated: 3}\n");
}

#[test]
fn error_invalid_trigger_action() {
    bad_attribute("top: [A]\nA:\n  - x: {length: 8, triggers: [{y: {length: copy}}]}\n  - y: {length: 0}\n");
}

#[test]
fn error_lookup_value_of_wrong_type() {
    bad_attribute("top: [A]\nA:\n  - x: {length: 8, triggers: [{y: {parse: {1: 5}}}]}\n  - y:\n");
}

#[test]
fn error_condition_without_operator() {
    bad_attribute("top: [A]\nA:\n  - f: {length: 8}\n  - x: {length: 8, conditions: [{f: 1}]}\n");
}
