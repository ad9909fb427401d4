use super::*;

#[test]
fn test_basic_role_selector() {
    let selector = Selector::from("role:listitem");
    match selector {
        Selector::Role { role, name } => {
            assert_eq!(role, "listitem");
            assert_eq!(name, None);
        }
        _ => panic!("Expected Role selector"),
    }
}

#[test]
fn test_role_with_name() {
    let selector = Selector::from("role:textbox|name:이름/학번");
    match selector {
        Selector::Role { role, name } => {
            assert_eq!(role, "textbox");
            assert_eq!(name.as_deref(), Some("이름/학번"));
        }
        _ => panic!("Expected Role selector, got: {selector:?}"),
    }
}

#[test]
fn test_text_selectors() {
    assert_eq!(
        Selector::from("text:조회"),
        Selector::Text {
            text: "조회".to_string(),
            exact: false
        }
    );
    assert_eq!(
        Selector::from("text=조회"),
        Selector::Text {
            text: "조회".to_string(),
            exact: true
        }
    );
}

#[test]
fn test_id_selector_forms() {
    assert_eq!(Selector::from("#Pdate"), Selector::Id("Pdate".to_string()));
    assert_eq!(Selector::from("id:Pdate"), Selector::Id("Pdate".to_string()));
}

#[test]
fn test_css_selector_keeps_colons_and_brackets() {
    let selector = Selector::from("css:label:has(input[name='P'][value='2'])");
    assert_eq!(
        selector,
        Selector::Css("label:has(input[name='P'][value='2'])".to_string())
    );
}

#[test]
fn test_attribute_selector() {
    let selector = Selector::from("attr:name=Hour, type='text'");
    match selector {
        Selector::Attributes(attrs) => {
            assert_eq!(attrs.len(), 2);
            assert_eq!(attrs.get("name").map(String::as_str), Some("Hour"));
            assert_eq!(attrs.get("type").map(String::as_str), Some("text"));
        }
        _ => panic!("Expected Attributes selector"),
    }
    assert!(matches!(Selector::from("attr:"), Selector::Invalid(_)));
}

#[test]
fn test_chain_with_filters() {
    let selector = Selector::from("role:listitem >> has:text:20231234 >> nth:0");
    match &selector {
        Selector::Chain(parts) => {
            assert_eq!(parts.len(), 3);
            assert!(matches!(parts[0], Selector::Role { .. }));
            match &parts[1] {
                Selector::Has(inner) => assert_eq!(**inner, Selector::text("20231234")),
                other => panic!("Expected Has selector, got {other:?}"),
            }
            assert_eq!(parts[2], Selector::Nth(0));
        }
        _ => panic!("Expected Chain selector"),
    }
    assert!(selector.validate().is_ok());
}

#[test]
fn test_has_text_builder_matches_parsed_form() {
    let built = Selector::role("listitem", None).has_text("20231234");
    assert_eq!(built, Selector::from("role:listitem >> has:text:20231234"));
}

#[test]
fn test_then_flattens_chains() {
    let a = Selector::from("css:iframe >> #Pdate");
    let b = a.then(Selector::from("visible:true >> nth:1"));
    match b {
        Selector::Chain(parts) => assert_eq!(parts.len(), 4),
        _ => panic!("Expected Chain selector"),
    }
}

#[test]
fn test_invalid_selectors_are_reported() {
    let selector = Selector::from("bogus");
    assert!(matches!(selector, Selector::Invalid(_)));
    assert!(selector.validate().is_err());

    let nested = Selector::from("role:listitem >> nth:abc");
    let err = nested.validate().unwrap_err();
    assert!(err.contains("nth"), "unexpected reason: {err}");
}

#[test]
fn test_display_round_trips_through_parser() {
    for raw in [
        "role:textbox|name:이름/학번",
        "text=조회",
        "#Pdate",
        "css:input[name='Hour']",
        "role:listitem >> has:text:2023 >> nth:0",
    ] {
        let parsed = Selector::from(raw);
        assert_eq!(Selector::from(parsed.to_string().as_str()), parsed, "{raw}");
    }
}

#[test]
fn test_selector_serializes_with_kind_tag() {
    let json = serde_json::to_value(Selector::from("role:listitem >> has:text:7")).unwrap();
    assert_eq!(json["kind"], "chain");
    assert_eq!(json["value"][0]["kind"], "role");
    assert_eq!(json["value"][1]["value"]["value"]["text"], "7");
}
