// Unit tests for types module

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_viewport_size_parse() {
    let size = ViewportSize::parse("1920x1080").unwrap();
    assert_eq!(size.width, 1920);
    assert_eq!(size.height, 1080);

    assert!(ViewportSize::parse("1920").is_err());
    assert!(ViewportSize::parse("x1080").is_err());
    assert!(ViewportSize::parse("1920X1080").is_err());
}

#[test]
fn test_bounding_box_center_and_zero() {
    let bbox = BoundingBox::new(10.0, 20.0, 100.0, 40.0);
    assert_eq!(bbox.center(), (60.0, 40.0));
    assert!(!bbox.is_zero());
    assert!(BoundingBox::default().is_zero());
    assert!(BoundingBox::new(5.0, 5.0, 0.0, 12.0).is_zero());
}

#[test]
fn test_bounding_box_similarity() {
    let recorded = BoundingBox::new(100.0, 100.0, 80.0, 30.0);
    assert!(recorded.is_similar(&BoundingBox::new(150.0, 130.0, 90.0, 33.0), 0.2, 100.0));
    // 25% wider
    assert!(!recorded.is_similar(&BoundingBox::new(100.0, 100.0, 100.0, 30.0), 0.2, 100.0));
    // moved too far
    assert!(!recorded.is_similar(&BoundingBox::new(300.0, 100.0, 80.0, 30.0), 0.2, 100.0));
    assert!(!recorded.is_similar(&BoundingBox::default(), 0.2, 100.0));
}

#[test]
fn test_confidence_is_clamped_on_construction_and_deserialization() {
    assert_eq!(SelectorWithScore::css("#a", 140).confidence, 100);
    assert_eq!(SelectorWithScore::css("#a", -5).confidence, 0);

    let parsed: SelectorWithScore =
        serde_json::from_str(r##"{"strategy":"css","value":"#a","confidence":-12.5}"##).unwrap();
    assert_eq!(parsed.confidence, 0);
    let parsed: SelectorWithScore =
        serde_json::from_str(r#"{"strategy":"testId","value":"[data-testid=\"x\"]","confidence":250}"#)
            .unwrap();
    assert_eq!(parsed.confidence, 100);
    assert_eq!(parsed.strategy, SelectorStrategy::TestId);

    let mut s = SelectorWithScore::css("#a", 95);
    s.adjust(10);
    assert_eq!(s.confidence, 100);
    s.adjust(-200);
    assert_eq!(s.confidence, 0);
}

#[test]
fn test_priority_confidence_floors_at_zero() {
    assert_eq!(priority_confidence(1), 99);
    assert_eq!(priority_confidence(100), 0);
    assert_eq!(priority_confidence(u32::MAX), 100 - i32::MAX);
    assert_eq!(
        SelectorWithScore::css("#a", priority_confidence(u32::MAX)).confidence,
        0
    );
}

#[test]
fn test_smart_selector_from_candidates_sorts_descending() {
    let smart = SmartSelector::from_candidates(
        vec![
            SelectorWithScore::css("div.a", 45),
            SelectorWithScore::css("[aria-label=\"Save\"]", 98),
            SelectorWithScore::new(SelectorStrategy::Xpath, "//button", 30),
            SelectorWithScore::new(SelectorStrategy::TestId, "[data-testid=\"save\"]", 88),
        ],
        BoundingBox::default(),
        "abcd1234".into(),
        None,
    )
    .unwrap();

    assert_eq!(smart.primary.confidence, 98);
    let scores: Vec<u8> = smart.candidates().map(|c| c.confidence).collect();
    assert_eq!(scores, vec![98, 88, 45, 30]);

    assert!(
        SmartSelector::from_candidates(vec![], BoundingBox::default(), String::new(), None)
            .is_none()
    );
}

#[test]
fn test_smart_selector_rerank_promotes_best_candidate() {
    let mut smart = SmartSelector::from_candidates(
        vec![
            SelectorWithScore::css("#old", 80),
            SelectorWithScore::css("[name=\"q\"]", 75),
        ],
        BoundingBox::default(),
        String::new(),
        None,
    )
    .unwrap();

    smart.primary.adjust(-15);
    smart.fallbacks[0].adjust(10);
    smart.rerank();

    assert_eq!(smart.primary.value, "[name=\"q\"]");
    assert_eq!(smart.primary.confidence, 85);
    assert_eq!(smart.fallbacks[0].value, "#old");
    assert_eq!(smart.fallbacks[0].confidence, 65);
}

#[test]
fn test_identity_deserializes_with_missing_fields() {
    let identity: ElementIdentity = serde_json::from_str(
        r#"{"tagName":"BUTTON","ariaLabel":"로그인","type":"submit","capturedAt":1700000000000}"#,
    )
    .unwrap();
    assert_eq!(identity.tag(), "button");
    assert_eq!(identity.input_type.as_deref(), Some("submit"));
    assert!(identity.ax_pair().is_none());
    assert_eq!(identity.label(), Some("로그인"));
    assert!(identity.captured_at.is_some());
}

#[test]
fn test_identity_ax_pair_requires_both_fields() {
    let mut identity = ElementIdentity {
        ax_role: Some("button".into()),
        ..Default::default()
    };
    assert!(identity.ax_pair().is_none());
    identity.ax_name = Some("   ".into());
    assert!(identity.ax_pair().is_none());
    identity.ax_name = Some("Save".into());
    assert_eq!(identity.ax_pair(), Some(("button", "Save")));
}

#[test]
fn test_action_type_classification() {
    assert!(ActionType::Type.is_input());
    assert!(ActionType::Select.is_input());
    assert!(!ActionType::Click.is_input());
    assert!(ActionType::Hover.needs_target());
    assert!(!ActionType::Navigate.needs_target());

    let action: ActionType = serde_json::from_str("\"select\"").unwrap();
    assert_eq!(action, ActionType::Select);
}

#[test]
fn test_match_strategy_serializes_camel_case() {
    assert_eq!(
        serde_json::to_string(&MatchStrategy::Fallback).unwrap(),
        "\"fallback\""
    );
    assert_eq!(
        serde_json::to_string(&MatchStrategy::AriaLabel).unwrap(),
        "\"ariaLabel\""
    );
    assert_eq!(MatchStrategy::InputType.to_string(), "inputType");
    assert!(MatchStrategy::Primary.is_recorded_path());
    assert!(!MatchStrategy::Fuzzy.is_recorded_path());
}

#[test]
fn test_snapshot_helpers() {
    let mut snapshot = ElementSnapshot {
        tag_name: "INPUT".into(),
        text_content: Some("   ".into()),
        ..Default::default()
    };
    snapshot.attributes.insert("name".into(), "  userId ".into());
    snapshot.attributes.insert("placeholder".into(), "".into());

    assert!(snapshot.is_form_field());
    assert_eq!(snapshot.attr("name"), Some("userId"));
    assert_eq!(snapshot.attr("placeholder"), None);
    assert_eq!(snapshot.text(), None);
}
