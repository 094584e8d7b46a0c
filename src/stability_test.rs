// Unit tests for the stability blacklists

use super::*;

#[test]
fn test_dynamic_ids_are_rejected() {
    for id in [
        "react-183-a",
        "ember1234",
        "ng-view-3",
        ":r1f:",
        "550e8400-e29b-41d4-a716-446655440000",
        "item-550e8400-e29b-41d4-a716-446655440000",
        "1700000000123",
        "42",
        "row_17",
        "tab-3",
        "ext-gen1042",
        "yui-gen7",
        "closure-lm-0",
        "uuid-abc",
        "pt-main",
        "a/b",
        "form.field",
        "",
    ] {
        assert!(!is_stable_id(id), "{id} should be unstable");
    }
}

#[test]
fn test_hand_written_ids_are_stable() {
    for id in ["login-id", "userPassword", "searchBox", "btn_submit", "main-nav"] {
        assert!(is_stable_id(id), "{id} should be stable");
    }
}

#[test]
fn test_class_blacklist() {
    for class in [
        "css-1x2y3z",
        "sc-bdVaJa",
        "_3xk9Q2",
        "emotion-0",
        "Button--a8f7e6",
        "p-4",
        "mt-2",
        "w-full",
        "flex",
        "items-center",
        "text-sm",
        "bg-blue-500",
        "hidden",
        "rounded-lg",
        "hover:bg-red",
        "d-flex",
        "col-6",
        "ab",
    ] {
        assert!(!is_stable_class(class), "{class} should be unstable");
    }
    assert!(is_stable_class("btn-login"));
    assert!(is_stable_class("cl-tabfolder-item"));
}

#[test]
fn test_stable_classes_keeps_source_order() {
    assert_eq!(
        stable_classes("css-abc123 btn-primary p-2 submit-button"),
        vec!["btn-primary", "submit-button"]
    );
}

#[test]
fn test_strip_dynamic_state() {
    assert_eq!(strip_dynamic_state("교부관리, 선택됨"), "교부관리");
    assert_eq!(strip_dynamic_state("교부관리, 선택되지 않음"), "교부관리");
    assert_eq!(strip_dynamic_state("Reports, Selected"), "Reports");
    assert_eq!(strip_dynamic_state("Menu, expanded, selected"), "Menu");
    assert_eq!(strip_dynamic_state("Save"), "Save");
    assert!(has_dynamic_state("Tab 1, collapsed"));
    assert!(!has_dynamic_state("Collapsed view"));
}

#[test]
fn test_normalize_whitespace() {
    assert_eq!(normalize_whitespace("  교부   관리 \n"), "교부 관리");
}
