use serde_json::json;

use super::*;

#[test]
fn extracts_nested_text_in_document_order() {
    let doc = json!({
        "root": "ignored",
        "children": [
            { "type": "paragraph", "children": [
                { "text": "Ngày  nghỉ" },
                { "text": "phép" },
            ]},
            { "type": "paragraph", "children": [
                { "text": "12 ngày mỗi năm." },
            ]},
        ]
    });
    assert_eq!(extract_plain_text(&doc), "Ngày nghỉ phép 12 ngày mỗi năm.");
}

#[test]
fn ignores_non_text_fields_and_blank_fragments() {
    let doc = json!({
        "children": [
            { "text": "   " },
            { "format": 1, "text": "bold" },
            { "children": [{ "url": "https://example.com", "text": "link" }] },
        ]
    });
    assert_eq!(extract_plain_text(&doc), "bold link");
}

#[test]
fn non_object_roots_yield_empty_text() {
    assert_eq!(extract_plain_text(&json!(null)), "");
    assert_eq!(extract_plain_text(&json!("plain string")), "");
    assert_eq!(extract_plain_text(&json!([{ "text": "in array" }])), "");
}

#[test]
fn editor_state_root_wrapper_is_unwrapped() {
    let doc = json!({
        "root": {
            "type": "root",
            "children": [
                { "children": [{ "text": "Ngày nghỉ phép" }] },
            ]
        }
    });
    assert_eq!(extract_plain_text(&doc), "Ngày nghỉ phép");
}

#[test]
fn deep_nesting_is_flattened() {
    let doc = json!({
        "children": [
            { "children": [
                { "children": [{ "text": "deep" }] },
                { "text": "shallow" },
            ]},
        ]
    });
    assert_eq!(extract_plain_text(&doc), "deep shallow");
}
