use cdp_adapter::snapshot::{build_tree, SnapshotPayload};
use perceiver_structural::{DomIndexer, RawPageSnapshot};
use serde_json::json;
use webpilot_core_types::FrameTag;

/// Output shaped like the in-page script's for a checkout page with a
/// same-origin payment frame and a collapsed menu.
fn payload() -> SnapshotPayload {
    serde_json::from_value(json!({
        "url": "https://shop.test/checkout",
        "title": "Checkout",
        "viewport": {"width": 1024, "height": 700, "scrollX": 0, "scrollY": 0, "documentHeight": 1400},
        "truncated": false,
        "nodes": [
            {"parent": -1, "tag": "html", "bounds": [0, 0, 1024, 1400]},
            {"parent": 0, "tag": "body", "bounds": [0, 0, 1024, 1400]},
            {"parent": 1, "tag": "a", "text": "Cart", "attributes": {"href": "/cart"},
             "bounds": [10, 10, 40, 20]},
            {"parent": 1, "tag": "ul", "bounds": [0, 40, 200, 0],
             "style": {"display": "none"}},
            {"parent": 3, "tag": "li", "bounds": [0, 40, 200, 20], "clickable": true, "text": "Hidden"},
            {"parent": 1, "tag": "iframe", "bounds": [0, 200, 600, 300],
             "frame": {"url": "https://shop.test/pay", "origin": "https://shop.test"}},
            {"parent": 5, "docRoot": true, "tag": "html", "bounds": [0, 200, 600, 300]},
            {"parent": 6, "tag": "body", "bounds": [0, 200, 600, 300]},
            {"parent": 7, "tag": "input", "attributes": {"name": "card"},
             "bounds": [10, 220, 200, 24]},
            {"parent": 7, "tag": "button", "text": "Pay", "bounds": [10, 260, 80, 24]}
        ]
    }))
    .unwrap()
}

#[test]
fn script_output_indexes_like_any_other_snapshot() {
    let payload = payload();
    let root = build_tree(payload.nodes).unwrap();
    let raw = RawPageSnapshot::new(payload.url, payload.title, root)
        .with_viewport(payload.viewport.into());
    let observation = DomIndexer::default().index(raw, None);

    let tags: Vec<&str> = observation
        .selector_map
        .elements()
        .map(|el| el.tag.as_str())
        .collect();
    assert_eq!(tags, vec!["a", "input", "button"]);

    let pay = observation.element(2).unwrap();
    assert_eq!(pay.frame, FrameTag::frame("https://shop.test").unwrap());
    assert_eq!(pay.locator.frame_xpaths, vec!["/html[1]/body[1]/iframe[1]"]);
    assert_eq!(pay.locator.xpath, "/html[1]/body[1]/button[1]");
    assert_eq!(observation.viewport.document_height, 1400.0);
}
