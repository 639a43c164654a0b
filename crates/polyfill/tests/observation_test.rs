mod common;

use std::time::Duration;

use common::*;
use polyfill::{ControllerState, Options};

const SETTLE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_inserted_element_is_resolved() {
    let host = host(r#"<svg id="icons"><use href="a.svg#star"/></svg>"#);
    let loader = loader();
    let polyfill = start(&host, &loader, options());
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(polyfill.state(), ControllerState::Observing);

    let added = host.write(|doc| {
        let svg = doc.find_by_id("icons").unwrap();
        let element = doc.create_element("use");
        doc.set_attribute(element, "href", "a.svg#moon").unwrap();
        doc.append_child(svg, element).unwrap();
        element
    });
    assert!(polyfill.settle_timeout(SETTLE).await);

    assert_eq!(href(&host, added).as_deref(), Some("#a-moon"));
    assert_eq!(loader.total_fetches(), 1);
}

#[tokio::test]
async fn test_changed_reference_is_resolved() {
    let host = host(r#"<svg><use href="a.svg#star"/></svg>"#);
    let loader = loader();
    loader.insert(B_SVG, r#"<svg><symbol id="star"/></svg>"#);
    let polyfill = start(&host, &loader, options());
    assert!(polyfill.settle_timeout(SETTLE).await);

    let element = uses(&host)[0];
    host.write(|doc| doc.set_attribute(element, "href", "b.svg#star"))
        .unwrap();
    assert!(polyfill.settle_timeout(SETTLE).await);

    assert_eq!(href(&host, element).as_deref(), Some("#b-star"));
    assert_eq!(injected(&host).len(), 2);

    // Teardown restores the author's latest value
    polyfill.destroy();
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(href(&host, element).as_deref(), Some("b.svg#star"));
    assert!(injected(&host).is_empty());
}

#[tokio::test]
async fn test_viewport_change_triggers_rescan() {
    let host = host(r#"<svg><use href="a.svg#star"/></svg>"#);
    let loader = loader();
    let polyfill = start(&host, &loader, options());
    assert!(polyfill.settle_timeout(SETTLE).await);

    // Swapped without notifying observers, as a layout switch would
    polyfill.unobserve();
    let element = uses(&host)[0];
    host.write(|doc| doc.set_attribute(element, "href", "a.svg#moon"))
        .unwrap();
    polyfill.observe();
    assert_eq!(href(&host, element).as_deref(), Some("a.svg#moon"));

    host.resize();
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(href(&host, element).as_deref(), Some("#a-moon"));

    polyfill.unobserve();
    host.write(|doc| doc.set_attribute(element, "href", "a.svg#star"))
        .unwrap();
    polyfill.observe();
    host.orientation_change();
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(href(&host, element).as_deref(), Some("#a-star"));
}

#[tokio::test]
async fn test_unobserved_changes_wait_for_explicit_scan() {
    let host = host(r#"<svg id="icons"/>"#);
    let polyfill = start(
        &host,
        &loader(),
        Options {
            observe: false,
            ..options()
        },
    );
    assert_eq!(polyfill.state(), ControllerState::Running);

    let added = host.write(|doc| {
        let svg = doc.find_by_id("icons").unwrap();
        let element = doc.create_element("use");
        doc.set_attribute(element, "xlink:href", "a.svg#star").unwrap();
        doc.append_child(svg, element).unwrap();
        element
    });
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(attr(&host, added, "xlink:href").as_deref(), Some("a.svg#star"));

    polyfill.scan();
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(attr(&host, added, "xlink:href").as_deref(), Some("#a-star"));
}

#[tokio::test]
async fn test_removed_elements_drop_their_bindings() {
    let host = host(r#"<svg id="icons"><use href="a.svg#star"/><use href="a.svg#moon"/></svg>"#);
    let polyfill = start(&host, &loader(), options());
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(polyfill.cache().binding_count(), 2);

    let element = uses(&host)[1];
    host.write(|doc| doc.detach(element)).unwrap();
    assert!(polyfill.settle_timeout(SETTLE).await);

    assert_eq!(polyfill.cache().binding_count(), 1);
    assert!(polyfill.cache().binding(element).is_none());
}

#[tokio::test]
async fn test_own_rewrites_do_not_loop() {
    let host = host(r#"<svg><use href="a.svg#star"/><use href="a.svg#moon"/></svg>"#);
    let loader = loader();
    let polyfill = start(&host, &loader, options());
    let mut rx = polyfill.events().subscribe();
    assert!(polyfill.settle_timeout(SETTLE).await);

    let mut applies = 0;
    while let Ok(notification) = rx.try_recv() {
        if notification.name.ends_with(".apply") {
            applies += 1;
        }
    }
    assert_eq!(applies, 2);
    assert_eq!(loader.total_fetches(), 1);

    // Quiet once settled: another settle finds nothing to do
    let before = host.serialize().unwrap();
    assert!(polyfill.settle_timeout(SETTLE).await);
    assert_eq!(host.serialize().unwrap(), before);
}
