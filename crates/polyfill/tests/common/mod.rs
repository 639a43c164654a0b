#![allow(dead_code)]

use std::sync::Arc;

use dom::NodeId;
use polyfill::{HostDocument, MemoryLoader, Options, Polyfill};
use url::Url;

pub const BASE: &str = "http://localhost/index.html";
pub const A_SVG: &str = "http://localhost/a.svg";
pub const B_SVG: &str = "http://localhost/b.svg";

pub const SPRITE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <linearGradient id="shine"/>
    <symbol id="star"><path fill="url(#shine)" d="M0 0"/></symbol>
    <symbol id="moon"><circle r="4"/></symbol>
</svg>"#;

pub fn host(body: &str) -> HostDocument {
    let markup = format!("<html><head/><body>{body}</body></html>");
    HostDocument::parse(&markup, Url::parse(BASE).unwrap()).unwrap()
}

pub fn loader() -> Arc<MemoryLoader> {
    let loader = Arc::new(MemoryLoader::new());
    loader.insert(A_SVG, SPRITE);
    loader
}

/// Defaults, minus the user-agent gate
pub fn options() -> Options {
    Options {
        detect: false,
        ..Options::default()
    }
}

pub fn start(host: &HostDocument, loader: &Arc<MemoryLoader>, options: Options) -> Polyfill {
    Polyfill::new(host.clone(), loader.clone(), options).unwrap()
}

/// Authored `use` elements, excluding any inside injected files
pub fn uses(host: &HostDocument) -> Vec<NodeId> {
    host.read(|doc| {
        let injected = doc.find(|node| node.attr("aria-hidden") == Some("true"));
        doc.find_by_tag("use")
            .into_iter()
            .filter(|&id| !injected.iter().any(|&file| doc.contains(file, id)))
            .collect()
    })
}

pub fn attr(host: &HostDocument, element: NodeId, name: &str) -> Option<String> {
    host.read(|doc| doc.get(element).unwrap().attr(name).map(str::to_string))
}

pub fn href(host: &HostDocument, element: NodeId) -> Option<String> {
    attr(host, element, "href")
}

pub fn injected(host: &HostDocument) -> Vec<NodeId> {
    host.read(|doc| doc.find(|node| node.attr("aria-hidden") == Some("true")))
}
