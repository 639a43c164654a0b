//! Reactive session - observe a page, veto one rewrite, then tear down

use std::sync::Arc;
use std::time::Duration;

use polyfill::{
    HostDocument, MemoryLoader, NotificationDetail, NotificationKind, Options, Polyfill,
};
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let loader = Arc::new(MemoryLoader::new().with_latency(Duration::from_millis(50)));
    loader.insert(
        "https://cdn.example.com/sprite.svg",
        r#"<svg><symbol id="home"/><symbol id="search"/><symbol id="cart"/></svg>"#,
    );

    let host = HostDocument::parse(
        r#"<html><body><nav id="nav">
            <svg><use href="https://cdn.example.com/sprite.svg#home"/></svg>
        </nav></body></html>"#,
        Url::parse("https://shop.example.com/index.html")?,
    )?;
    host.set_user_agent("Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0) like Gecko");

    let options = Options::from_json(r#"{"run": false, "crossdomain": true}"#)?;
    let polyfill = Polyfill::new(host.clone(), loader.clone(), options)?;

    polyfill.on(NotificationKind::Apply, |n| {
        if let NotificationDetail::Apply { identifier, .. } = &n.detail {
            if identifier.ends_with("-cart") {
                println!("Keeping the cart icon external");
                n.prevent_default();
            }
        }
    });

    let mut notifications = polyfill.events().subscribe();
    tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            println!("{} on node {} (prevented: {})", n.name, n.target, n.default_prevented);
        }
    });

    polyfill.run();
    polyfill.settle().await;

    // Markup added later is picked up by the observer
    host.write(|doc| -> dom::Result<()> {
        let Some(nav) = doc.find_by_id("nav") else {
            return Ok(());
        };
        for icon in ["search", "cart"] {
            let svg = doc.create_element("svg");
            let element = doc.create_element("use");
            doc.set_attribute(
                element,
                "href",
                format!("https://cdn.example.com/sprite.svg#{icon}"),
            )?;
            doc.append_child(svg, element)?;
            doc.append_child(nav, svg)?;
        }
        Ok(())
    })?;
    polyfill.settle().await;
    println!("{}", host.serialize()?);
    println!("Fetches: {}", loader.total_fetches());

    polyfill.destroy();
    polyfill.settle().await;
    println!("{}", host.serialize()?);

    Ok(())
}
