//! Inline sprites from disk - resolve every external `<use>` in a page once

use std::sync::Arc;

use polyfill::{FileLoader, HostDocument, Options, Polyfill};
use url::Url;

const PAGE: &str = r#"<html><body>
    <svg><use href="icons.svg#star"/></svg>
    <svg><use xlink:href="icons.svg#moon"/></svg>
</body></html>"#;

const ICONS: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <linearGradient id="glow"/>
    <symbol id="star"><path fill="url(#glow)" d="M12 2l3 7h7l-6 4 2 7-6-4-6 4 2-7-6-4h7z"/></symbol>
    <symbol id="moon"><path d="M12 3a9 9 0 1 0 9 9 7 7 0 0 1-9-9z"/></symbol>
</svg>"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let dir = std::env::temp_dir().join("inline-sprites");
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("icons.svg"), ICONS).await?;

    let location = Url::from_file_path(dir.join("index.html"))
        .map_err(|_| "temp dir is not an absolute path")?;
    let host = HostDocument::parse(PAGE, location)?;

    let options = Options {
        detect: false,
        observe: false,
        ..Options::default()
    };
    let polyfill = Polyfill::new(host.clone(), Arc::new(FileLoader), options)?;
    polyfill.settle().await;

    println!("{}", host.serialize()?);
    println!("{:?}", polyfill);

    Ok(())
}
