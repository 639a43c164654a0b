//! External `<use>` reference resolution
//!
//! Hosts that cannot dereference `<use href="sprite.svg#icon">` across
//! documents get the referenced file loaded once per address, its identifiers
//! prefixed to stay unique, its document element injected into the host, and
//! every referencing element repointed at the local copy.
//!
//! # Architecture
//!
//! ```text
//! Polyfill (controller)
//!   ├── observer   mutation / viewport triggers → re-scan
//!   └── Engine (processor)
//!         ├── address     reference → (address, fragment)
//!         ├── cache       single-flight file state, element bindings
//!         ├── loader      one fetch per address
//!         ├── identifier  collision-free ids, document rewriting
//!         ├── events      cancelable notifications
//!         └── frame       deferred, batched host mutations
//! ```
//!
//! Nothing here raises out of a scan: bad references are skipped, failed loads
//! are logged and recorded, vetoed steps are simply not taken.

pub mod address;
pub mod attribute;
pub mod cache;
pub mod detect;
pub mod error;
pub mod events;
pub mod frame;
pub mod host;
pub mod identifier;
pub mod loader;
pub mod observer;
pub mod options;
pub mod polyfill;
pub mod processor;

pub use address::{resolve, Reference};
pub use attribute::ReferenceAttribute;
pub use cache::{DocumentCache, ElementBinding, FileState};
pub use error::{LoadError, PolyfillError, Result};
pub use events::{EventBus, Notification, NotificationDetail, NotificationKind};
pub use host::{HostDocument, HostEvent};
pub use identifier::{derive_identifier, rewrite_document};
#[cfg(feature = "http")]
pub use loader::HttpLoader;
pub use loader::{load_document, FileLoader, Loader, MemoryLoader};
pub use options::{Options, Target};
pub use polyfill::{ControllerState, Polyfill};
pub use processor::{Engine, Outcome};
