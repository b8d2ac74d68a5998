//! # WebDistill Headless
//!
//! The `headless_browser` and `browser_attach` fetcher plugins (spec
//! §4.4.2, §4.4.3): a pooled `chromiumoxide` browser for the former, a
//! direct CDP attach for the latter. Both share the same navigation and
//! wait-strategy machinery in [`nav`].

pub mod attach;
pub mod browser;
pub mod nav;
pub mod pool;

pub use attach::BrowserAttachFetcher;
pub use browser::HeadlessBrowserFetcher;
pub use pool::{BrowserPool, BrowserPoolConfig};
