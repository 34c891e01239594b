pub mod bypass_client;
pub mod direct;
pub mod extractor;
pub mod proxy_feed;
pub mod render_client;
pub mod socks;

pub use bypass_client::FlareSolverrClient;
pub use direct::DirectTier;
pub use extractor::{ListingSelectors, SelectorExtractor};
pub use proxy_feed::HttpProxyFeed;
pub use render_client::BrowserlessClient;
pub use socks::Socks5Probe;
