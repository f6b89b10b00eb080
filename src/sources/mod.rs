//! Upstream provider clients

pub mod factory;
pub mod traits;
pub mod xtream;

pub use factory::ProviderClientFactory;
pub use traits::ProviderClient;
pub use xtream::XtreamClient;
