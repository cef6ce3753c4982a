mod catalog;
mod error;
mod site_store;

pub use catalog::Catalog;
pub use error::StoreError;
pub use site_store::{storage_name, SiteStore, StoreConfig};
