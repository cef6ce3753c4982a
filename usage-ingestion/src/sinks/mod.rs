pub mod site_store;

pub use site_store::SiteStoreSink;
