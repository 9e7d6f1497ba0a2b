pub mod client;
pub mod memory;
pub mod records;
pub mod schema;
pub mod store_model;
pub mod writer;
