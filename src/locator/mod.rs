pub mod classifier;
pub mod identity;
pub mod locator_model;
