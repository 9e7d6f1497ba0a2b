pub mod attempt;
pub mod budget;
pub mod capture_model;
pub mod engine;
pub mod guard;
pub mod protocols;
pub mod variants;
