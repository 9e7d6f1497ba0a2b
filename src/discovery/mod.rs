pub mod inventory_model;
pub mod scanner;
pub mod states;
