pub mod checkpoint;
pub mod orchestrator;
pub mod page_record;
pub mod recovery;
