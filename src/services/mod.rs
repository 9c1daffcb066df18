pub mod hub;
pub mod inference;
pub mod orchestrator;
pub mod records;
pub mod stages;
pub mod subscription;
pub mod validation;
