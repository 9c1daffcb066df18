pub mod case;
pub mod detection;
pub mod queue;
