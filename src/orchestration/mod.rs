pub mod batch_controller;
pub mod job;

pub use batch_controller::BatchController;
