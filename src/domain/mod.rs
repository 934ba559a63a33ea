pub mod calendar;
pub mod closing;
pub mod filters;
pub mod timer;
pub mod validation;

pub use validation::WorkflowError;
