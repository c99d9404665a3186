pub mod api;
pub mod coordinator;
pub mod integration;
pub mod model;
pub mod scheduler;
pub mod sensor;
pub mod settings;

#[cfg(test)]
mod testing;

pub use api::Error;
pub use coordinator::{Coordinator, Fetch, Refresh, Subscriber, Update};
pub use integration::Integration;
pub use scheduler::Scheduler;
