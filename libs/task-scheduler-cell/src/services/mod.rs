pub mod memory;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use memory::*;
pub use queue::*;
pub use scheduler::*;
pub use worker::*;
