mod clip;
mod curve;
mod driver;
mod pose;
mod scheduler;
mod transition;

pub use clip::*;
pub use driver::*;
pub use pose::*;
pub use scheduler::*;
pub use transition::*;

#[cfg(test)]
mod clip_tests;
