pub mod acquisition;
pub mod adaptive;
pub mod compare;
pub mod core;
pub mod distributions;
pub mod error;
pub mod gp;
pub mod io;
pub mod metropolis_hastings;
pub mod stats;
pub mod tuner;

pub use error::{Error, Result};
