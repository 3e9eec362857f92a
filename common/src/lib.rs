pub mod config;
pub mod events;
pub mod models;
pub mod utils;

pub use config::*;
pub use events::*;
pub use utils::*;
