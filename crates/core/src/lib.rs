pub mod config;
pub mod error;
pub mod location;
pub mod models;
pub mod picker;
pub mod player;
pub mod preview;
pub mod process;
pub mod scan;
pub mod session;
pub mod state;
pub mod video;

pub use crate::error::{Error, Result};
pub use crate::models::*;
