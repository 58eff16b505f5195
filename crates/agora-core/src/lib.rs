pub mod config;
pub mod error;
pub mod persona;
pub mod types;

pub use config::AgoraConfig;
pub use error::{AgoraError, Result};
pub use persona::{Essence, Persona, Powers, Settings};
pub use types::*;
