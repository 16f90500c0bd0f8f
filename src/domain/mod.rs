pub mod battery;
pub mod provider;
pub mod types;

pub use battery::*;
pub use provider::*;
pub use types::*;
