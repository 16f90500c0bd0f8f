pub mod consumption;
pub mod prices;

pub use consumption::*;
pub use prices::*;
