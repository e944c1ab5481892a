//! Entity models

pub mod cycle;
pub mod nutrients;
pub mod rainfall;
pub mod weather;

pub use cycle::*;
pub use nutrients::*;
pub use rainfall::*;
pub use weather::*;
