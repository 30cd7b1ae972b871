pub mod indicators;
pub mod scorer;
pub mod traps;


pub use indicators::*;
pub use scorer::*;
pub use traps::*;
