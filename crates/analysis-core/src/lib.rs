pub mod config;
pub mod decision;
pub mod error;
pub mod overtrading;
pub mod risk;
pub mod scores;
pub mod signals;
pub mod stats;
pub mod traits;
pub mod types;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use overtrading::*;
pub use risk::*;
pub use scores::*;
pub use signals::*;
pub use traits::*;
pub use types::*;
