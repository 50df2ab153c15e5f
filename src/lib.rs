pub mod archive;
pub mod dota;
pub mod executor;
pub mod fetch;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use dota::*;
pub use executor::*;
pub use fetch::GoogleDriveFetcher;
pub use model::*;
pub use traits::*;
