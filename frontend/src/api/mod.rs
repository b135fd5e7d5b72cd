pub mod checkin;
pub mod client;
pub mod types;

pub use checkin::{ScanGateway, SESSION_HEADER};
pub use client::*;
pub use types::*;

#[cfg(all(test, not(target_arch = "wasm32")))]
pub mod test_support;
#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests;
