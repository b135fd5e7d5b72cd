#[cfg(all(test, not(target_arch = "wasm32")))]
pub mod pipeline;
#[cfg(all(test, not(target_arch = "wasm32")))]
pub mod ssr;
