pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod pages;
pub mod realtime;
pub mod router;
pub mod scanner;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

/// Boots the scanner app: logging, runtime config, then the router.
pub fn run() {
    console_error_panic_hook::set_once();
    if let Err(err) = console_log::init_with_level(log::Level::Debug) {
        web_sys::console::warn_1(&format!("logger unavailable: {}", err).into());
    }
    log::info!("starting check-in scanner");

    leptos::spawn_local(async move {
        config::init().await;
        log::info!("runtime config initialized");
        router::mount_app();
    });
}
