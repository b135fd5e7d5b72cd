use chrono::{Local, NaiveDate};
use std::time::Duration;

/// Calendar date on the scanning device.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
