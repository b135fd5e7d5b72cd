use uuid::Uuid;
use web_sys::{Storage, Window};

pub const DEVICE_ID_KEY: &str = "device_id";

pub fn window() -> Result<Window, String> {
    web_sys::window().ok_or_else(|| "No window object".to_string())
}

pub fn local_storage() -> Result<Storage, String> {
    window()?
        .local_storage()
        .map_err(|_| "No localStorage".to_string())?
        .ok_or_else(|| "No localStorage".to_string())
}

/// Stable identifier for this browser, generated on first use.
pub fn ensure_device_id(storage: &Storage) -> Result<String, String> {
    if let Ok(Some(id)) = storage.get_item(DEVICE_ID_KEY) {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }
    let id = new_device_id();
    storage
        .set_item(DEVICE_ID_KEY, &id)
        .map_err(|_| "Failed to persist device id")?;
    Ok(id)
}

fn new_device_id() -> String {
    format!("device-{}", Uuid::new_v4())
}
