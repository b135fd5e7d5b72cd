use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub api_base_url: Option<String>,
    pub ws_url: Option<String>,
    pub device_type: Option<String>,
    pub login_path: Option<String>,
    #[serde(default)]
    pub scanner: ScannerSettings,
}

/// Timings and channel names for the scan pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub poll_interval_ms: u64,
    pub decode_cooldown_ms: u64,
    pub cache_clear_secs: u64,
    pub health_check_secs: u64,
    pub inactivity_secs: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub token_expiry_margin_secs: i64,
    pub toast_debounce_secs: i64,
    pub toast_ttl_ms: u32,
    pub heartbeat_ms: u64,
    pub success_destination: String,
    pub error_destination: String,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            decode_cooldown_ms: 2_000,
            cache_clear_secs: 30,
            health_check_secs: 10,
            inactivity_secs: 60,
            backoff_base_secs: 2,
            backoff_max_secs: 30,
            token_expiry_margin_secs: 30,
            toast_debounce_secs: 3,
            toast_ttl_ms: 4_000,
            heartbeat_ms: 10_000,
            success_destination: "/user/queue/checkin-success".into(),
            error_destination: "/user/queue/checkin-errors".into(),
        }
    }
}

impl ScannerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn decode_cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.decode_cooldown_ms as i64)
    }

    pub fn cache_clear_interval(&self) -> Duration {
        Duration::from_secs(self.cache_clear_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn token_expiry_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_expiry_margin_secs)
    }

    pub fn toast_debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.toast_debounce_secs)
    }

    /// Value for the STOMP `heart-beat` header: `<send>,<receive>` in ms.
    pub fn heartbeat_header(&self) -> String {
        format!("{},{}", self.heartbeat_ms, self.heartbeat_ms)
    }
}

impl RuntimeConfig {
    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn ws_url(&self) -> &str {
        self.ws_url.as_deref().unwrap_or(DEFAULT_WS_URL)
    }

    pub fn device_type(&self) -> &str {
        self.device_type.as_deref().unwrap_or("web")
    }

    pub fn login_path(&self) -> &str {
        self.login_path.as_deref().unwrap_or("/login")
    }

    /// Fills unset fields from `fallback`; values already present win.
    fn merged_with(mut self, fallback: RuntimeConfig) -> Self {
        self.api_base_url = self.api_base_url.or(fallback.api_base_url);
        self.ws_url = self.ws_url.or(fallback.ws_url);
        self.device_type = self.device_type.or(fallback.device_type);
        self.login_path = self.login_path.or(fallback.login_path);
        self
    }
}

static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

fn read_string(obj: &js_sys::Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        js_sys::Reflect::get(obj, &(*key).into())
            .ok()
            .filter(|v| !v.is_undefined() && !v.is_null())
            .and_then(|v| v.as_string())
    })
}

fn global_object(name: &str) -> Option<js_sys::Object> {
    let w = web_sys::window()?;
    let any = js_sys::Reflect::get(&w, &name.into()).ok()?;
    if any.is_undefined() || any.is_null() {
        return None;
    }
    Some(js_sys::Object::from(any))
}

fn get_from_env_js() -> Option<RuntimeConfig> {
    // Expect optional global object: window.__CHECKIN_ENV = { API_BASE_URL: "...", WS_URL: "..." }
    let obj = global_object("__CHECKIN_ENV")?;
    Some(RuntimeConfig {
        api_base_url: read_string(&obj, &["API_BASE_URL", "api_base_url"]),
        ws_url: read_string(&obj, &["WS_URL", "ws_url"]),
        device_type: read_string(&obj, &["DEVICE_TYPE", "device_type"]),
        login_path: read_string(&obj, &["LOGIN_PATH", "login_path"]),
        scanner: ScannerSettings::default(),
    })
}

fn get_from_window_config() -> Option<RuntimeConfig> {
    // Written back by `write_window_config` after config.json was fetched once.
    let obj = global_object("__CHECKIN_CONFIG")?;
    Some(RuntimeConfig {
        api_base_url: read_string(&obj, &["api_base_url", "API_BASE_URL"]),
        ws_url: read_string(&obj, &["ws_url", "WS_URL"]),
        device_type: read_string(&obj, &["device_type"]),
        login_path: read_string(&obj, &["login_path"]),
        scanner: ScannerSettings::default(),
    })
}

fn write_window_config(cfg: &RuntimeConfig) {
    let w = match web_sys::window() {
        Some(win) => win,
        None => return,
    };
    let obj = js_sys::Object::new();
    let fields = [
        ("api_base_url", &cfg.api_base_url),
        ("ws_url", &cfg.ws_url),
        ("device_type", &cfg.device_type),
        ("login_path", &cfg.login_path),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            let _ = js_sys::Reflect::set(
                &obj,
                &key.into(),
                &wasm_bindgen::JsValue::from_str(value),
            );
        }
    }
    let _ = js_sys::Reflect::set(&w, &"__CHECKIN_CONFIG".into(), &obj);
}

async fn fetch_runtime_config() -> Option<RuntimeConfig> {
    let url = web_sys::window()
        .and_then(|w| w.location().origin().ok())
        .map(|origin| format!("{}/config.json", origin))?;
    let resp = reqwest::get(&url).await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json::<RuntimeConfig>().await.ok()
}

fn cache_config(cfg: RuntimeConfig) -> RuntimeConfig {
    let _ = RUNTIME_CONFIG.set(cfg.clone());
    RUNTIME_CONFIG.get().cloned().unwrap_or(cfg)
}

pub async fn await_runtime_config() -> RuntimeConfig {
    if let Some(cached) = RUNTIME_CONFIG.get() {
        return cached.clone();
    }
    let from_globals = get_from_env_js().or_else(get_from_window_config);
    if let Some(existing) = &from_globals {
        if existing.api_base_url.is_some() && existing.ws_url.is_some() {
            return cache_config(existing.clone());
        }
    }
    let fetched = fetch_runtime_config().await;
    if let Some(cfg) = &fetched {
        write_window_config(cfg);
    }
    let resolved = match (from_globals, fetched) {
        (Some(globals), Some(fetched)) => {
            let scanner = fetched.scanner.clone();
            let mut merged = globals.merged_with(fetched);
            merged.scanner = scanner;
            merged
        }
        (Some(globals), None) => globals,
        (None, Some(fetched)) => fetched,
        (None, None) => RuntimeConfig::default(),
    };
    log::info!(
        "runtime config resolved: api={} ws={}",
        resolved.api_base_url(),
        resolved.ws_url()
    );
    cache_config(resolved)
}

pub async fn await_api_base_url() -> String {
    await_runtime_config().await.api_base_url().to_string()
}

/// Config already resolved by `init`, or defaults when called earlier.
pub fn current() -> RuntimeConfig {
    RUNTIME_CONFIG.get().cloned().unwrap_or_default()
}

pub async fn init() {
    let _ = await_runtime_config().await;
}
