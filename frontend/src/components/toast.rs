use leptos::*;

use crate::scanner::notify::{Toast, ToastLevel};

fn toast_class(level: ToastLevel) -> &'static str {
    match level {
        ToastLevel::Info => "bg-status-info-bg border-status-info-border text-status-info-text",
        ToastLevel::Success => {
            "bg-status-success-bg border-status-success-border text-status-success-text"
        }
        ToastLevel::Error => "bg-status-error-bg border-status-error-border text-status-error-text",
    }
}

#[component]
pub fn ToastStack(toasts: RwSignal<Vec<Toast>>, on_dismiss: Callback<u64>) -> impl IntoView {
    view! {
        <div class="fixed top-4 right-4 z-50 flex flex-col gap-2 w-80" role="status" aria-live="polite">
            <For
                each=move || toasts.get()
                key=|toast| toast.id
                children=move |toast| {
                    let id = toast.id;
                    view! {
                        <div class=format!("border px-4 py-3 rounded shadow flex items-start gap-2 {}", toast_class(toast.level))>
                            <span class="flex-1 text-sm">{toast.message}</span>
                            <button
                                class="text-xs opacity-75 hover:opacity-100"
                                aria-label="Dismiss"
                                on:click=move |_| on_dismiss.call(id)
                            >
                                "✕"
                            </button>
                        </div>
                    }
                }
            />
        </div>
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod host_tests {
    use super::*;
    use crate::test_support::ssr::render_to_string;

    #[test]
    fn renders_each_toast_with_its_level() {
        let html = render_to_string(|| {
            let toasts = create_rw_signal(vec![
                Toast {
                    id: 1,
                    level: ToastLevel::Success,
                    message: "Checked in Ada".into(),
                },
                Toast {
                    id: 2,
                    level: ToastLevel::Error,
                    message: "Not connected".into(),
                },
            ]);
            view! { <ToastStack toasts=toasts on_dismiss=Callback::new(|_| ()) /> }
        });
        assert!(html.contains("Checked in Ada"));
        assert!(html.contains("Not connected"));
        assert!(html.contains("bg-status-success-bg"));
        assert!(html.contains("bg-status-error-bg"));
    }
}
