use crate::{config, state::auth::use_auth};
use leptos::*;

/// Renders `children` only for a signed-in scanner; otherwise sends the
/// browser to the login page.
#[component]
pub fn RequireAuth(children: ChildrenFn) -> impl IntoView {
    let (auth, _) = use_auth();
    let is_authenticated = create_memo(move |_| auth.get().is_authenticated);
    create_effect(move |_| {
        if is_authenticated.get() {
            return;
        }
        let login_path = config::current().login_path().to_string();
        if let Some(win) = web_sys::window() {
            let _ = win.location().set_href(&login_path);
        }
    });
    view! {
        <Show when=move || is_authenticated.get() fallback=|| ()>
            {children()}
        </Show>
    }
}
