use leptos::*;
use leptos_router::*;

use crate::{
    api::ApiClient,
    components::guard::RequireAuth,
    config,
    pages::ScannerPage,
    state::{
        auth::provide_auth_from_storage,
        scanner::{provide_scanner_session, ScannerSession},
    },
};

pub const ROUTE_PATHS: &[&str] = &["/", "/scanner"];

pub fn mount_app() {
    mount_to_body(app_root);
}

pub fn app_root() -> impl IntoView {
    let client = ApiClient::new();
    provide_context(client.clone());
    provide_auth_from_storage();
    provide_scanner_session(ScannerSession::browser(&config::current(), client));
    view! {
        <Router>
            <Routes>
                <Route path="/" view=ProtectedScanner/>
                <Route path="/scanner" view=ProtectedScanner/>
            </Routes>
        </Router>
    }
}

#[component]
fn ProtectedScanner() -> impl IntoView {
    view! { <RequireAuth><ScannerPage/></RequireAuth> }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn scanner_is_served_from_root() {
        assert!(ROUTE_PATHS.contains(&"/"));
        assert!(ROUTE_PATHS.contains(&"/scanner"));
    }

    #[test]
    fn no_duplicate_routes() {
        let unique: HashSet<&str> = ROUTE_PATHS.iter().copied().collect();
        assert_eq!(unique.len(), ROUTE_PATHS.len());
    }
}
