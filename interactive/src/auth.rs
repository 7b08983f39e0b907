use leptos::prelude::*;
use vrcface_shared::User;
use wasm_bindgen_futures::spawn_local;

use crate::api::{self, ApiClient};

/// Reactive auth state shared via context.
#[derive(Clone, Copy, Debug)]
pub struct AuthState {
    pub user: RwSignal<Option<User>>,
}

impl AuthState {
    pub fn user_id(&self) -> Option<i64> {
        self.user.with(|u| u.as_ref().map(|u| u.id))
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id().is_some()
    }
}

/// Provider component: supplies the API client and auth context to children.
#[component]
pub fn AuthProvider(children: Children) -> impl IntoView {
    let client = ApiClient::from_page();
    let user: RwSignal<Option<User>> = RwSignal::new(None);

    provide_context(client.clone());
    provide_context(AuthState { user });

    if client.has_token() {
        spawn_local(async move {
            match client.get::<User>("/api/auth/me").await {
                Ok(u) => user.set(Some(u)),
                Err(_) => {
                    // Token rejected; drop it
                    client.clear_token();
                    user.set(None);
                }
            }
        });
    }

    children()
}

/// Login / logout control. Login itself happens at the identity provider.
#[component]
pub fn LoginButton() -> impl IntoView {
    let auth = expect_context::<AuthState>();
    let client = StoredValue::new(expect_context::<ApiClient>());
    let login_url = api::meta_content("vrcface-login").unwrap_or_else(|| "/login".to_string());

    let on_logout = move |_| {
        client.with_value(|c| c.clear_token());
        auth.user.set(None);
    };

    move || {
        if let Some(user) = auth.user.get() {
            view! {
                <div class="vrcface-auth">
                    <img src={user.avatar_url.clone()} alt="" class="vrcface-avatar" width="24" height="24" />
                    <span class="vrcface-username">{user.username.clone()}</span>
                    <button class="vrcface-btn vrcface-btn-sm" on:click=on_logout>"Logout"</button>
                </div>
            }
            .into_any()
        } else {
            view! {
                <a class="vrcface-btn" href={login_url.clone()}>"Log in"</a>
            }
            .into_any()
        }
    }
}
