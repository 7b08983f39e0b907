use leptos::prelude::*;
use vrcface_shared::LikeResponse;
use wasm_bindgen_futures::spawn_local;

use crate::api::ApiClient;
use crate::auth::AuthState;

/// Heart toggle with count.
#[component]
pub fn LikeButton(comment_id: i64, initial_likes: i64) -> impl IntoView {
    let auth = expect_context::<AuthState>();
    let client = StoredValue::new(expect_context::<ApiClient>());
    let likes = RwSignal::new(initial_likes);
    let liked = RwSignal::new(false);

    // Whether the current user already likes it
    Effect::new(move |_| {
        if auth.is_logged_in() {
            let client = client.get_value();
            spawn_local(async move {
                if let Ok(status) = client
                    .get::<LikeResponse>(&format!("/api/comments/{comment_id}/like"))
                    .await
                {
                    likes.set(status.likes);
                    liked.set(status.liked);
                }
            });
        }
    });

    let on_click = move |_| {
        if !auth.is_logged_in() {
            return;
        }
        // Optimistic update
        let prev_likes = likes.get_untracked();
        let prev_liked = liked.get_untracked();
        liked.set(!prev_liked);
        likes.set(if prev_liked { prev_likes - 1 } else { prev_likes + 1 });

        let client = client.get_value();
        spawn_local(async move {
            match client
                .post::<LikeResponse, _>(&format!("/api/comments/{comment_id}/like"), &())
                .await
            {
                Ok(status) => {
                    likes.set(status.likes);
                    liked.set(status.liked);
                }
                Err(_) => {
                    // Rollback
                    likes.set(prev_likes);
                    liked.set(prev_liked);
                }
            }
        });
    };

    view! {
        <button
            class="vrcface-like-btn"
            class:active=move || liked.get()
            on:click=on_click
            disabled=move || !auth.is_logged_in()
        >
            "\u{2665} "
            <span class="vrcface-like-count">{move || likes.get()}</span>
        </button>
    }
}
