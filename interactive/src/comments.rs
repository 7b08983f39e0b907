use leptos::prelude::*;
use vrcface_shared::thread::{indent_level, ReplyThread};
use vrcface_shared::{
    Comment, CommentPage, CreateComment, RepliesPage, UpdateComment, MAX_COMMENT_CHARS,
};
use wasm_bindgen_futures::spawn_local;

use crate::api::ApiClient;
use crate::auth::{AuthState, LoginButton};
use crate::likes::LikeButton;

const PAGE_SIZE: u32 = 10;
const INDENT_PX: usize = 24;

/// Paginated comment section for one model.
#[component]
pub fn CommentSection(model_id: i64) -> impl IntoView {
    let client = StoredValue::new(expect_context::<ApiClient>());
    let comments: RwSignal<Vec<Comment>> = RwSignal::new(Vec::new());
    let total = RwSignal::new(0i64);
    let next_page: RwSignal<Option<u32>> = RwSignal::new(Some(1));
    let loading = RwSignal::new(false);
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let load = move || {
        let Some(page) = next_page.get_untracked() else {
            return;
        };
        if loading.get_untracked() {
            return;
        }
        loading.set(true);
        error.set(None);
        let client = client.get_value();
        spawn_local(async move {
            let path = format!("/api/models/{model_id}/comments?page={page}&limit={PAGE_SIZE}");
            match client.get::<CommentPage>(&path).await {
                Ok(fetched) => {
                    comments.update(|list| {
                        for c in fetched.comments {
                            if !list.iter().any(|known| known.id == c.id) {
                                list.push(c);
                            }
                        }
                    });
                    total.set(fetched.pagination.total);
                    next_page.set(
                        fetched
                            .pagination
                            .has_next
                            .then(|| fetched.pagination.page + 1),
                    );
                }
                Err(e) => error.set(Some(e)),
            }
            loading.set(false);
        });
    };

    // First page on mount
    load();

    let on_posted = Callback::new(move |c: Comment| {
        comments.update(|list| list.insert(0, c));
        total.update(|t| *t += 1);
    });
    let on_removed = Callback::new(move |id: i64| {
        comments.update(|list| list.retain(|c| c.id != id));
        total.update(|t| *t = (*t - 1).max(0));
    });
    let on_edited = Callback::new(move |updated: Comment| {
        comments.update(|list| {
            if let Some(slot) = list.iter_mut().find(|c| c.id == updated.id) {
                let replies = std::mem::take(&mut slot.replies);
                *slot = Comment { replies, ..updated };
            }
        });
    });

    view! {
        <section class="vrcface-comments">
            <h3>"Comments (" {move || total.get()} ")"</h3>
            <LoginButton />
            <CommentForm model_id=model_id on_posted=on_posted />
            <div class="vrcface-comment-list">
                <For
                    each=move || comments.get()
                    key=|c| c.id
                    let:comment
                >
                    <CommentItem comment=comment depth=0 on_removed=on_removed on_edited=on_edited />
                </For>
            </div>
            <Show when=move || loading.get()>
                <p class="vrcface-loading">"Loading comments..."</p>
            </Show>
            <Show when=move || error.get().is_some()>
                <p class="vrcface-error">
                    {move || error.get().unwrap_or_default()}
                    " "
                    <button class="vrcface-btn vrcface-btn-sm" on:click=move |_| load()>"Retry"</button>
                </p>
            </Show>
            <Show when=move || next_page.get().is_some() && !loading.get() && error.get().is_none()>
                <button class="vrcface-btn vrcface-load-more" on:click=move |_| load()>
                    "Load more comments"
                </button>
            </Show>
        </section>
    }
}

/// Form for a new top-level comment or a reply.
#[component]
fn CommentForm(
    model_id: i64,
    #[prop(optional)] parent_id: Option<i64>,
    on_posted: Callback<Comment>,
    #[prop(optional)] on_cancel: Option<Callback<()>>,
) -> impl IntoView {
    let auth = expect_context::<AuthState>();
    let client = StoredValue::new(expect_context::<ApiClient>());
    let content = RwSignal::new(String::new());
    let submitting = RwSignal::new(false);
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let on_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let text = content.get_untracked();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        if trimmed.chars().count() > MAX_COMMENT_CHARS {
            error.set(Some(format!(
                "Comments are limited to {MAX_COMMENT_CHARS} characters"
            )));
            return;
        }
        submitting.set(true);
        error.set(None);
        let payload = CreateComment {
            content: trimmed.to_string(),
            parent_id,
        };
        let client = client.get_value();
        spawn_local(async move {
            match client
                .post::<Comment, _>(&format!("/api/models/{model_id}/comments"), &payload)
                .await
            {
                Ok(c) => {
                    content.set(String::new());
                    on_posted.run(c);
                }
                Err(e) => error.set(Some(e)),
            }
            submitting.set(false);
        });
    };

    let placeholder = if parent_id.is_some() {
        "Write a reply..."
    } else {
        "Write a comment..."
    };

    move || {
        if auth.is_logged_in() {
            view! {
                <form class="vrcface-comment-form" on:submit=on_submit>
                    <textarea
                        class="vrcface-textarea"
                        placeholder=placeholder
                        maxlength=MAX_COMMENT_CHARS.to_string()
                        prop:value=move || content.get()
                        on:input=move |ev| content.set(event_target_value(&ev))
                    />
                    <Show when=move || error.get().is_some()>
                        <p class="vrcface-error">{move || error.get().unwrap_or_default()}</p>
                    </Show>
                    <button class="vrcface-btn" type="submit" disabled=move || submitting.get()>
                        {move || if submitting.get() { "Posting..." } else { "Post" }}
                    </button>
                    {on_cancel.map(|cancel| view! {
                        <button
                            class="vrcface-btn vrcface-btn-sm"
                            type="button"
                            on:click=move |_| cancel.run(())
                        >
                            "Cancel"
                        </button>
                    })}
                </form>
            }
            .into_any()
        } else {
            view! { <p class="vrcface-hint">"Log in to comment."</p> }.into_any()
        }
    }
}

/// One comment with its lazily loaded reply subtree.
#[component]
fn CommentItem(
    comment: Comment,
    depth: usize,
    on_removed: Callback<i64>,
    on_edited: Callback<Comment>,
) -> AnyView {
    let auth = expect_context::<AuthState>();
    let client = StoredValue::new(expect_context::<ApiClient>());
    let comment_id = comment.id;
    let model_id = comment.model_id;
    let author_id = comment.author.id;
    let initial_likes = comment.likes;

    let thread = RwSignal::new(ReplyThread::from_comment(&comment));
    let current = RwSignal::new(comment);
    let editing = RwSignal::new(false);
    let replying = RwSignal::new(false);
    let draft = RwSignal::new(String::new());
    let action_error: RwSignal<Option<String>> = RwSignal::new(None);

    let is_own = move || auth.user_id() == Some(author_id);

    let fetch = move |page: u32| {
        let client = client.get_value();
        spawn_local(async move {
            let path = format!("/api/comments/{comment_id}?page={page}&limit={PAGE_SIZE}");
            let result = client.get::<RepliesPage>(&path).await;
            thread.update(|t| t.finish_load(result));
        });
    };

    let on_toggle = move |_| {
        if let Some(page) = thread.try_update(|t| t.toggle()).flatten() {
            fetch(page);
        }
    };
    let on_more = move |_| {
        if let Some(page) = thread.try_update(|t| t.load_more()).flatten() {
            fetch(page);
        }
    };
    let on_retry = move |_| {
        if let Some(page) = thread.try_update(|t| t.retry()).flatten() {
            fetch(page);
        }
    };

    let on_start_edit = move |_| {
        draft.set(current.with_untracked(|c| c.content.clone()));
        action_error.set(None);
        editing.set(true);
    };
    let on_save = move |_| {
        let text = draft.get_untracked().trim().to_string();
        if text.is_empty() {
            return;
        }
        let client = client.get_value();
        spawn_local(async move {
            let body = UpdateComment { content: text };
            match client
                .put::<Comment, _>(&format!("/api/comments/{comment_id}"), &body)
                .await
            {
                Ok(updated) => {
                    current.update(|c| {
                        let replies = std::mem::take(&mut c.replies);
                        *c = Comment {
                            replies,
                            ..updated.clone()
                        };
                    });
                    editing.set(false);
                    on_edited.run(updated);
                }
                Err(e) => action_error.set(Some(e)),
            }
        });
    };
    let on_delete = move |_| {
        let client = client.get_value();
        spawn_local(async move {
            match client.delete(&format!("/api/comments/{comment_id}")).await {
                Ok(()) => on_removed.run(comment_id),
                Err(e) => action_error.set(Some(e)),
            }
        });
    };

    let on_reply_added = Callback::new(move |reply: Comment| {
        replying.set(false);
        if let Some(page) = thread.try_update(|t| t.add_reply(reply)).flatten() {
            fetch(page);
        }
    });
    let on_child_removed = Callback::new(move |id: i64| {
        thread.update(|t| t.remove_reply(id));
    });
    let on_child_edited = Callback::new(move |updated: Comment| {
        thread.update(|t| t.replace_reply(updated));
    });
    let on_cancel_reply = Callback::new(move |()| replying.set(false));

    let indent = indent_level(depth);
    let toggle_label = move || {
        thread.with(|t| {
            if t.expanded {
                "Hide replies".to_string()
            } else if t.reply_count == 1 {
                "Show 1 reply".to_string()
            } else {
                format!("Show {} replies", t.reply_count)
            }
        })
    };

    view! {
        <div
            class=format!("vrcface-comment vrcface-depth-{indent}")
            style=format!("margin-left: {}px", indent * INDENT_PX)
        >
            <div class="vrcface-comment-header">
                <img
                    src=move || current.with(|c| c.author.avatar_url.clone())
                    alt=""
                    class="vrcface-avatar"
                    width="24"
                    height="24"
                />
                <strong>{move || current.with(|c| c.author.username.clone())}</strong>
                <time>{move || current.with(|c| c.created_at.clone())}</time>
                <Show when=move || current.with(|c| c.is_edited)>
                    <span class="vrcface-edited">"(edited)"</span>
                </Show>
            </div>

            <Show
                when=move || editing.get()
                fallback=move || view! {
                    <p class="vrcface-comment-body">{move || current.with(|c| c.content.clone())}</p>
                }
            >
                <div class="vrcface-comment-edit">
                    <textarea
                        class="vrcface-textarea"
                        maxlength=MAX_COMMENT_CHARS.to_string()
                        prop:value=move || draft.get()
                        on:input=move |ev| draft.set(event_target_value(&ev))
                    />
                    <button class="vrcface-btn vrcface-btn-sm" on:click=on_save>"Save"</button>
                    <button class="vrcface-btn vrcface-btn-sm" on:click=move |_| editing.set(false)>
                        "Cancel"
                    </button>
                </div>
            </Show>

            <Show when=move || action_error.get().is_some()>
                <p class="vrcface-error">{move || action_error.get().unwrap_or_default()}</p>
            </Show>

            <div class="vrcface-comment-actions">
                <LikeButton comment_id=comment_id initial_likes=initial_likes />
                <Show when=move || auth.is_logged_in()>
                    <button class="vrcface-btn vrcface-btn-sm" on:click=move |_| replying.update(|r| *r = !*r)>
                        "Reply"
                    </button>
                </Show>
                <Show when=is_own>
                    <button class="vrcface-btn vrcface-btn-sm" on:click=on_start_edit>"Edit"</button>
                    <button class="vrcface-btn vrcface-btn-sm vrcface-btn-danger" on:click=on_delete>
                        "Delete"
                    </button>
                </Show>
            </div>

            <Show when=move || replying.get()>
                <CommentForm
                    model_id=model_id
                    parent_id=comment_id
                    on_posted=on_reply_added
                    on_cancel=on_cancel_reply
                />
            </Show>

            <Show when=move || thread.with(|t| t.is_expandable())>
                <button class="vrcface-btn vrcface-btn-link vrcface-toggle-replies" on:click=on_toggle>
                    {toggle_label}
                </button>
            </Show>

            <Show when=move || thread.with(|t| t.expanded)>
                <div class="vrcface-replies">
                    <For
                        each=move || thread.with(|t| t.replies.clone())
                        key=|c| c.id
                        let:reply
                    >
                        <CommentItem
                            comment=reply
                            depth=depth + 1
                            on_removed=on_child_removed
                            on_edited=on_child_edited
                        />
                    </For>
                    <Show when=move || thread.with(|t| t.loading)>
                        <p class="vrcface-loading">"Loading replies..."</p>
                    </Show>
                    <Show when=move || thread.with(|t| t.error.is_some())>
                        <p class="vrcface-error">
                            {move || thread.with(|t| t.error.clone().unwrap_or_default())}
                            " "
                            <button class="vrcface-btn vrcface-btn-sm" on:click=on_retry>"Retry"</button>
                        </p>
                    </Show>
                    <Show when=move || thread.with(|t| t.has_more() && !t.loading)>
                        <button class="vrcface-btn vrcface-btn-link" on:click=on_more>"More replies"</button>
                    </Show>
                </div>
            </Show>
        </div>
    }
    .into_any()
}
