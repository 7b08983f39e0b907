use leptos::prelude::*;
use vrcface_shared::{Model, ModelPage, ModelSort};
use wasm_bindgen_futures::spawn_local;

use crate::api::ApiClient;
use crate::waterfall::Waterfall;

const PAGE_SIZE: u32 = 20;
const EXCERPT_CHARS: usize = 240;

fn sort_param(sort: ModelSort) -> &'static str {
    match sort {
        ModelSort::Latest => "latest",
        ModelSort::Popular => "popular",
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// Infinite-scroll feed of public models.
#[component]
pub fn ModelGallery(#[prop(optional)] sort: ModelSort) -> impl IntoView {
    let client = StoredValue::new(expect_context::<ApiClient>());
    let models: RwSignal<Vec<Model>> = RwSignal::new(Vec::new());
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
            let path = format!(
                "/api/models?page={page}&limit={PAGE_SIZE}&sort={}",
                sort_param(sort)
            );
            match client.get::<ModelPage>(&path).await {
                Ok(fetched) => {
                    models.update(|list| {
                        for m in fetched.models {
                            if !list.iter().any(|known| known.id == m.id) {
                                list.push(m);
                            }
                        }
                    });
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

    load();

    let on_load_more = Callback::new(move |()| load());
    let has_more = Signal::derive(move || next_page.get().is_some() && error.get().is_none());

    view! {
        <section class="vrcface-gallery">
            <Waterfall
                items=models
                item_key=|m: &Model| m.id.to_string()
                render_item=|m: Model| view! { <ModelCard model=m /> }
                on_load_more=on_load_more
                has_more=has_more
                loading=loading
            />
            <Show when=move || error.get().is_some()>
                <p class="vrcface-error">
                    {move || error.get().unwrap_or_default()}
                    " "
                    <button class="vrcface-btn vrcface-btn-sm" on:click=move |_| load()>"Retry"</button>
                </p>
            </Show>
            <Show when=move || !loading.get() && error.get().is_none() && models.with(|m| m.is_empty())>
                <p class="vrcface-hint">"No models published yet."</p>
            </Show>
        </section>
    }
}

#[component]
fn ModelCard(model: Model) -> impl IntoView {
    let href = format!("/models/{}", model.id);
    view! {
        <article class="vrcface-card">
            <a class="vrcface-card-title" href=href>{model.title.clone()}</a>
            <div class="vrcface-card-author">
                <img src=model.author.avatar_url.clone() alt="" class="vrcface-avatar" width="20" height="20" />
                <span>{model.author.username.clone()}</span>
            </div>
            <p class="vrcface-card-body">{excerpt(&model.description)}</p>
            <footer class="vrcface-card-meta">
                <span>{format!("{} comments", model.comment_count)}</span>
                <time>{model.created_at.clone()}</time>
            </footer>
        </article>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_descriptions_are_kept_whole() {
        assert_eq!(excerpt("hello"), "hello");
    }

    #[test]
    fn long_descriptions_are_cut_on_a_char_boundary() {
        let text = "表情".repeat(200);
        let cut = excerpt(&text);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn sort_param_matches_server_names() {
        assert_eq!(sort_param(ModelSort::Latest), "latest");
        assert_eq!(sort_param(ModelSort::Popular), "popular");
    }
}
