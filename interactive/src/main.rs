mod api;
mod auth;
mod comments;
mod gallery;
mod likes;
mod waterfall;

use leptos::prelude::*;
use vrcface_shared::ModelSort;
use wasm_bindgen::JsCast;

fn main() {
    console_error_panic_hook::set_once();

    let document = web_sys::window()
        .expect("no window")
        .document()
        .expect("no document");

    // Mount the model gallery if the mount point exists
    if let Some(el) = document.get_element_by_id("vrcface-gallery") {
        let sort = match el.get_attribute("data-sort").as_deref() {
            Some("popular") => ModelSort::Popular,
            _ => ModelSort::Latest,
        };
        let html_el: web_sys::HtmlElement = el.unchecked_into();
        leptos::mount::mount_to(html_el, move || {
            view! {
                <auth::AuthProvider>
                    <gallery::ModelGallery sort=sort />
                </auth::AuthProvider>
            }
        })
        .forget();
    }

    // Mount the comment section if the mount point exists
    if let Some(el) = document.get_element_by_id("vrcface-comments") {
        let model_id = el
            .get_attribute("data-model")
            .and_then(|raw| raw.parse::<i64>().ok());
        if let Some(model_id) = model_id {
            let html_el: web_sys::HtmlElement = el.unchecked_into();
            leptos::mount::mount_to(html_el, move || {
                view! {
                    <auth::AuthProvider>
                        <comments::CommentSection model_id=model_id />
                    </auth::AuthProvider>
                }
            })
            .forget();
        }
    }
}
