use std::collections::HashMap;
use std::time::Duration;

use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use vrcface_shared::masonry::{
    should_load_more, Generation, MasonryConfig, MasonryLayout, PassOutcome,
};
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

/// Delay between an item change and its measurement pass.
const SETTLE: Duration = Duration::from_millis(100);
/// Passes retried while cards are still unmeasured.
const MAX_ATTEMPTS: u32 = 10;
const ID_ATTR: &str = "data-waterfall-id";

struct Observer {
    inner: web_sys::ResizeObserver,
    _callback: Closure<dyn FnMut()>,
    nodes: HashMap<String, web_sys::Element>,
}

impl Observer {
    /// Observes cards that appeared and forgets cards that went away.
    fn sync(&mut self, seen: &[(String, web_sys::Element)]) {
        let mut stale: HashMap<String, web_sys::Element> = std::mem::take(&mut self.nodes);
        for (id, el) in seen {
            match stale.remove(id) {
                Some(known) if known.is_same_node(Some(el.as_ref())) => {}
                Some(known) => {
                    self.inner.unobserve(&known);
                    self.inner.observe(el);
                }
                None => self.inner.observe(el),
            }
            self.nodes.insert(id.clone(), el.clone());
        }
        for el in stale.values() {
            self.inner.unobserve(el);
        }
    }
}

#[derive(Clone, Copy)]
struct Handles {
    layout: RwSignal<MasonryLayout>,
    container: NodeRef<html::Div>,
    observer: StoredValue<Option<Observer>, LocalStorage>,
}

/// Reads every card's height and commits it to the layout if the pass is
/// still current. Unmeasured cards get another pass after `SETTLE`; once
/// the retries run out they keep the fallback height.
fn measure(h: Handles, generation: Generation, attempt: u32) {
    let Some(container) = h.container.get_untracked() else {
        return;
    };
    let Ok(nodes) = container.query_selector_all(&format!("[{ID_ATTR}]")) else {
        return;
    };

    let mut seen = Vec::with_capacity(nodes.length() as usize);
    for i in 0..nodes.length() {
        let Some(el) = nodes.item(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok()) else {
            continue;
        };
        if let Some(id) = el.get_attribute(ID_ATTR) {
            seen.push((id, el));
        }
    }

    h.observer.try_update_value(|o| {
        if let Some(o) = o {
            o.sync(&seen);
        }
    });

    let measurements: Vec<(String, f64)> = seen
        .iter()
        .map(|(id, el)| (id.clone(), el.get_bounding_client_rect().height()))
        .collect();

    match h.layout.try_update(|l| l.apply(generation, measurements)) {
        Some(PassOutcome::Pending { .. }) if attempt + 1 < MAX_ATTEMPTS => {
            set_timeout(move || measure(h, generation, attempt + 1), SETTLE);
        }
        Some(PassOutcome::Pending { unmeasured }) => {
            leptos::logging::warn!(
                "waterfall: {unmeasured} card(s) never reported a height, using the fallback"
            );
            h.layout.update(|l| {
                l.commit_fallback(generation);
            });
        }
        _ => {}
    }
}

/// Masonry grid: cards of any height packed into equal-width columns.
///
/// Each item is wrapped in an absolutely positioned cell keyed by
/// `item_key`. A cell stays invisible until its position is final, that is
/// until it and every card placed before it have been measured.
#[component]
pub fn Waterfall<T, K, R, V>(
    #[prop(into)] items: Signal<Vec<T>>,
    item_key: K,
    render_item: R,
    #[prop(optional)] on_load_more: Option<Callback<()>>,
    #[prop(into, default = Signal::stored(false))] has_more: Signal<bool>,
    #[prop(into, default = Signal::stored(false))] loading: Signal<bool>,
    #[prop(default = 16.0)] gap: f64,
    #[prop(default = 280.0)] min_column_width: f64,
) -> impl IntoView
where
    T: Clone + Send + Sync + 'static,
    K: Fn(&T) -> String + Clone + Send + Sync + 'static,
    R: Fn(T) -> V + Clone + Send + Sync + 'static,
    V: IntoView + 'static,
{
    let config = MasonryConfig {
        gap,
        min_column_width,
        ..MasonryConfig::default()
    };
    let threshold = config.load_more_threshold;
    let layout = RwSignal::new(MasonryLayout::new(config));
    let container = NodeRef::<html::Div>::new();
    let remeasure = Trigger::new();

    let on_resize = Closure::<dyn FnMut()>::new(move || {
        if let Some(el) = container.get_untracked() {
            layout.update(|l| {
                l.resize(f64::from(el.client_width()));
            });
        }
        remeasure.notify();
    });
    let observer = match web_sys::ResizeObserver::new(on_resize.as_ref().unchecked_ref()) {
        Ok(inner) => Some(Observer {
            inner,
            _callback: on_resize,
            nodes: HashMap::new(),
        }),
        Err(_) => None,
    };
    let observer = StoredValue::new_local(observer);

    let handles = Handles {
        layout,
        container,
        observer,
    };

    // The container is observed too, so width changes re-run a pass
    Effect::new(move |_| {
        if let Some(el) = container.get() {
            observer.with_value(|o| {
                if let Some(o) = o {
                    o.inner.observe(&el);
                }
            });
        }
    });

    {
        let item_key = item_key.clone();
        Effect::new(move |_| {
            remeasure.track();
            let ids: Vec<String> = items.with(|list| list.iter().map(|i| item_key(i)).collect());
            let generation = layout.try_update(|l| {
                if let Some(el) = container.get_untracked() {
                    l.resize(f64::from(el.client_width()));
                }
                l.set_items(ids);
                l.schedule()
            });
            if let Some(generation) = generation {
                set_timeout(move || measure(handles, generation, 0), SETTLE);
            }
        });
    }

    let scroll = window_event_listener(ev::scroll, move |_| {
        let Some(load_more) = on_load_more else {
            return;
        };
        let window = window();
        let scroll_top = window.scroll_y().unwrap_or(0.0);
        let viewport = window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let document_height = document()
            .document_element()
            .map(|el| f64::from(el.scroll_height()))
            .unwrap_or(0.0);
        if should_load_more(
            scroll_top,
            viewport,
            document_height,
            threshold,
            has_more.get_untracked(),
            loading.get_untracked(),
        ) {
            load_more.run(());
        }
    });
    on_cleanup(move || {
        scroll.remove();
        observer.try_with_value(|o| {
            if let Some(o) = o {
                o.inner.disconnect();
            }
        });
    });

    let cell_key = item_key.clone();
    view! {
        <div class="vrcface-waterfall-wrap">
            <div
                class="vrcface-waterfall"
                node_ref=container
                style:position="relative"
                style:height=move || format!("{}px", layout.with(|l| l.container_height()))
            >
                <For
                    each=move || items.get()
                    key=move |item: &T| item_key(item)
                    children=move |item: T| {
                        let id = cell_key(&item);
                        let placed = id.clone();
                        let settled = id.clone();
                        view! {
                            <div
                                class="vrcface-waterfall-item"
                                data-waterfall-id=id
                                style:position="absolute"
                                style:top="0"
                                style:left="0"
                                style:transition="opacity 0.2s"
                                style:opacity=move || {
                                    if layout.with(|l| l.is_settled(&settled)) { "1" } else { "0" }
                                }
                                style:width=move || {
                                    let width = layout.with(|l| l.column_width());
                                    if width > 0.0 { format!("{width}px") } else { "100%".to_string() }
                                }
                                style:transform=move || {
                                    layout.with(|l| {
                                        l.position(&placed)
                                            .map(|p| format!("translate({}px, {}px)", p.x, p.y))
                                            .unwrap_or_default()
                                    })
                                }
                            >
                                {render_item(item)}
                            </div>
                        }
                    }
                />
            </div>
            <Show when=move || loading.get()>
                <p class="vrcface-loading">"Loading..."</p>
            </Show>
        </div>
    }
}
