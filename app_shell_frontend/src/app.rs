use leptos::*;
use wasm_bindgen::JsCast;

use crate::{Error, Result};

pub const ROOT_ID: &str = "root";

#[component]
pub fn App() -> impl IntoView {
    view! {
        <main class="app">
            <h1>"App shell"</h1>
            <p>"Edit app_shell_frontend/src/app.rs and rebuild."</p>
        </main>
    }
}

/// Renders [`App`] into the element with id `root_id`.
pub fn mount_root(root_id: &str) -> Result<()> {
    let root = document()
        .get_element_by_id(root_id)
        .and_then(|element| element.dyn_into::<web_sys::HtmlElement>().ok())
        .ok_or_else(|| Error::MissingMount(root_id.to_string()))?;
    mount_to(root, || view! { <App /> });
    Ok(())
}
