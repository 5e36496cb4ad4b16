#[cfg(target_arch = "wasm32")]
fn main() {
    use app_shell_frontend::app::{mount_root, ROOT_ID};
    use app_shell_frontend::registration::Config;
    use app_shell_frontend::web;

    _ = console_log::init_with_level(log::Level::Debug);
    console_error_panic_hook::set_once();

    mount_root(ROOT_ID).unwrap_or_else(|err| panic!("Failed to start app: {err}"));

    // Swap for `web::unregister()` to stop serving the app offline.
    web::register(Config::default());
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    log::warn!("The front-end only runs in the browser; build it for wasm32.");
}
