#[cfg(target_arch = "wasm32")]
fn main() {
    console_error_panic_hook::set_once();
    _ = console_log::init_with_level(log::Level::Debug);
    log::info!("Starting service worker");

    if let Err(err) = app_shell_worker::scope::start() {
        log::error!("Service worker failed to start: {err}");
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {}
