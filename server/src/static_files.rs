use std::path::PathBuf;
use std::sync::Arc;

use app_shell_model::{looks_like_file, APP_SHELL_PAGE, RESERVED_PATH_PREFIX, SERVICE_WORKER_SCRIPT};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::app_config::StaticConfig;

const SERVICE_WORKER_ALLOWED: HeaderName = HeaderName::from_static("service-worker-allowed");

struct Dist {
    dir: PathBuf,
    worker_scope: String,
}

/// Serves the built front-end: the worker script, static files and the app
/// shell for client-side routes.
pub fn router(config: &StaticConfig) -> Router {
    let dist = Arc::new(Dist {
        dir: PathBuf::from(&config.dist_dir),
        worker_scope: config.worker_scope(),
    });
    let app = Router::new()
        .route(&format!("/{SERVICE_WORKER_SCRIPT}"), get(service_worker_script))
        .fallback(serve_dist)
        .with_state(dist);
    let app = if config.public_url.is_empty() {
        app
    } else {
        Router::new().nest(&config.public_url, app)
    };
    app.layer(TraceLayer::new_for_http())
}

fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn service_worker_script(State(dist): State<Arc<Dist>>) -> Response {
    let script = match tokio::fs::read(dist.dir.join(SERVICE_WORKER_SCRIPT)).await {
        Ok(script) => script,
        Err(err) => {
            warn!("no {SERVICE_WORKER_SCRIPT} in {}: {err}", dist.dir.display());
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let mut response = no_cache(script.into_response());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    if let Ok(scope) = HeaderValue::from_str(&dist.worker_scope) {
        headers.insert(SERVICE_WORKER_ALLOWED, scope);
    }
    response
}

async fn app_shell(dist: &Dist) -> Response {
    match tokio::fs::read_to_string(dist.dir.join(APP_SHELL_PAGE)).await {
        Ok(page) => no_cache(axum::response::Html(page).into_response()),
        Err(err) => {
            warn!("no {APP_SHELL_PAGE} in {}: {err}", dist.dir.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn serve_dist(State(dist): State<Arc<Dist>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let served = match ServeDir::new(&dist.dir).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if served.status() != StatusCode::NOT_FOUND {
        return served.into_response();
    }
    if looks_like_file(&path) || path.starts_with(RESERVED_PATH_PREFIX) {
        return StatusCode::NOT_FOUND.into_response();
    }
    debug!("{path} is a client-side route, serving the app shell");
    app_shell(&dist).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tempfile::TempDir;

    const SHELL: &str = "<!doctype html><div id=\"root\"></div>";

    fn dist() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(APP_SHELL_PAGE), SHELL).unwrap();
        std::fs::write(dir.path().join(SERVICE_WORKER_SCRIPT), "self.skipWaiting").unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/main.css"), "body {}").unwrap();
        dir
    }

    fn config(dir: &TempDir, public_url: &str) -> StaticConfig {
        StaticConfig {
            dist_dir: dir.path().to_str().unwrap().to_string(),
            public_url: public_url.to_string(),
        }
    }

    async fn get_path(app: Router, path: &str) -> Response {
        app.oneshot(axum::http::Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn worker_script_headers() {
        let dir = dist();
        let response = get_path(router(&config(&dir, "")), "/service-worker.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[SERVICE_WORKER_ALLOWED], "/");
        assert_eq!(body_text(response).await, "self.skipWaiting");
    }

    #[tokio::test]
    async fn missing_worker_script_is_not_the_shell() {
        let dir = dist();
        std::fs::remove_file(dir.path().join(SERVICE_WORKER_SCRIPT)).unwrap();
        let response = get_path(router(&config(&dir, "")), "/service-worker.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = dist();
        let response = get_path(router(&config(&dir, "")), "/static/main.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "body {}");
    }

    #[tokio::test]
    async fn client_routes_get_the_shell() {
        let dir = dist();
        let response = get_path(router(&config(&dir, "")), "/users/7").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, SHELL);
    }

    #[tokio::test]
    async fn missing_files_and_reserved_paths_are_404() {
        let dir = dist();
        let app = router(&config(&dir, ""));
        let missing = get_path(app.clone(), "/static/missing.js").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let reserved = get_path(app, "/_internal/status").await;
        assert_eq!(reserved.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn served_under_public_url() {
        let dir = dist();
        let app = router(&config(&dir, "/app"));
        let script = get_path(app.clone(), "/app/service-worker.js").await;
        assert_eq!(script.status(), StatusCode::OK);
        assert_eq!(script.headers()[SERVICE_WORKER_ALLOWED], "/app/");
        let asset = get_path(app, "/app/static/main.css").await;
        assert_eq!(body_text(asset).await, "body {}");
    }
}
