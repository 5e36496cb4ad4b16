use std::rc::Rc;

use app_shell_model::{looks_like_file, RESERVED_PATH_PREFIX};
use log::debug;
use url::Origin;

use crate::fetch::{Request, RequestMode};
use crate::strategies::{Handled, Handler};
use crate::Result;

type Matcher = Box<dyn Fn(&Request) -> bool>;

struct Route {
    name: &'static str,
    matcher: Matcher,
    handler: Rc<dyn Handler>,
}

/// Ordered routes for `GET` requests; the first match handles the request.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn register(
        &mut self,
        name: &'static str,
        matcher: impl Fn(&Request) -> bool + 'static,
        handler: Rc<dyn Handler>,
    ) {
        self.routes.push(Route {
            name,
            matcher: Box::new(matcher),
            handler,
        });
    }

    pub fn route_names(&self) -> Vec<&'static str> {
        self.routes.iter().map(|route| route.name).collect()
    }

    /// The handler that will answer `request`, if any. Requests without one
    /// go to the network untouched.
    pub fn find(&self, request: &Request) -> Option<Rc<dyn Handler>> {
        if request.method != "GET" {
            return None;
        }
        let route = self.routes.iter().find(|route| (route.matcher)(request))?;
        debug!("{} matched route {}", request.url, route.name);
        Some(route.handler.clone())
    }

    pub async fn handle(&self, request: &Request) -> Option<Result<Handled>> {
        let handler = self.find(request)?;
        Some(handler.handle(request).await)
    }
}

/// Navigations to client-side routes, which the app shell page answers.
pub fn is_app_shell_navigation(request: &Request) -> bool {
    let path = request.url.path();
    request.mode == RequestMode::Navigate
        && !path.starts_with(RESERVED_PATH_PREFIX)
        && !looks_like_file(path)
}

pub fn is_same_origin_image(request: &Request, origin: &Origin) -> bool {
    request.url.origin() == *origin && request.url.path().ends_with(".png")
}
