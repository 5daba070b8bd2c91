pub mod aggregate;
pub mod configuration;
pub mod errors;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod planner;
pub mod shard;
pub mod startup;
pub mod vindex;
pub mod vschema;

use std::sync::Arc;

use crate::executor::Router;

#[derive(Clone)]
pub struct App {
    router: Arc<Router>,
}

impl App {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_arc(&self) -> Arc<Router> {
        self.router.clone()
    }
}
