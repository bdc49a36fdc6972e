//! Shared application state.

use std::sync::Arc;

use ember_core::{Engine, PersonaStore, RequestResolver};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub personas: Arc<PersonaStore>,
    pub resolver: Arc<RequestResolver>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, personas: Arc<PersonaStore>) -> Self {
        let resolver = Arc::new(RequestResolver::new(engine.clone(), personas.clone()));
        Self {
            engine,
            personas,
            resolver,
        }
    }
}
