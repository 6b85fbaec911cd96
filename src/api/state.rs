use std::sync::Arc;

use crate::{
    db::{MovieCatalog, RatingStore, UserStore},
    services::{ChatSearchService, RankingEngine},
};

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: RankingEngine,
    pub search: ChatSearchService,
    pub users: Arc<dyn UserStore>,
    pub movies: Arc<dyn MovieCatalog>,
    pub ratings: Arc<dyn RatingStore>,
}

impl AppState {
    pub fn new(
        engine: RankingEngine,
        search: ChatSearchService,
        users: Arc<dyn UserStore>,
        movies: Arc<dyn MovieCatalog>,
        ratings: Arc<dyn RatingStore>,
    ) -> Self {
        Self {
            engine,
            search,
            users,
            movies,
            ratings,
        }
    }
}
