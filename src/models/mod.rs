use serde::{Deserialize, Deserializer, Serialize};

pub mod chat;
pub mod movie;
pub mod rating;
pub mod user;

pub use chat::{ChatMessage, ChatRole, SearchRequest, SearchResponse};
pub use movie::Movie;
pub use rating::{
    AddRatingRequest, AddRatingsResponse, DisplayRating, Rating, UpsertOutcome,
};
pub use user::{AddUserRequest, UpdateUserRequest, User, UserProfile};

/// A movie paired with its request-scoped ranking score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub movie: Movie,
    pub score: f64,
}

/// Treats an explicit JSON `null` list the same as a missing one
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
