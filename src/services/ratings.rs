use chrono::Utc;

use crate::{
    db::{RatingStore, UserStore},
    error::{AppError, AppResult},
    models::{AddRatingRequest, AddRatingsResponse, Rating, UpsertOutcome},
};

/// Applies a batch of ratings for one user, item by item.
///
/// Each item is validated and written on its own: an invalid item or a failed
/// write is counted in `cnt_failed` and the rest of the batch carries on. All
/// items share one `updated_at`. Items are applied in request order, so a
/// movie repeated within a batch ends with its last rating.
pub async fn upsert_ratings(
    users: &dyn UserStore,
    ratings: &dyn RatingStore,
    user_id: &str,
    requests: Vec<AddRatingRequest>,
) -> AppResult<AddRatingsResponse> {
    if users.get_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    }

    let updated_at = Utc::now();
    let mut response = AddRatingsResponse::default();

    for request in requests {
        if let Err(reason) = request.validate() {
            tracing::warn!(
                user_id = %user_id,
                tmdb_id = %request.tmdb_id,
                reason = %reason,
                "Rejected rating"
            );
            response.cnt_failed += 1;
            continue;
        }

        let rating = Rating {
            user_id: user_id.to_string(),
            tmdb_id: request.tmdb_id,
            rating: request.rating,
            updated_at,
        };

        match ratings.upsert_rating(&rating).await {
            Ok(UpsertOutcome::Inserted) => response.cnt_added += 1,
            Ok(UpsertOutcome::Updated) => response.cnt_updated += 1,
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    tmdb_id = %rating.tmdb_id,
                    error = %e,
                    "Rating write failed"
                );
                response.cnt_failed += 1;
            }
        }
    }

    if response.cnt_failed > 0 {
        tracing::warn!(
            user_id = %user_id,
            success_count = response.cnt_added + response.cnt_updated,
            error_count = response.cnt_failed,
            "Partial rating batch failure"
        );
    }

    tracing::info!(
        user_id = %user_id,
        added = response.cnt_added,
        updated = response.cnt_updated,
        failed = response.cnt_failed,
        "Ratings upserted"
    );

    Ok(response)
}
