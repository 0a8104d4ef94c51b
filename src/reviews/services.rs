use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    reviews::repo::{self, Review},
    state::AppState,
    tours,
    users::repo_types::{Role, User},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewInput {
    pub review: Option<String>,
    pub rating: Option<i32>,
    /// Only read on `POST /reviews`; nested routes take the tour from the path.
    pub tour: Option<Uuid>,
}

fn checked_text(text: Option<String>) -> AppResult<String> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(AppError::Validation("Review can not be empty!".into())),
    }
}

fn checked_rating(rating: Option<i32>) -> AppResult<i32> {
    match rating {
        Some(r) if (1..=5).contains(&r) => Ok(r),
        Some(_) => Err(AppError::Validation("Rating must be between 1 and 5".into())),
        None => Err(AppError::Validation("A review must have a rating".into())),
    }
}

/// Authors may change their own reviews; admins may change any.
pub fn may_modify(user: &User, review: &Review) -> bool {
    user.role == Role::Admin || review.user_id == user.id
}

#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn create(
    state: &AppState,
    user: &User,
    tour_id: Option<Uuid>,
    input: ReviewInput,
) -> AppResult<Review> {
    let tour_id = tour_id
        .or(input.tour)
        .ok_or_else(|| AppError::Validation("Review must belong to a tour.".into()))?;
    let text = checked_text(input.review)?;
    let rating = checked_rating(input.rating)?;

    let no_tour = || AppError::NotFound("No tour found with that ID".into());
    if !tours::repo::exists(&state.db, tour_id).await? {
        return Err(no_tour());
    }

    let review = match repo::insert(&state.db, tour_id, user.id, &text, rating).await {
        Ok(r) => r,
        Err(AppError::NotFound(_)) => return Err(no_tour()),
        Err(AppError::Conflict(_)) => {
            return Err(AppError::Validation(
                "You have already reviewed this tour".into(),
            ))
        }
        Err(e) => return Err(e),
    };
    repo::recalculate_tour_ratings(&state.db, tour_id).await?;
    info!(review_id = %review.id, %tour_id, "review created");
    Ok(review)
}

async fn owned(state: &AppState, user: &User, id: Uuid) -> AppResult<Review> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;
    if !may_modify(user, &review) {
        return Err(AppError::Forbidden(
            "You can only change your own reviews".into(),
        ));
    }
    Ok(review)
}

#[instrument(skip(state, user, input), fields(user_id = %user.id))]
pub async fn update(
    state: &AppState,
    user: &User,
    id: Uuid,
    input: ReviewInput,
) -> AppResult<Review> {
    let current = owned(state, user, id).await?;
    let text = checked_text(input.review.or(Some(current.review)))?;
    let rating = checked_rating(input.rating.or(Some(current.rating)))?;

    let review = repo::update(&state.db, id, &text, rating)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;
    repo::recalculate_tour_ratings(&state.db, review.tour_id).await?;
    Ok(review)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete(state: &AppState, user: &User, id: Uuid) -> AppResult<()> {
    let review = owned(state, user, id).await?;
    repo::delete(&state.db, id).await?;
    repo::recalculate_tour_ratings(&state.db, review.tour_id).await?;
    info!(review_id = %id, tour_id = %review.tour_id, "review deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sqlx::PgPool;

    use super::*;
    use crate::auth::lockout::tests::sample_user;
    use crate::mail::LogMailer;
    use crate::tours::repo_types::TourFields;
    use crate::users::repo::{PgUserStore, UserStore};
    use crate::users::repo_types::NewUser;
    use time::OffsetDateTime;

    fn review_by(user_id: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            review: "Great guides".into(),
            rating: 4,
            tour_id: Uuid::new_v4(),
            user_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn only_author_or_admin_may_modify() {
        let author = sample_user();
        let review = review_by(author.id);
        assert!(may_modify(&author, &review));

        let mut stranger = sample_user();
        stranger.id = Uuid::new_v4();
        assert!(!may_modify(&stranger, &review));

        stranger.role = Role::Admin;
        assert!(may_modify(&stranger, &review));

        stranger.role = Role::LeadGuide;
        assert!(!may_modify(&stranger, &review));
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert_eq!(checked_rating(Some(1)).unwrap(), 1);
        assert_eq!(checked_rating(Some(5)).unwrap(), 5);
        assert!(checked_rating(Some(0)).is_err());
        assert!(checked_rating(Some(6)).is_err());
        assert!(checked_rating(None).is_err());
    }

    #[test]
    fn review_text_is_required() {
        assert_eq!(checked_text(Some("  Nice ".into())).unwrap(), "Nice");
        assert!(checked_text(Some("   ".into())).is_err());
        assert!(checked_text(None).is_err());
    }

    #[tokio::test]
    async fn create_without_tour_is_rejected_before_touching_the_db() {
        let state = AppState::fake();
        let err = create(&state, &sample_user(), None, ReviewInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("tour")));
    }

    async fn summary(db: &PgPool, tour_id: Uuid) -> (i32, f64) {
        let tour = tours::repo::find(db, tour_id).await.unwrap().unwrap();
        (tour.ratings_quantity, tour.ratings_average)
    }

    fn input(text: &str, rating: i32) -> ReviewInput {
        ReviewInput {
            review: Some(text.into()),
            rating: Some(rating),
            tour: None,
        }
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
    async fn every_review_write_moves_the_tour_summary() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        let (mut state, _) = AppState::fake_with(Arc::new(LogMailer));
        state.db = db.clone();

        let tag = Uuid::new_v4().simple().to_string();
        let users = PgUserStore::new(db.clone());
        let mut people = Vec::new();
        for who in ["amy", "ben"] {
            let user = users
                .insert(NewUser {
                    name: who.into(),
                    email: format!("{who}-{tag}@example.com"),
                    password_hash: "unused".into(),
                    role: Role::User,
                })
                .await
                .unwrap();
            people.push(user);
        }
        let tour = tours::repo::insert(
            &db,
            &TourFields {
                name: format!("Ratings {tag}"),
                slug: format!("ratings-{tag}"),
                duration: 3,
                max_group_size: 8,
                difficulty: "easy".into(),
                ratings_average: 4.5,
                ratings_quantity: 0,
                price: 300.0,
                price_discount: None,
                summary: "Short".into(),
                description: None,
                image_cover: "cover.jpg".into(),
                images: Vec::new(),
                start_dates: Vec::new(),
                secret_tour: false,
                start_location: None,
                locations: json!([]),
                guides: Vec::new(),
            },
        )
        .await
        .unwrap();

        let first = create(&state, &people[0], Some(tour.id), input("Good", 4))
            .await
            .unwrap();
        assert_eq!(summary(&db, tour.id).await, (1, 4.0));

        let second = create(&state, &people[1], Some(tour.id), input("Great", 5))
            .await
            .unwrap();
        assert_eq!(summary(&db, tour.id).await, (2, 4.5));

        update(&state, &people[0], first.id, input("Meh", 2))
            .await
            .unwrap();
        assert_eq!(summary(&db, tour.id).await, (2, 3.5));

        delete(&state, &people[1], second.id).await.unwrap();
        assert_eq!(summary(&db, tour.id).await, (1, 2.0));

        delete(&state, &people[0], first.id).await.unwrap();
        assert_eq!(summary(&db, tour.id).await, (0, 4.5));

        // Out of range pages are empty, not errors.
        let far = crate::query::ListQuery::default()
            .pinned("tour", tour.id)
            .paginate(Some("50"), Some("10"));
        assert!(repo::list(&db, &far).await.unwrap().is_empty());

        tours::repo::delete(&db, tour.id).await.unwrap();
        let err = create(&state, &people[0], Some(tour.id), input("Gone", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        for user in people {
            users.delete(user.id).await.unwrap();
        }
    }
}
