use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::AppResult,
    query::{self, Collection, Column, ColumnKind, ListQuery},
};

const REVIEW_COLUMNS: &str = "id, review, rating, tour_id, user_id, created_at";

pub const REVIEWS: Collection = Collection {
    table: "reviews",
    columns: &[
        Column::new("id", "id", ColumnKind::Uuid),
        Column::new("review", "review", ColumnKind::Text),
        Column::new("rating", "rating", ColumnKind::Integer),
        Column::new("tour", "tour_id", ColumnKind::Uuid),
        Column::new(
            "user",
            "(SELECT jsonb_build_object('id', u.id, 'name', u.name, 'photo', u.photo) \
             FROM users u WHERE u.id = reviews.user_id)",
            ColumnKind::Opaque,
        ),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
    ],
    base_conditions: &[],
};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub review: String,
    pub rating: i32,
    #[serde(rename = "tour")]
    pub tour_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn list(db: &PgPool, q: &ListQuery) -> AppResult<Vec<Value>> {
    query::fetch_documents(db, &REVIEWS, q).await
}

pub async fn get_document(db: &PgPool, id: Uuid) -> AppResult<Option<Value>> {
    query::fetch_document(db, &REVIEWS, id).await
}

pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Review>> {
    let review = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(review)
}

pub async fn insert(
    db: &PgPool,
    tour_id: Uuid,
    user_id: Uuid,
    review: &str,
    rating: i32,
) -> AppResult<Review> {
    let row = sqlx::query_as::<_, Review>(&format!(
        r#"
        INSERT INTO reviews (tour_id, user_id, review, rating)
        VALUES ($1, $2, $3, $4)
        RETURNING {REVIEW_COLUMNS}
        "#
    ))
    .bind(tour_id)
    .bind(user_id)
    .bind(review)
    .bind(rating)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update(db: &PgPool, id: Uuid, review: &str, rating: i32) -> AppResult<Option<Review>> {
    let row = sqlx::query_as::<_, Review>(&format!(
        r#"
        UPDATE reviews SET review = $2, rating = $3
         WHERE id = $1
        RETURNING {REVIEW_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(review)
    .bind(rating)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Rating used for a tour nobody has reviewed yet.
pub const DEFAULT_RATING: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub quantity: i32,
    pub average: f64,
}

/// Count and mean rounded to one decimal. No ratings means zero and
/// [`DEFAULT_RATING`].
pub fn rating_summary(ratings: &[i32]) -> RatingSummary {
    if ratings.is_empty() {
        return RatingSummary {
            quantity: 0,
            average: DEFAULT_RATING,
        };
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    RatingSummary {
        quantity: ratings.len() as i32,
        average: (mean * 10.0).round() / 10.0,
    }
}

/// Recomputes a tour's rating summary from its reviews. The tour row is
/// locked so concurrent recalculations for one tour apply in order.
pub async fn recalculate_tour_ratings(db: &PgPool, tour_id: Uuid) -> AppResult<RatingSummary> {
    let mut tx = db.begin().await?;
    sqlx::query("SELECT id FROM tours WHERE id = $1 FOR UPDATE")
        .bind(tour_id)
        .fetch_optional(&mut *tx)
        .await?;
    let ratings: Vec<i32> = sqlx::query_scalar("SELECT rating FROM reviews WHERE tour_id = $1")
        .bind(tour_id)
        .fetch_all(&mut *tx)
        .await?;
    let summary = rating_summary(&ratings);
    sqlx::query("UPDATE tours SET ratings_quantity = $2, ratings_average = $3 WHERE id = $1")
        .bind(tour_id)
        .bind(summary.quantity)
        .bind(summary.average)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    debug!(%tour_id, quantity = summary.quantity, average = summary.average, "tour ratings recalculated");
    Ok(summary)
}

fn whole_tour(tour_id: Uuid) -> ListQuery {
    ListQuery::default().pinned("tour", tour_id).unbounded()
}

/// All reviews of one tour, unpaginated, newest first.
pub async fn list_for_tour(db: &PgPool, tour_id: Uuid) -> AppResult<Vec<Value>> {
    query::fetch_documents(db, &REVIEWS, &whole_tour(tour_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tour_reviews_are_pinned_by_tour_id() {
        let tour = Uuid::new_v4();
        let sql = ListQuery::default()
            .pinned("tour", tour)
            .render(&REVIEWS)
            .unwrap()
            .sql()
            .to_string();
        assert!(sql.contains("WHERE tour_id = $1"), "{sql}");
        assert!(sql.contains("'user', (SELECT jsonb_build_object"), "{sql}");
    }

    #[test]
    fn embedded_tour_reviews_are_not_windowed() {
        let q = whole_tour(Uuid::new_v4());
        assert!(!q.paged);
        let sql = q.render(&REVIEWS).unwrap().sql().to_string();
        assert!(sql.contains("WHERE tour_id = $1"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
    }

    #[test]
    fn summary_of_no_ratings_falls_back_to_default() {
        assert_eq!(
            rating_summary(&[]),
            RatingSummary {
                quantity: 0,
                average: 4.5
            }
        );
    }

    #[test]
    fn summary_counts_and_rounds_to_one_decimal() {
        assert_eq!(
            rating_summary(&[4, 5, 5]),
            RatingSummary {
                quantity: 3,
                average: 4.7
            }
        );
        // 4.25 rounds half away from zero, like Postgres ROUND.
        assert_eq!(rating_summary(&[4, 4, 4, 5]).average, 4.3);
        assert_eq!(rating_summary(&[1]).average, 1.0);
        assert_eq!(rating_summary(&[2, 3]).quantity, 2);
    }

    #[test]
    fn review_serializes_references_by_name() {
        let review = Review {
            id: Uuid::nil(),
            review: "Loved it".into(),
            rating: 5,
            tour_id: Uuid::nil(),
            user_id: Uuid::nil(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&review).unwrap();
        assert!(json.get("tour").is_some());
        assert!(json.get("user").is_some());
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
    }
}
