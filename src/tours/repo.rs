use serde_json::Value;
use sqlx::PgPool;
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    query::{self, Collection, Column, ColumnKind, ListQuery},
    tours::repo_types::{MonthlyPlan, Tour, TourFields, TourStats},
};

const TOUR_COLUMNS: &str = r#"
    id, name, slug, duration, max_group_size, difficulty, ratings_average,
    ratings_quantity, price, price_discount, summary, description, image_cover,
    images, start_dates, secret_tour, start_location, locations, guides,
    version, created_at
"#;

/// Public listing of tours. Secret tours never show up here.
pub const TOURS: Collection = Collection {
    table: "tours",
    columns: &[
        Column::new("id", "id", ColumnKind::Uuid),
        Column::new("name", "name", ColumnKind::Text),
        Column::new("slug", "slug", ColumnKind::Text),
        Column::new("duration", "duration", ColumnKind::Integer),
        Column::new("maxGroupSize", "max_group_size", ColumnKind::Integer),
        Column::new("difficulty", "difficulty", ColumnKind::Text),
        Column::new("ratingsAverage", "ratings_average", ColumnKind::Float),
        Column::new("ratingsQuantity", "ratings_quantity", ColumnKind::Integer),
        Column::new("price", "price", ColumnKind::Float),
        Column::new("priceDiscount", "price_discount", ColumnKind::Float),
        Column::new("summary", "summary", ColumnKind::Text),
        Column::new("description", "description", ColumnKind::Text),
        Column::new("imageCover", "image_cover", ColumnKind::Text),
        Column::new("images", "images", ColumnKind::Opaque),
        Column::new("startDates", "start_dates", ColumnKind::Opaque),
        Column::new("startLocation", "start_location", ColumnKind::Opaque),
        Column::new("locations", "locations", ColumnKind::Opaque),
        Column::new("guides", "guides", ColumnKind::Opaque),
        Column::new("durationWeeks", "ROUND(duration / 7.0, 2)", ColumnKind::Opaque),
        Column::new("createdAt", "created_at", ColumnKind::Timestamp),
        Column::new("version", "version", ColumnKind::Integer).internal(),
    ],
    base_conditions: &["secret_tour = FALSE"],
};

pub async fn list(db: &PgPool, q: &ListQuery) -> AppResult<Vec<Value>> {
    query::fetch_documents(db, &TOURS, q).await
}

pub async fn get_document(db: &PgPool, id: Uuid) -> AppResult<Option<Value>> {
    query::fetch_document(db, &TOURS, id).await
}

/// Any tour by id, secret ones included.
pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Tour>> {
    let tour = sqlx::query_as::<_, Tour>(&format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(tour)
}

pub async fn exists(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tours WHERE id = $1)")
        .bind(id)
        .fetch_one(db)
        .await?;
    Ok(found)
}

pub async fn insert(db: &PgPool, f: &TourFields) -> AppResult<Tour> {
    let tour = sqlx::query_as::<_, Tour>(&format!(
        r#"
        INSERT INTO tours (
            name, slug, duration, max_group_size, difficulty, ratings_average,
            ratings_quantity, price, price_discount, summary, description,
            image_cover, images, start_dates, secret_tour, start_location,
            locations, guides
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING {TOUR_COLUMNS}
        "#
    ))
    .bind(&f.name)
    .bind(&f.slug)
    .bind(f.duration)
    .bind(f.max_group_size)
    .bind(&f.difficulty)
    .bind(f.ratings_average)
    .bind(f.ratings_quantity)
    .bind(f.price)
    .bind(f.price_discount)
    .bind(&f.summary)
    .bind(&f.description)
    .bind(&f.image_cover)
    .bind(&f.images)
    .bind(&f.start_dates)
    .bind(f.secret_tour)
    .bind(&f.start_location)
    .bind(&f.locations)
    .bind(&f.guides)
    .fetch_one(db)
    .await?;
    Ok(tour)
}

pub async fn update(db: &PgPool, id: Uuid, f: &TourFields) -> AppResult<Option<Tour>> {
    let tour = sqlx::query_as::<_, Tour>(&format!(
        r#"
        UPDATE tours
           SET name = $2, slug = $3, duration = $4, max_group_size = $5,
               difficulty = $6, ratings_average = $7, ratings_quantity = $8,
               price = $9, price_discount = $10, summary = $11, description = $12,
               image_cover = $13, images = $14, start_dates = $15,
               secret_tour = $16, start_location = $17, locations = $18,
               guides = $19, version = version + 1
         WHERE id = $1
        RETURNING {TOUR_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&f.name)
    .bind(&f.slug)
    .bind(f.duration)
    .bind(f.max_group_size)
    .bind(&f.difficulty)
    .bind(f.ratings_average)
    .bind(f.ratings_quantity)
    .bind(f.price)
    .bind(f.price_discount)
    .bind(&f.summary)
    .bind(&f.description)
    .bind(&f.image_cover)
    .bind(&f.images)
    .bind(&f.start_dates)
    .bind(f.secret_tour)
    .bind(&f.start_location)
    .bind(&f.locations)
    .bind(&f.guides)
    .fetch_optional(db)
    .await?;
    Ok(tour)
}

/// Reviews go with the tour through ON DELETE CASCADE.
pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM tours WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Guide documents for an embedded `guides` list. Inactive users drop out.
pub async fn guides(db: &PgPool, ids: &[Uuid]) -> AppResult<Vec<Value>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let docs = sqlx::query_scalar::<_, Value>(
        r#"
        SELECT jsonb_build_object('id', id, 'name', name, 'email', email, 'photo', photo, 'role', role)
        FROM users
        WHERE id = ANY($1) AND active = TRUE
        ORDER BY name ASC, id ASC
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(docs)
}

pub async fn stats(db: &PgPool) -> AppResult<Vec<TourStats>> {
    let rows = sqlx::query_as::<_, TourStats>(
        r#"
        SELECT UPPER(difficulty) AS difficulty,
               COUNT(*)::BIGINT AS num_tours,
               COALESCE(SUM(ratings_quantity), 0)::BIGINT AS num_ratings,
               AVG(ratings_average)::FLOAT8 AS avg_rating,
               AVG(price)::FLOAT8 AS avg_price,
               MIN(price)::FLOAT8 AS min_price,
               MAX(price)::FLOAT8 AS max_price
          FROM tours
         WHERE ratings_average >= 4.5 AND secret_tour = FALSE
         GROUP BY UPPER(difficulty)
         ORDER BY avg_price ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Start dates within `year`, grouped by month, busiest first.
pub async fn monthly_plan(db: &PgPool, year: i32) -> AppResult<Vec<MonthlyPlan>> {
    let (from, to) = year_bounds(year)?;
    let rows = sqlx::query_as::<_, MonthlyPlan>(
        r#"
        SELECT EXTRACT(MONTH FROM s.start_date)::INT AS month,
               COUNT(*)::BIGINT AS num_tour_starts,
               ARRAY_AGG(t.name ORDER BY t.name) AS tours
          FROM tours t
         CROSS JOIN LATERAL UNNEST(t.start_dates) AS s(start_date)
         WHERE s.start_date >= $1 AND s.start_date < $2 AND t.secret_tour = FALSE
         GROUP BY month
         ORDER BY num_tour_starts DESC, month ASC
         LIMIT 12
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

fn year_bounds(year: i32) -> AppResult<(OffsetDateTime, OffsetDateTime)> {
    let start = |y: i32| {
        Date::from_calendar_date(y, Month::January, 1)
            .map(|d| d.midnight().assume_utc())
            .map_err(|_| AppError::Validation(format!("Invalid year: {year}")))
    };
    Ok((start(year)?, start(year + 1)?))
}
