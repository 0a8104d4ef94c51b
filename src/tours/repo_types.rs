use serde::{ser::SerializeSeq, Serialize, Serializer};
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Tour record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32, // days
    pub max_group_size: i32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    #[serde(serialize_with = "rfc3339_list")]
    pub start_dates: Vec<OffsetDateTime>,
    pub secret_tour: bool,
    pub start_location: Option<Value>,
    pub locations: Value,
    pub guides: Vec<Uuid>,
    #[serde(skip_serializing)]
    pub version: i32, // bumped on every update
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Validated, complete set of writable tour fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TourFields {
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub start_dates: Vec<OffsetDateTime>,
    pub secret_tour: bool,
    pub start_location: Option<Value>,
    pub locations: Value,
    pub guides: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    #[serde(rename = "_id")]
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

fn rfc3339_list<S: Serializer>(dates: &[OffsetDateTime], s: S) -> Result<S::Ok, S::Error> {
    let mut seq = s.serialize_seq(Some(dates.len()))?;
    for date in dates {
        seq.serialize_element(&RfcDate(*date))?;
    }
    seq.end()
}

struct RfcDate(OffsetDateTime);

impl Serialize for RfcDate {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(&self.0, s)
    }
}
