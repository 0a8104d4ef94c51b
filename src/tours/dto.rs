use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    query::parse_timestamp,
    tours::repo_types::{MonthlyPlan, Tour, TourFields, TourStats},
};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];
pub const DEFAULT_RATING: f64 = 4.5;

lazy_static! {
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Body of create and update requests. Every field is optional here; presence
/// is checked by [`TourInput::validate`] after an update has been merged onto
/// the stored tour.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TourInput {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<Value>,
    pub locations: Option<Value>,
    pub guides: Option<Vec<Uuid>>,
}

impl From<&Tour> for TourInput {
    fn from(t: &Tour) -> Self {
        let dates = t
            .start_dates
            .iter()
            .filter_map(|d| d.format(&time::format_description::well_known::Rfc3339).ok())
            .collect();
        Self {
            name: Some(t.name.clone()),
            duration: Some(t.duration),
            max_group_size: Some(t.max_group_size),
            difficulty: Some(t.difficulty.clone()),
            ratings_average: Some(t.ratings_average),
            ratings_quantity: Some(t.ratings_quantity),
            price: Some(t.price),
            price_discount: t.price_discount,
            summary: Some(t.summary.clone()),
            description: t.description.clone(),
            image_cover: Some(t.image_cover.clone()),
            images: Some(t.images.clone()),
            start_dates: Some(dates),
            secret_tour: Some(t.secret_tour),
            start_location: t.start_location.clone(),
            locations: Some(t.locations.clone()),
            guides: Some(t.guides.clone()),
        }
    }
}

impl TourInput {
    /// Fields present in `patch` win.
    pub fn merge(self, patch: TourInput) -> TourInput {
        TourInput {
            name: patch.name.or(self.name),
            duration: patch.duration.or(self.duration),
            max_group_size: patch.max_group_size.or(self.max_group_size),
            difficulty: patch.difficulty.or(self.difficulty),
            ratings_average: patch.ratings_average.or(self.ratings_average),
            ratings_quantity: patch.ratings_quantity.or(self.ratings_quantity),
            price: patch.price.or(self.price),
            price_discount: patch.price_discount.or(self.price_discount),
            summary: patch.summary.or(self.summary),
            description: patch.description.or(self.description),
            image_cover: patch.image_cover.or(self.image_cover),
            images: patch.images.or(self.images),
            start_dates: patch.start_dates.or(self.start_dates),
            secret_tour: patch.secret_tour.or(self.secret_tour),
            start_location: patch.start_location.or(self.start_location),
            locations: patch.locations.or(self.locations),
            guides: patch.guides.or(self.guides),
        }
    }

    pub fn validate(self) -> AppResult<TourFields> {
        let name = required(self.name.map(|n| n.trim().to_string()), "A tour must have a name")?;
        let len = name.chars().count();
        if len < 10 {
            return invalid("A tour name must have more or equal then 10 characters");
        }
        if len > 40 {
            return invalid("A tour name must have less or equal then 40 characters");
        }

        let duration = required(self.duration, "A tour must have a duration")?;
        if duration < 1 {
            return invalid("Duration must be at least one day");
        }
        let max_group_size = required(self.max_group_size, "A tour must have a group size")?;
        if max_group_size < 1 {
            return invalid("Group size must be at least one");
        }

        let difficulty = required(self.difficulty, "A tour must have a difficulty")?;
        if !DIFFICULTIES.contains(&difficulty.as_str()) {
            return invalid("Difficulty is either: easy, medium, difficult");
        }

        let ratings_average = self.ratings_average.unwrap_or(DEFAULT_RATING);
        if !(1.0..=5.0).contains(&ratings_average) {
            return invalid("Rating must be between 1.0 and 5.0");
        }
        let ratings_quantity = self.ratings_quantity.unwrap_or(0).max(0);

        let price = required(self.price, "A tour must have a price")?;
        if price <= 0.0 {
            return invalid("Price must be positive");
        }
        if let Some(discount) = self.price_discount {
            if discount >= price {
                return Err(AppError::Validation(format!(
                    "Discount price ({discount}) should be below regular price"
                )));
            }
        }

        let summary = required(
            self.summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            "A tour must have a summary",
        )?;
        let image_cover = required(
            self.image_cover.filter(|s| !s.trim().is_empty()),
            "A tour must have a cover image",
        )?;

        let start_dates = self
            .start_dates
            .unwrap_or_default()
            .iter()
            .map(|raw| {
                parse_timestamp(raw)
                    .ok_or_else(|| AppError::Validation(format!("Invalid start date: {raw}")))
            })
            .collect::<AppResult<Vec<OffsetDateTime>>>()?;

        Ok(TourFields {
            slug: slugify(&name),
            name,
            duration,
            max_group_size,
            difficulty,
            ratings_average,
            ratings_quantity,
            price,
            price_discount: self.price_discount,
            summary,
            description: self.description.map(|d| d.trim().to_string()),
            image_cover,
            images: self.images.unwrap_or_default(),
            start_dates,
            secret_tour: self.secret_tour.unwrap_or(false),
            start_location: self.start_location,
            locations: self.locations.unwrap_or_else(|| Value::Array(Vec::new())),
            guides: self.guides.unwrap_or_default(),
        })
    }
}

fn required<T>(value: Option<T>, message: &str) -> AppResult<T> {
    value.ok_or_else(|| AppError::Validation(message.to_string()))
}

fn invalid<T>(message: &str) -> AppResult<T> {
    Err(AppError::Validation(message.to_string()))
}

/// Lower-cased, dash separated form of a tour name.
pub fn slugify(name: &str) -> String {
    NON_SLUG
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[derive(Debug, Serialize)]
pub struct TourData {
    pub tour: Tour,
}

#[derive(Debug, Serialize)]
pub struct TourResponse {
    pub status: &'static str,
    pub data: TourData,
}

impl From<Tour> for TourResponse {
    fn from(tour: Tour) -> Self {
        Self {
            status: "success",
            data: TourData { tour },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    pub stats: Vec<TourStats>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub status: &'static str,
    pub data: StatsData,
}

#[derive(Debug, Serialize)]
pub struct PlanData {
    pub plan: Vec<MonthlyPlan>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: PlanData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forest_hiker() -> TourInput {
        serde_json::from_value(json!({
            "name": "The Forest Hiker",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg",
            "startDates": ["2021-04-25", "2021-07-20T09:00:00Z"]
        }))
        .expect("valid tour json")
    }

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea & Sun, again! "), "sea-sun-again");
    }

    #[test]
    fn complete_input_validates_with_defaults() {
        let fields = forest_hiker().validate().unwrap();
        assert_eq!(fields.slug, "the-forest-hiker");
        assert_eq!(fields.ratings_average, DEFAULT_RATING);
        assert_eq!(fields.ratings_quantity, 0);
        assert_eq!(fields.start_dates.len(), 2);
        assert!(!fields.secret_tour);
        assert_eq!(fields.locations, json!([]));
    }

    #[test]
    fn name_length_is_bounded() {
        let short = TourInput {
            name: Some("Short".into()),
            ..forest_hiker()
        };
        assert!(matches!(short.validate(), Err(AppError::Validation(m)) if m.contains("10")));

        let long = TourInput {
            name: Some("x".repeat(41)),
            ..forest_hiker()
        };
        assert!(matches!(long.validate(), Err(AppError::Validation(m)) if m.contains("40")));
    }

    #[test]
    fn discount_must_stay_below_price() {
        let tour = TourInput {
            price_discount: Some(397.0),
            ..forest_hiker()
        };
        assert!(matches!(tour.validate(), Err(AppError::Validation(m)) if m.contains("397")));

        let tour = TourInput {
            price_discount: Some(100.0),
            ..forest_hiker()
        };
        assert_eq!(tour.validate().unwrap().price_discount, Some(100.0));
    }

    #[test]
    fn difficulty_and_required_fields() {
        let tour = TourInput {
            difficulty: Some("extreme".into()),
            ..forest_hiker()
        };
        assert!(tour.validate().is_err());

        let tour = TourInput {
            summary: Some("   ".into()),
            ..forest_hiker()
        };
        assert!(matches!(tour.validate(), Err(AppError::Validation(m)) if m.contains("summary")));

        assert!(TourInput::default().validate().is_err());
    }

    #[test]
    fn bad_start_date_is_rejected() {
        let tour = TourInput {
            start_dates: Some(vec!["someday".into()]),
            ..forest_hiker()
        };
        assert!(matches!(tour.validate(), Err(AppError::Validation(m)) if m.contains("someday")));
    }

    #[test]
    fn patch_overrides_only_given_fields() {
        let base = forest_hiker();
        let merged = base.merge(TourInput {
            price: Some(497.0),
            name: Some("The Forest Hiker Deluxe".into()),
            ..TourInput::default()
        });
        let fields = merged.validate().unwrap();
        assert_eq!(fields.price, 497.0);
        assert_eq!(fields.duration, 5);
        assert_eq!(fields.slug, "the-forest-hiker-deluxe");
    }
}
