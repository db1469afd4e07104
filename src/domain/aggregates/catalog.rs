//! Catalog: categories, products and their rating aggregate

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::Review;

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub slug: String,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub slug: String,
    pub image: Option<String>,
    pub featured: bool,
    pub category_id: Option<i64>,
}

/// Compact product representation used in listings and nested payloads.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub price: Decimal,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self { id: p.id, name: p.name.clone(), slug: p.slug.clone(), image: p.image.clone(), price: p.price }
    }
}

impl Product {
    pub fn summary(&self) -> ProductSummary { ProductSummary::from(self) }

    /// Case-insensitive match against name, description or the category name.
    pub fn matches_search(&self, term: &str, category_name: Option<&str>) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
            || category_name.is_some_and(|c| c.to_lowercase().contains(&term))
    }
}

/// Average rating and review count of one product.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProductRating {
    pub id: i64,
    #[serde(skip)]
    pub product_id: i64,
    pub average_rating: f64,
    pub total_reviews: i32,
}

impl ProductRating {
    /// Recomputes `(average_rating, total_reviews)` from a product's reviews.
    pub fn aggregate(ratings: impl IntoIterator<Item = u8>) -> (f64, i32) {
        let (sum, count) = ratings.into_iter().fold((0u64, 0i32), |(s, c), r| (s + u64::from(r), c + 1));
        if count == 0 { return (0.0, 0); }
        (sum as f64 / f64::from(count), count)
    }
}

/// Number of reviews per star level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RatingBreakdown {
    pub poor_review: u32,
    pub fair_review: u32,
    pub good_review: u32,
    pub very_good_review: u32,
    pub excellent_review: u32,
}

impl RatingBreakdown {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        reviews.iter().fold(Self::default(), |mut acc, r| {
            match r.rating.value() {
                1 => acc.poor_review += 1,
                2 => acc.fair_review += 1,
                3 => acc.good_review += 1,
                4 => acc.very_good_review += 1,
                _ => acc.excellent_review += 1,
            }
            acc
        })
    }
}
