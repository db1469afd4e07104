//! Value Objects for the shop

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL slug derived from a display name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub const MAX_LEN: usize = 50;
    const FALLBACK: &'static str = "item";
    // "-" plus the digits of u32::MAX, plus one trimmed hyphen
    const SUFFIX_RESERVE: usize = 12;

    /// Lowercases, drops anything that is not alphanumeric, whitespace or a
    /// hyphen, then collapses runs of whitespace/hyphens into single hyphens.
    /// Capped at `MAX_LEN`; names with nothing sluggable become `item`.
    pub fn from_name(name: &str) -> Self {
        let mut out = String::with_capacity(name.len());
        let mut pending_dash = false;
        for c in name.trim().chars().flat_map(char::to_lowercase) {
            if c.is_alphanumeric() || c == '_' {
                if pending_dash && !out.is_empty() { out.push('-'); }
                pending_dash = false;
                out.push(c);
            } else if c.is_whitespace() || c == '-' {
                pending_dash = true;
            }
        }
        let out = truncate_chars(&out, Self::MAX_LEN);
        if out.is_empty() { Self(Self::FALLBACK.to_string()) } else { Self(out) }
    }

    /// `base`, then `base-1`, `base-2`, ... until `taken` says no. The base is
    /// shortened as needed so every candidate stays within `MAX_LEN`.
    pub fn unique(base: &Slug, mut taken: impl FnMut(&str) -> bool) -> Self {
        if !taken(&base.0) { return base.clone(); }
        let mut counter = 1u32;
        loop {
            let suffix = format!("-{counter}");
            let head = truncate_chars(&base.0, Self::MAX_LEN - suffix.len());
            let candidate = format!("{head}{suffix}");
            if !taken(&candidate) { return Self(candidate); }
            counter += 1;
        }
    }

    /// Prefix shared by `self` and every candidate `unique` can derive from it.
    pub fn stem(&self) -> String {
        self.0.chars().take(Self::MAX_LEN - Self::SUFFIX_RESERVE).collect()
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(SlugError::TooLong); }
        if !value.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') { return Err(SlugError::InvalidChar); }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

fn truncate_chars(value: &str, max: usize) -> String {
    let cut: String = value.chars().take(max).collect();
    cut.trim_end_matches('-').to_string()
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SlugError { Empty, TooLong, InvalidChar }
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Slug may not be blank."),
            Self::TooLong => write!(f, "Slug may not exceed {} characters.", Slug::MAX_LEN),
            Self::InvalidChar => write!(f, "Slug may only contain letters, numbers, underscores or hyphens."),
        }
    }
}

/// Star rating of a review, 1 (poor) to 5 (excellent)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, RatingError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(RatingError(value))
        }
    }
    pub fn value(self) -> u8 { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct RatingError(pub i64);
impl std::error::Error for RatingError {}
impl fmt::Display for RatingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a valid choice. Rating must be between 1 and 5.", self.0)
    }
}

/// Client-generated identifier of an anonymous cart
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartCode(String);

impl CartCode {
    pub const MAX_LEN: usize = 11;

    pub fn parse(value: impl Into<String>) -> Result<Self, CartCodeError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(CartCodeError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(CartCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartCodeError { Empty, TooLong }
impl std::error::Error for CartCodeError {}
impl fmt::Display for CartCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "cart_code may not be blank."),
            Self::TooLong => write!(f, "cart_code may not exceed {} characters.", CartCode::MAX_LEN),
        }
    }
}

/// Monetary amounts are stored as NUMERIC(10, 2)
pub mod money {
    use rust_decimal::Decimal;

    pub const MAX_DIGITS: u32 = 10;
    pub const DECIMAL_PLACES: u32 = 2;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum PriceError { Negative, TooManyDecimals, TooLarge }

    impl std::error::Error for PriceError {}
    impl std::fmt::Display for PriceError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Negative => write!(f, "Ensure this value is greater than or equal to 0."),
                Self::TooManyDecimals => write!(f, "Ensure that there are no more than {DECIMAL_PLACES} decimal places."),
                Self::TooLarge => write!(f, "Ensure that there are no more than {MAX_DIGITS} digits in total."),
            }
        }
    }

    /// Validates a price and normalizes it to two decimal places.
    pub fn normalize_price(value: Decimal) -> Result<Decimal, PriceError> {
        if value.is_sign_negative() && !value.is_zero() { return Err(PriceError::Negative); }
        let value = value.normalize();
        if value.scale() > DECIMAL_PLACES { return Err(PriceError::TooManyDecimals); }
        let mut value = value;
        value.rescale(DECIMAL_PLACES);
        let limit = Decimal::from(10i64.pow(MAX_DIGITS - DECIMAL_PLACES));
        if value >= limit { return Err(PriceError::TooLarge); }
        Ok(value)
    }

    /// Amount in the smallest currency unit (cents), as payment providers expect it.
    pub fn to_minor_units(value: Decimal) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        (value * Decimal::ONE_HUNDRED).round().to_i64().unwrap_or(i64::MAX)
    }

    pub fn from_minor_units(cents: i64) -> Decimal {
        Decimal::new(cents, DECIMAL_PLACES)
    }
}

/// Line total for `quantity` units at `unit_price`.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}
