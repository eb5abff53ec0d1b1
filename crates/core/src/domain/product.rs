use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRODUCT_ICON: &str = "📦";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog entry as served by the product backend. Every field is optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: Option<ProductId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub in_stock: Option<bool>,
}

impl Product {
    pub fn icon(&self) -> &str {
        self.emoji.as_deref().filter(|emoji| !emoji.is_empty()).unwrap_or(DEFAULT_PRODUCT_ICON)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn unit_price(&self) -> Decimal {
        self.price.unwrap_or(Decimal::ZERO)
    }

    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or("No description available")
    }

    /// Products without an explicit flag are treated as available.
    pub fn is_available(&self) -> bool {
        self.in_stock.unwrap_or(true)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Review {
    pub const MAX_RATING: i64 = 5;

    pub fn stars(&self) -> u8 {
        self.rating.clamp(0, Self::MAX_RATING) as u8
    }

    pub fn author_or_anonymous(&self) -> &str {
        self.author.as_deref().filter(|author| !author.is_empty()).unwrap_or("Anonymous")
    }

    pub fn comment_or_default(&self) -> &str {
        self.comment.as_deref().unwrap_or("No comment")
    }
}

/// Wire shapes accepted for a product detail lookup: product fields either nested under a
/// `product` key or inlined next to `reviews`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ProductDetailRecord {
    Nested {
        product: Product,
        #[serde(default)]
        reviews: Option<Vec<Review>>,
    },
    Flat {
        #[serde(flatten)]
        product: Product,
        #[serde(default)]
        reviews: Option<Vec<Review>>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductDetail {
    pub product: Product,
    pub reviews: Vec<Review>,
}

impl From<ProductDetailRecord> for ProductDetail {
    fn from(record: ProductDetailRecord) -> Self {
        match record {
            ProductDetailRecord::Nested { product, reviews }
            | ProductDetailRecord::Flat { product, reviews } => {
                Self { product, reviews: reviews.unwrap_or_default() }
            }
        }
    }
}
