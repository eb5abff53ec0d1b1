use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{Product, ProductId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(pub i64);

impl fmt::Display for CartItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire shapes accepted for a cart item. The backend may nest the product under `product` or
/// inline its fields next to the item id and quantity.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum CartItemRecord {
    Nested {
        #[serde(default)]
        id: Option<CartItemId>,
        #[serde(default)]
        quantity: Option<i64>,
        product: Product,
    },
    Flat {
        #[serde(default)]
        id: Option<CartItemId>,
        #[serde(default)]
        quantity: Option<i64>,
        #[serde(default)]
        product_id: Option<ProductId>,
        #[serde(flatten)]
        product: Product,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CartLine {
    pub item_id: Option<CartItemId>,
    pub product: Product,
    pub quantity: i64,
}

impl CartLine {
    pub fn unit_price(&self) -> Decimal {
        self.product.unit_price()
    }

    pub fn subtotal(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity)
    }
}

impl From<CartItemRecord> for CartLine {
    fn from(record: CartItemRecord) -> Self {
        match record {
            CartItemRecord::Nested { id, quantity, product } => {
                Self { item_id: id, product, quantity: quantity.unwrap_or(0) }
            }
            CartItemRecord::Flat { id, quantity, product_id, mut product } => {
                if product.id.is_none() {
                    product.id = product_id;
                }
                Self { item_id: id, product, quantity: quantity.unwrap_or(0) }
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn from_records(records: Vec<CartItemRecord>) -> Self {
        Self { lines: records.into_iter().map(CartLine::from).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }
}
