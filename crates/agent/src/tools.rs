//! Shopping tools exposed to the model.
//!
//! [`ShopTool`] is the single catalog of tool names, descriptions and argument schemas. It
//! drives both the tool specs sent to the model and the capability list rendered into the
//! system prompt. [`ToolSet`] executes a tool against the backend and renders the outcome as
//! plain text; no path out of it returns an error.

use std::fmt::Write as _;
use std::sync::Arc;

use reqwest::Method;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use shopassist_core::domain::cart::{Cart, CartItemId, CartItemRecord};
use shopassist_core::domain::product::{Product, ProductDetail, ProductDetailRecord, ProductId};
use tracing::{info, warn};

use crate::gateway::{Backend, GatewayError, GatewayErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShopTool {
    ListProducts,
    GetProductDetails,
    GetCart,
    AddToCart,
    UpdateCartItem,
    RemoveFromCart,
}

impl ShopTool {
    pub const ALL: [ShopTool; 6] = [
        Self::ListProducts,
        Self::GetProductDetails,
        Self::GetCart,
        Self::AddToCart,
        Self::UpdateCartItem,
        Self::RemoveFromCart,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListProducts => "list_products",
            Self::GetProductDetails => "get_product_details",
            Self::GetCart => "get_cart",
            Self::AddToCart => "add_to_cart",
            Self::UpdateCartItem => "update_cart_item",
            Self::RemoveFromCart => "remove_from_cart",
        }
    }

    /// One-line purpose used in the system prompt.
    pub fn summary(self) -> &'static str {
        match self {
            Self::ListProducts => "Get all available products",
            Self::GetProductDetails => "Get detailed info about a specific product",
            Self::GetCart => "View the customer's current cart",
            Self::AddToCart => "Add items to the cart",
            Self::UpdateCartItem => "Change quantities in the cart",
            Self::RemoveFromCart => "Remove items from the cart",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ListProducts => {
                "Get all available products from the catalog with their price, description and product ID."
            }
            Self::GetProductDetails => {
                "Get detailed information about a specific product, including customer reviews."
            }
            Self::GetCart => {
                "View the current shopping cart with quantities, line subtotals and the cart total."
            }
            Self::AddToCart => "Add a product to the shopping cart.",
            Self::UpdateCartItem => {
                "Update the quantity of an item already in the shopping cart. Use remove_from_cart to remove an item."
            }
            Self::RemoveFromCart => "Remove an item from the shopping cart.",
        }
    }

    pub fn parameters(self) -> Value {
        match self {
            Self::ListProducts | Self::GetCart => {
                json!({ "type": "object", "properties": {}, "required": [] })
            }
            Self::GetProductDetails => json!({
                "type": "object",
                "properties": {
                    "product_id": { "type": "integer", "description": "The ID of the product to retrieve" }
                },
                "required": ["product_id"]
            }),
            Self::AddToCart => json!({
                "type": "object",
                "properties": {
                    "product_id": { "type": "integer", "description": "The ID of the product to add" },
                    "quantity": { "type": "integer", "description": "The quantity to add", "default": 1, "minimum": 1 }
                },
                "required": ["product_id"]
            }),
            Self::UpdateCartItem => json!({
                "type": "object",
                "properties": {
                    "cart_item_id": { "type": "integer", "description": "The ID of the cart item to update" },
                    "quantity": { "type": "integer", "description": "The new quantity", "minimum": 1 }
                },
                "required": ["cart_item_id", "quantity"]
            }),
            Self::RemoveFromCart => json!({
                "type": "object",
                "properties": {
                    "cart_item_id": { "type": "integer", "description": "The ID of the cart item to remove" }
                },
                "required": ["cart_item_id"]
            }),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name.trim())
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ProductArgs {
    #[serde(deserialize_with = "lenient_i64")]
    product_id: i64,
}

#[derive(Debug, Deserialize)]
struct AddToCartArgs {
    #[serde(deserialize_with = "lenient_i64")]
    product_id: i64,
    #[serde(default = "default_quantity", deserialize_with = "lenient_i64")]
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateCartItemArgs {
    #[serde(deserialize_with = "lenient_i64")]
    cart_item_id: i64,
    #[serde(deserialize_with = "lenient_i64")]
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct CartItemArgs {
    #[serde(deserialize_with = "lenient_i64")]
    cart_item_id: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Models occasionally quote integers; accept `3`, `3.0` and `"3"` alike.
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|value| value.fract() == 0.0).map(|v| v as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("`{number}` is not an integer"))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("`{text}` is not an integer"))),
        other => Err(serde::de::Error::custom(format!("expected an integer, got `{other}`"))),
    }
}

#[derive(Clone)]
pub struct ToolSet {
    backend: Arc<dyn Backend>,
}

impl ToolSet {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn catalog(&self) -> &'static [ShopTool] {
        &ShopTool::ALL
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.catalog().iter().map(|tool| tool.spec()).collect()
    }

    /// Dispatches a model tool call by name. Unknown tools and malformed arguments come back
    /// as explanatory text so the model can correct itself.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> String {
        let Some(tool) = ShopTool::from_name(name) else {
            warn!(event_name = "tool.unknown", tool = name, "model requested an unknown tool");
            let available =
                ShopTool::ALL.iter().map(|tool| tool.name()).collect::<Vec<_>>().join(", ");
            return format!("Unknown tool `{name}`. Available tools: {available}.");
        };

        match tool {
            ShopTool::ListProducts => self.list_products().await,
            ShopTool::GetProductDetails => match parse_args::<ProductArgs>(tool, arguments) {
                Ok(args) => self.get_product_details(ProductId(args.product_id)).await,
                Err(message) => message,
            },
            ShopTool::GetCart => self.get_cart().await,
            ShopTool::AddToCart => match parse_args::<AddToCartArgs>(tool, arguments) {
                Ok(args) => self.add_to_cart(ProductId(args.product_id), args.quantity).await,
                Err(message) => message,
            },
            ShopTool::UpdateCartItem => match parse_args::<UpdateCartItemArgs>(tool, arguments) {
                Ok(args) => {
                    self.update_cart_item(CartItemId(args.cart_item_id), args.quantity).await
                }
                Err(message) => message,
            },
            ShopTool::RemoveFromCart => match parse_args::<CartItemArgs>(tool, arguments) {
                Ok(args) => self.remove_from_cart(CartItemId(args.cart_item_id)).await,
                Err(message) => message,
            },
        }
    }

    pub async fn list_products(&self) -> String {
        info!(event_name = "tool.invoked", tool = "list_products", "tool invoked");

        let value = match self.backend.request(Method::GET, "/api/products", None).await {
            Ok(value) => value,
            Err(error) => return failure_text("retrieve the products right now", &error),
        };

        let products = match decode::<Vec<Product>>(ShopTool::ListProducts, value) {
            Ok(products) => products,
            Err(error) => return failure_text("retrieve the products right now", &error),
        };

        if products.is_empty() {
            return "There are currently no products available in the catalog.".to_string();
        }

        let mut text = String::from("Here are the available products:\n\n");
        for product in &products {
            let _ = write!(
                text,
                "{} {} - {}{}\n   {}\n   Product ID: {}\n\n",
                product.icon(),
                product.display_name(),
                format_price(product.unit_price()),
                availability_suffix(product),
                product.description_or_default(),
                display_id(product.id),
            );
        }
        text
    }

    pub async fn get_product_details(&self, product_id: ProductId) -> String {
        info!(
            event_name = "tool.invoked",
            tool = "get_product_details",
            product_id = product_id.0,
            "tool invoked"
        );

        let path = format!("/api/products/{product_id}");
        let value = match self.backend.request(Method::GET, &path, None).await {
            Ok(value) => value,
            Err(error) if error.is_not_found() => return product_not_found(product_id),
            Err(error) => return failure_text("retrieve the product details", &error),
        };

        let detail: ProductDetail =
            match decode::<ProductDetailRecord>(ShopTool::GetProductDetails, value) {
                Ok(record) => record.into(),
                Err(error) => return failure_text("retrieve the product details", &error),
            };
        let product = &detail.product;

        let mut text = format!(
            "{} {}\n\nPrice: {}\n",
            product.icon(),
            product.display_name(),
            format_price(product.unit_price())
        );
        if let Some(in_stock) = product.in_stock {
            let _ = writeln!(
                text,
                "Availability: {}",
                if in_stock { "In stock" } else { "Currently out of stock" }
            );
        }
        let _ = write!(
            text,
            "Description: {}\nProduct ID: {}\n\n",
            product.description_or_default(),
            display_id(product.id.or(Some(product_id))),
        );

        if detail.reviews.is_empty() {
            text.push_str("No customer reviews yet.\n");
            return text;
        }

        let _ = write!(text, "Customer Reviews ({}):\n\n", detail.reviews.len());
        for review in &detail.reviews {
            let _ = write!(
                text,
                "{} ({}/5) - {}\n{}\n\n",
                "⭐".repeat(usize::from(review.stars())),
                review.rating,
                review.author_or_anonymous(),
                review.comment_or_default(),
            );
        }
        text
    }

    pub async fn get_cart(&self) -> String {
        info!(event_name = "tool.invoked", tool = "get_cart", "tool invoked");

        let value = match self.backend.request(Method::GET, "/api/cart", None).await {
            Ok(value) => value,
            Err(error) => return failure_text("retrieve your cart", &error),
        };

        let cart = match decode::<Vec<CartItemRecord>>(ShopTool::GetCart, value) {
            Ok(records) => Cart::from_records(records),
            Err(error) => return failure_text("retrieve your cart", &error),
        };

        if cart.is_empty() {
            return "Your shopping cart is empty.".to_string();
        }

        let mut text = String::from("Your Shopping Cart:\n\n");
        for line in &cart.lines {
            let _ = write!(
                text,
                "{} {} x {}\n   {} each = {}\n   Cart Item ID: {}\n\n",
                line.product.icon(),
                line.product.display_name(),
                line.quantity,
                format_price(line.unit_price()),
                format_price(line.subtotal()),
                display_id(line.item_id),
            );
        }
        let _ = write!(text, "Total: {}", format_price(cart.total()));
        text
    }

    pub async fn add_to_cart(&self, product_id: ProductId, quantity: i64) -> String {
        info!(
            event_name = "tool.invoked",
            tool = "add_to_cart",
            product_id = product_id.0,
            quantity,
            "tool invoked"
        );

        if quantity <= 0 {
            return "The quantity must be greater than 0.".to_string();
        }

        let body = json!({ "product_id": product_id.0, "quantity": quantity });
        match self.backend.request(Method::POST, "/api/cart", Some(body)).await {
            Ok(_) => {
                format!("Successfully added {quantity} item(s) to your cart! (Product ID: {product_id})")
            }
            Err(error) if error.is_not_found() => product_not_found(product_id),
            Err(error) => failure_text("add the item to your cart", &error),
        }
    }

    pub async fn update_cart_item(&self, cart_item_id: CartItemId, quantity: i64) -> String {
        info!(
            event_name = "tool.invoked",
            tool = "update_cart_item",
            cart_item_id = cart_item_id.0,
            quantity,
            "tool invoked"
        );

        if quantity <= 0 {
            return format!(
                "The quantity must be greater than 0. To remove an item, use the {} tool.",
                ShopTool::RemoveFromCart.name()
            );
        }

        let path = format!("/api/cart/{cart_item_id}");
        let body = json!({ "quantity": quantity });
        match self.backend.request(Method::PUT, &path, Some(body)).await {
            Ok(_) => format!("Successfully updated cart item {cart_item_id} to quantity {quantity}!"),
            Err(error) if error.is_not_found() => format!(
                "I couldn't find a cart item with ID {cart_item_id}. Please check your cart and try again."
            ),
            Err(error) => failure_text("update the cart item", &error),
        }
    }

    pub async fn remove_from_cart(&self, cart_item_id: CartItemId) -> String {
        info!(
            event_name = "tool.invoked",
            tool = "remove_from_cart",
            cart_item_id = cart_item_id.0,
            "tool invoked"
        );

        let path = format!("/api/cart/{cart_item_id}");
        match self.backend.request(Method::DELETE, &path, None).await {
            Ok(_) => format!("Successfully removed item {cart_item_id} from your cart!"),
            Err(error) if error.is_not_found() => format!(
                "I couldn't find a cart item with ID {cart_item_id}. It may have already been removed."
            ),
            Err(error) => failure_text("remove the item from your cart", &error),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: ShopTool, arguments: &Value) -> Result<T, String> {
    // Some models send `null` instead of `{}` for tools without required arguments.
    let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
    serde_json::from_value::<T>(arguments).map_err(|error| {
        warn!(
            event_name = "tool.arguments.invalid",
            tool = tool.name(),
            error = %error,
            "tool called with invalid arguments"
        );
        format!("Invalid arguments for {}: {error}. Expected schema: {}", tool.name(), tool.parameters())
    })
}

fn decode<T: DeserializeOwned>(tool: ShopTool, value: Value) -> Result<T, GatewayError> {
    serde_json::from_value::<T>(value).map_err(|error| {
        warn!(
            event_name = "tool.response.undecodable",
            tool = tool.name(),
            error = %error,
            "backend response did not match the expected shape"
        );
        GatewayError::unknown(format!("Unexpected response shape: {error}"))
    })
}

fn failure_text(action: &str, error: &GatewayError) -> String {
    match error.kind {
        GatewayErrorKind::Network => format!(
            "I'm sorry, I couldn't {action} because the store service is unreachable at the moment. Please try again shortly."
        ),
        GatewayErrorKind::Api => format!("I'm sorry, I couldn't {action}. Error: {}", error.message),
        GatewayErrorKind::Unknown => {
            format!("I'm sorry, something went wrong while trying to {action}. Please try again.")
        }
    }
}

fn product_not_found(product_id: ProductId) -> String {
    format!(
        "I couldn't find a product with ID {product_id}. Please check the product ID and try again."
    )
}

fn availability_suffix(product: &Product) -> &'static str {
    if product.is_available() {
        ""
    } else {
        " (currently out of stock)"
    }
}

fn display_id<T: std::fmt::Display>(id: Option<T>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub fn format_price(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::Method;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use shopassist_core::domain::cart::CartItemId;
    use shopassist_core::domain::product::ProductId;

    use super::{format_price, ShopTool, ToolSet};
    use crate::gateway::{Backend, GatewayError, GatewayResult};

    #[derive(Default)]
    struct ScriptedBackend {
        responses: HashMap<(Method, String), GatewayResult>,
        calls: Mutex<Vec<(Method, String, Option<Value>)>>,
    }

    impl ScriptedBackend {
        fn respond(mut self, method: Method, path: &str, result: GatewayResult) -> Self {
            self.responses.insert((method, path.to_string()), result);
            self
        }

        fn calls(&self) -> Vec<(Method, String, Option<Value>)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn request(&self, method: Method, path: &str, body: Option<Value>) -> GatewayResult {
            self.calls.lock().expect("calls lock").push((method.clone(), path.to_string(), body));
            self.responses
                .get(&(method, path.to_string()))
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::api(404, "no scripted response")))
        }
    }

    fn tool_set(backend: ScriptedBackend) -> (ToolSet, std::sync::Arc<ScriptedBackend>) {
        let backend = std::sync::Arc::new(backend);
        (ToolSet::new(backend.clone()), backend)
    }

    #[test]
    fn catalog_names_round_trip_and_are_unique() {
        for tool in ShopTool::ALL {
            assert_eq!(ShopTool::from_name(tool.name()), Some(tool));
            assert_eq!(tool.parameters()["type"], "object");
        }
        let mut names = ShopTool::ALL.iter().map(|tool| tool.name()).collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn prices_render_with_two_decimals() {
        assert_eq!(format_price(Decimal::new(5, 0)), "$5.00");
        assert_eq!(format_price(Decimal::new(1995, 3)), "$2.00");
        assert_eq!(format_price(Decimal::new(599, 2)), "$5.99");
    }

    #[tokio::test]
    async fn list_products_renders_each_product_in_server_order() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/products",
            Ok(json!([
                { "id": 2, "name": "Wireless Mouse", "price": 25, "emoji": "🖱️", "description": "Ergonomic" },
                { "id": 1, "name": "Laptop Stand", "price": 39.9, "description": "Aluminium", "in_stock": false }
            ])),
        ));

        let text = tools.list_products().await;

        let mouse = text.find("🖱️ Wireless Mouse - $25.00").expect("mouse line");
        let stand = text.find("📦 Laptop Stand - $39.90 (currently out of stock)").expect("stand");
        assert!(mouse < stand);
        assert!(text.contains("   Ergonomic\n   Product ID: 2"));
    }

    #[tokio::test]
    async fn list_products_handles_empty_catalog() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/products",
            Ok(json!([])),
        ));

        assert_eq!(
            tools.list_products().await,
            "There are currently no products available in the catalog."
        );
    }

    #[tokio::test]
    async fn product_details_not_found_differs_from_server_failure() {
        let (tools, _) = tool_set(
            ScriptedBackend::default()
                .respond(
                    Method::GET,
                    "/api/products/999",
                    Err(GatewayError::api(404, "Product not found")),
                )
                .respond(
                    Method::GET,
                    "/api/products/5",
                    Err(GatewayError::api(500, "database offline")),
                ),
        );

        let missing = tools.get_product_details(ProductId(999)).await;
        let broken = tools.get_product_details(ProductId(5)).await;

        assert!(missing.contains("couldn't find a product with ID 999"));
        assert!(!broken.contains("couldn't find"));
        assert!(broken.contains("database offline"));
    }

    #[tokio::test]
    async fn product_details_render_reviews_with_stars() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/products/3",
            Ok(json!({
                "id": 3, "name": "Coffee Mug", "price": 12, "emoji": "☕", "description": "Ceramic",
                "reviews": [
                    { "author": "Sam", "rating": 4, "comment": "Sturdy" },
                    { "author": "", "rating": 2 }
                ]
            })),
        ));

        let text = tools.get_product_details(ProductId(3)).await;

        assert!(text.starts_with("☕ Coffee Mug\n\nPrice: $12.00\n"));
        assert!(text.contains("Customer Reviews (2):"));
        assert!(text.contains("⭐⭐⭐⭐ (4/5) - Sam\nSturdy"));
        assert!(text.contains("⭐⭐ (2/5) - Anonymous\nNo comment"));
    }

    #[tokio::test]
    async fn product_details_without_reviews_says_so() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/products/4",
            Ok(json!({ "product": { "id": 4, "name": "Tote", "price": 8.5 }, "reviews": [] })),
        ));

        let text = tools.get_product_details(ProductId(4)).await;

        assert!(text.contains("Price: $8.50"));
        assert!(text.ends_with("No customer reviews yet.\n"));
    }

    #[tokio::test]
    async fn cart_total_matches_sum_of_lines_for_both_shapes() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/cart",
            Ok(json!([
                { "id": 10, "product_id": 1, "quantity": 2,
                  "product": { "id": 1, "name": "Headphones", "price": 59.99, "emoji": "🎧" } },
                { "id": 11, "product_id": 2, "quantity": 3, "name": "Notebook", "price": 4.25 }
            ])),
        ));

        let text = tools.get_cart().await;

        assert!(text.contains("🎧 Headphones x 2\n   $59.99 each = $119.98\n   Cart Item ID: 10"));
        assert!(text.contains("📦 Notebook x 3\n   $4.25 each = $12.75\n   Cart Item ID: 11"));
        assert!(text.ends_with("Total: $132.73"));
    }

    #[tokio::test]
    async fn empty_cart_is_reported() {
        let (tools, _) =
            tool_set(ScriptedBackend::default().respond(Method::GET, "/api/cart", Ok(json!([]))));

        assert_eq!(tools.get_cart().await, "Your shopping cart is empty.");
    }

    #[tokio::test]
    async fn network_failure_is_phrased_as_unreachable() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::GET,
            "/api/cart",
            Err(GatewayError::network("Could not connect to backend API at http://x/api/cart")),
        ));

        let text = tools.get_cart().await;

        assert!(text.contains("unreachable"));
        assert!(!text.contains("couldn't find"));
    }

    #[tokio::test]
    async fn add_to_cart_rejects_non_positive_quantity_without_calling_backend() {
        let (tools, backend) = tool_set(ScriptedBackend::default());

        let zero = tools.add_to_cart(ProductId(1), 0).await;
        let negative = tools.add_to_cart(ProductId(1), -3).await;

        assert_eq!(zero, "The quantity must be greater than 0.");
        assert_eq!(negative, "The quantity must be greater than 0.");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn add_to_cart_posts_body_and_confirms() {
        let (tools, backend) = tool_set(ScriptedBackend::default().respond(
            Method::POST,
            "/api/cart",
            Ok(json!({ "message": "Added to cart" })),
        ));

        let text = tools.add_to_cart(ProductId(7), 2).await;

        assert_eq!(text, "Successfully added 2 item(s) to your cart! (Product ID: 7)");
        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, Some(json!({ "product_id": 7, "quantity": 2 })));
    }

    #[tokio::test]
    async fn add_to_cart_reports_missing_product() {
        let (tools, _) = tool_set(ScriptedBackend::default().respond(
            Method::POST,
            "/api/cart",
            Err(GatewayError::api(404, "Product not found")),
        ));

        assert!(tools.add_to_cart(ProductId(42), 1).await.contains("couldn't find a product with ID 42"));
    }

    #[tokio::test]
    async fn update_cart_item_points_to_remove_tool_for_zero_quantity() {
        let (tools, backend) = tool_set(ScriptedBackend::default());

        let text = tools.update_cart_item(CartItemId(3), 0).await;

        assert!(text.contains("remove_from_cart"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn update_cart_item_handles_missing_item_and_success() {
        let (tools, _) = tool_set(
            ScriptedBackend::default()
                .respond(Method::PUT, "/api/cart/3", Ok(json!({ "message": "Cart updated" })))
                .respond(Method::PUT, "/api/cart/99", Err(GatewayError::api(404, "missing"))),
        );

        assert_eq!(
            tools.update_cart_item(CartItemId(3), 4).await,
            "Successfully updated cart item 3 to quantity 4!"
        );
        assert!(tools
            .update_cart_item(CartItemId(99), 4)
            .await
            .contains("couldn't find a cart item with ID 99"));
    }

    #[tokio::test]
    async fn remove_from_cart_treats_missing_item_as_already_removed() {
        let (tools, _) = tool_set(
            ScriptedBackend::default()
                .respond(Method::DELETE, "/api/cart/8", Ok(json!({ "message": "Item removed" })))
                .respond(Method::DELETE, "/api/cart/9", Err(GatewayError::api(404, "missing"))),
        );

        assert_eq!(tools.remove_from_cart(CartItemId(8)).await, "Successfully removed item 8 from your cart!");
        assert!(tools.remove_from_cart(CartItemId(9)).await.contains("already been removed"));
    }

    #[tokio::test]
    async fn invoke_parses_lenient_arguments_and_defaults_quantity() {
        let (tools, backend) = tool_set(ScriptedBackend::default().respond(
            Method::POST,
            "/api/cart",
            Ok(json!({ "message": "Added to cart" })),
        ));

        let text = tools.invoke("add_to_cart", &json!({ "product_id": "5" })).await;

        assert_eq!(text, "Successfully added 1 item(s) to your cart! (Product ID: 5)");
        assert_eq!(backend.calls()[0].2, Some(json!({ "product_id": 5, "quantity": 1 })));
    }

    #[tokio::test]
    async fn invoke_reports_unknown_tools_and_bad_arguments() {
        let (tools, backend) = tool_set(ScriptedBackend::default());

        let unknown = tools.invoke("checkout", &json!({})).await;
        let invalid = tools.invoke("remove_from_cart", &json!({ "cart_item_id": "abc" })).await;

        assert!(unknown.contains("Unknown tool `checkout`"));
        assert!(invalid.starts_with("Invalid arguments for remove_from_cart"));
        assert!(backend.calls().is_empty());
    }
}
