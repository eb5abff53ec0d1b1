use std::fmt::Write as _;

use crate::tools::ShopTool;

pub const PROMPT_VERSION: &str = "shopping-assistant.v1";
pub const ASSISTANT_NAME: &str = "ShoppingAssistant";

const ROLE: &str = "You are a helpful shopping assistant for an e-commerce store. \
Your role is to help customers:

1. Browse and discover products in our catalog
2. Get detailed information about products including reviews
3. Manage their shopping cart (add, update, remove items)
4. Receive personalized product recommendations";

const GUIDELINES: &[&str] = &[
    "Be friendly, concise, and helpful",
    "When showing products, include the emoji, name, and price",
    "When recommending products, explain why they might be a good fit",
    "If a customer asks about a product not in the catalog, politely let them know it's not available",
    "Always confirm actions like adding to cart or removing items",
    "If you encounter an error, apologize and suggest an alternative action",
];

/// Renders the system prompt. The capability list comes from the same catalog that produces
/// the tool specs, so the two cannot drift apart.
pub fn render_system_prompt(tools: &[ShopTool]) -> String {
    let mut prompt = String::from(ROLE);

    prompt.push_str("\n\nGuidelines:\n");
    for guideline in GUIDELINES {
        let _ = writeln!(prompt, "- {guideline}");
    }

    prompt.push_str("\nYou have access to tools that let you:\n");
    for tool in tools {
        let _ = writeln!(prompt, "- {}: {}", tool.name(), tool.summary());
    }

    prompt.push_str("\nUse these tools to help customers accomplish their shopping goals.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::render_system_prompt;
    use crate::tools::ShopTool;

    #[test]
    fn prompt_lists_every_catalog_tool() {
        let prompt = render_system_prompt(&ShopTool::ALL);

        for tool in ShopTool::ALL {
            assert!(prompt.contains(&format!("- {}: ", tool.name())), "missing {}", tool.name());
        }
        assert!(prompt.starts_with("You are a helpful shopping assistant"));
        assert!(prompt.contains("Guidelines:\n- Be friendly"));
    }

    #[test]
    fn prompt_only_lists_given_tools() {
        let prompt = render_system_prompt(&[ShopTool::GetCart]);

        assert!(prompt.contains("- get_cart: View the customer's current cart"));
        assert!(!prompt.contains("add_to_cart"));
    }
}
