//! A small shop domain used by the binaries and integration tests.
//!
//! Three agents: the `root` host, a `shop` specialist that searches the
//! catalog and places orders, and an `orders` specialist that tracks and
//! cancels them. Searching and status checks are safe; purchases and
//! cancellations need human approval.

use crate::agent::definition::{AgentDefinition, AgentRegistry};
use crate::error::OrchestratorError;
use crate::tools::{FnTool, ToolSet};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const ROOT_PROMPT: &str = "You are the host assistant of an online electronics shop. \
     Greet the user and route requests to the right specialist using the transfer tools. \
     Current time: {time}.";

pub const SHOP_PROMPT: &str = "You are the {agent} assistant. Help the user find products \
     and place orders. Always confirm the product id before ordering. When the task is done \
     or out of scope, call complete_or_escalate. Current time: {time}.";

pub const ORDERS_PROMPT: &str = "You are the {agent} assistant. Look up order status and \
     cancel orders on request. When the task is done or out of scope, call \
     complete_or_escalate. Current time: {time}.";

pub fn demo_registry() -> Result<AgentRegistry, OrchestratorError> {
    AgentRegistry::new(vec![
        AgentDefinition::new("root", ROOT_PROMPT),
        AgentDefinition::new("shop", SHOP_PROMPT)
            .with_description("Searches the catalog and places new orders.")
            .with_safe_tools(["search_products"])
            .with_sensitive_tools(["order_purchase"]),
        AgentDefinition::new("orders", ORDERS_PROMPT)
            .with_description("Checks the status of existing orders and cancels them.")
            .with_safe_tools(["check_order_status"])
            .with_sensitive_tools(["cancel_order"]),
    ])
}

// ── In-memory store ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub price_usd: f64,
}

const CATALOG: &[Product] = &[
    Product { id: "P-100", name: "Pixel 9 phone", price_usd: 799.0 },
    Product { id: "P-101", name: "Galaxy S24 phone", price_usd: 849.0 },
    Product { id: "P-200", name: "Noise-cancelling headphones", price_usd: 299.0 },
    Product { id: "P-300", name: "USB-C charger 65W", price_usd: 39.0 },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Placed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub product_id: String,
    pub quantity: u32,
    pub status: OrderStatus,
}

/// Orders placed through the demo tools.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<String, Order>,
    next: u32,
}

impl OrderBook {
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    fn place(&mut self, product_id: &str, quantity: u32) -> String {
        self.next += 1;
        let id = format!("A-{}", self.next);
        self.orders.insert(
            id.clone(),
            Order {
                product_id: product_id.to_string(),
                quantity,
                status: OrderStatus::Placed,
            },
        );
        id
    }
}

pub type SharedOrders = Arc<Mutex<OrderBook>>;

// ── Tools ──────────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// Words to look for in product names.
    query: String,
}

#[derive(Deserialize, JsonSchema)]
struct PurchaseArgs {
    /// Catalog id, e.g. "P-100".
    product_id: String,
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize, JsonSchema)]
struct OrderIdArgs {
    /// Order id, e.g. "A-1".
    order_id: String,
}

/// The demo tool set, sharing `orders` between all order tools.
pub fn demo_tools(orders: SharedOrders) -> ToolSet {
    let purchase_orders = orders.clone();
    let status_orders = orders.clone();
    let cancel_orders = orders;

    ToolSet::new()
        .with_arg_validation(true)
        .with(FnTool::new(
            ToolDef::new(
                "search_products",
                "Search the product catalog by name.",
                json_schema_for::<SearchArgs>(),
            ),
            |args: SearchArgs| async move { Ok(search(&args.query)) },
        ))
        .with(FnTool::new(
            ToolDef::new(
                "order_purchase",
                "Place an order for a catalog product.",
                json_schema_for::<PurchaseArgs>(),
            ),
            move |args: PurchaseArgs| {
                let orders = purchase_orders.clone();
                async move {
                    let product = CATALOG
                        .iter()
                        .find(|p| p.id == args.product_id)
                        .ok_or_else(|| format!("no product with id '{}'", args.product_id))?;
                    if args.quantity == 0 {
                        return Err("quantity must be at least 1".into());
                    }
                    let id = orders.lock().await.place(product.id, args.quantity);
                    Ok(format!(
                        "Order {id} placed: {} x {} (${:.2}).",
                        args.quantity,
                        product.name,
                        product.price_usd * f64::from(args.quantity)
                    ))
                }
            },
        ))
        .with(FnTool::new(
            ToolDef::new(
                "check_order_status",
                "Look up the status of an order.",
                json_schema_for::<OrderIdArgs>(),
            ),
            move |args: OrderIdArgs| {
                let orders = status_orders.clone();
                async move {
                    let book = orders.lock().await;
                    let order = book
                        .get(&args.order_id)
                        .ok_or_else(|| format!("no order with id '{}'", args.order_id))?;
                    Ok(format!(
                        "Order {}: {} x {}, {:?}.",
                        args.order_id, order.quantity, order.product_id, order.status
                    ))
                }
            },
        ))
        .with(FnTool::new(
            ToolDef::new(
                "cancel_order",
                "Cancel an existing order.",
                json_schema_for::<OrderIdArgs>(),
            ),
            move |args: OrderIdArgs| {
                let orders = cancel_orders.clone();
                async move {
                    let mut book = orders.lock().await;
                    let order = book
                        .orders
                        .get_mut(&args.order_id)
                        .ok_or_else(|| format!("no order with id '{}'", args.order_id))?;
                    if order.status == OrderStatus::Cancelled {
                        return Err(format!("order {} is already cancelled", args.order_id));
                    }
                    order.status = OrderStatus::Cancelled;
                    Ok(format!("Order {} cancelled.", args.order_id))
                }
            },
        ))
}

fn search(query: &str) -> String {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let hits: Vec<String> = CATALOG
        .iter()
        .filter(|p| {
            let name = p.name.to_lowercase();
            words.iter().any(|w| name.contains(w.as_str()))
        })
        .map(|p| format!("{} | {} | ${:.2}", p.id, p.name, p.price_usd))
        .collect();
    if hits.is_empty() {
        format!("No products match '{query}'.")
    } else {
        hits.join("\n")
    }
}
