//! Shopping cart domain events.

use common::AuditStamp;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{CartId, LineItemId, Money, OwnerId, ProductId, Quantity};

/// Events that can occur on a shopping cart aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    /// Cart was created for an owner.
    CartCreated(CartCreatedData),

    /// A quantity of a product was added to the cart.
    ItemAdded(ItemAddedData),

    /// A quantity of a product was taken out of the cart.
    ItemRemoved(ItemRemovedData),
}

impl CartEvent {
    /// Returns the cart the event belongs to.
    pub fn cart_id(&self) -> CartId {
        match self {
            CartEvent::CartCreated(data) => data.cart_id,
            CartEvent::ItemAdded(data) => data.cart_id,
            CartEvent::ItemRemoved(data) => data.cart_id,
        }
    }

    /// Returns the cart total the command computed, if the event carries one.
    pub fn cart_total(&self) -> Option<Money> {
        match self {
            CartEvent::CartCreated(_) => None,
            CartEvent::ItemAdded(data) => Some(data.cart_total),
            CartEvent::ItemRemoved(data) => Some(data.cart_total),
        }
    }
}

impl DomainEvent for CartEvent {
    fn event_types() -> &'static [&'static str] {
        &["CartCreated", "ItemAdded", "ItemRemoved"]
    }

    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated(_) => "CartCreated",
            CartEvent::ItemAdded(_) => "ItemAdded",
            CartEvent::ItemRemoved(_) => "ItemRemoved",
        }
    }

    fn operation(&self) -> &AuditStamp {
        match self {
            CartEvent::CartCreated(data) => &data.operation,
            CartEvent::ItemAdded(data) => &data.operation,
            CartEvent::ItemRemoved(data) => &data.operation,
        }
    }
}

/// Data for CartCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartCreatedData {
    /// Who created the cart, and when.
    pub operation: AuditStamp,

    /// The new cart identity.
    pub cart_id: CartId,

    /// The account owning the cart.
    pub owner_id: OwnerId,
}

/// Data for ItemAdded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub operation: AuditStamp,

    pub cart_id: CartId,

    /// Line item receiving the quantity; a new line uses this identity.
    pub line_item_id: LineItemId,

    pub product_id: ProductId,

    pub product_name: String,

    /// Unit price at the time of adding. Overwrites the line's price.
    pub product_price: Money,

    /// Quantity added by this event (not the resulting line quantity).
    pub quantity: Quantity,

    /// Cart total after the addition, as computed by the command.
    pub cart_total: Money,
}

impl ItemAddedData {
    /// Price of the quantity added by this event, or `None` on overflow.
    pub fn item_total(&self) -> Option<Money> {
        self.product_price.checked_times(self.quantity)
    }
}

/// Data for ItemRemoved event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRemovedData {
    pub operation: AuditStamp,

    pub cart_id: CartId,

    pub product_id: ProductId,

    pub product_name: String,

    /// Unit price of the line at the time of removal.
    pub product_price: Money,

    /// Line subtotal before the removal.
    pub item_subtotal: Money,

    /// Quantity removed by this event.
    pub quantity: Quantity,

    /// Cart total after the removal, as computed by the command.
    pub cart_total: Money,
}

impl std::fmt::Display for CartEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartEvent::CartCreated(data) => write!(
                f,
                "CartCreated cart={} owner={} [{}]",
                data.cart_id, data.owner_id, data.operation
            ),
            CartEvent::ItemAdded(data) => write!(
                f,
                "ItemAdded cart={} item={} product={} ({}) quantity={} unit_price={} cart_total={} [{}]",
                data.cart_id,
                data.line_item_id,
                data.product_id,
                data.product_name,
                data.quantity,
                data.product_price,
                data.cart_total,
                data.operation
            ),
            CartEvent::ItemRemoved(data) => write!(
                f,
                "ItemRemoved cart={} product={} ({}) quantity={} unit_price={} item_subtotal={} cart_total={} [{}]",
                data.cart_id,
                data.product_id,
                data.product_name,
                data.quantity,
                data.product_price,
                data.item_subtotal,
                data.cart_total,
                data.operation
            ),
        }
    }
}
