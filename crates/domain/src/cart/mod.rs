//! Shopping cart aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod value_objects;

pub use aggregate::ShoppingCart;
pub use commands::{AddItem, CreateCart, RemoveItem};
pub use events::{CartCreatedData, CartEvent, ItemAddedData, ItemRemovedData};
pub use service::CartService;
pub use value_objects::{CartId, LineItem, LineItemId, Money, OwnerId, Product, ProductId, Quantity};

use thiserror::Error;

/// Errors that can occur during shopping cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The cart already has an identity.
    #[error("Cart already created: {cart_id}")]
    AlreadyCreated { cart_id: CartId },

    /// The cart has no identity yet.
    #[error("Cart has not been created")]
    NotCreated,

    /// An event addressed another cart.
    #[error("Event for cart {actual} applied to cart {expected}")]
    CartMismatch { expected: CartId, actual: CartId },

    /// Quantities added or removed must be greater than zero.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: Quantity },

    /// More was removed than the line holds.
    #[error("Cannot remove {requested} of {product_id}: only {available} in cart")]
    InsufficientQuantity {
        product_id: ProductId,
        available: Quantity,
        requested: Quantity,
    },

    /// A removal event names a product the cart does not hold.
    #[error("Item not found: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// A quantity or amount for the product does not fit in a decimal.
    #[error("Amount for {product_id} is out of range")]
    Overflow { product_id: ProductId },
}
