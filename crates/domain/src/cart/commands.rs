//! Shopping cart commands.

use super::{CartId, OwnerId, Product, ProductId, Quantity};

/// Command to create a new cart.
#[derive(Debug, Clone)]
pub struct CreateCart {
    /// The account that will own the cart.
    pub owner_id: OwnerId,
}

impl CreateCart {
    /// Creates a new CreateCart command.
    pub fn for_owner(owner_id: impl Into<OwnerId>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }
}

/// Command to add a quantity of a product to a cart.
#[derive(Debug, Clone)]
pub struct AddItem {
    /// The cart to add to.
    pub cart_id: CartId,

    /// The product, with its current price.
    pub product: Product,

    /// Quantity to add.
    pub quantity: Quantity,
}

impl AddItem {
    /// Creates a new AddItem command.
    pub fn new(cart_id: CartId, product: Product, quantity: impl Into<Quantity>) -> Self {
        Self {
            cart_id,
            product,
            quantity: quantity.into(),
        }
    }
}

/// Command to take a quantity of a product out of a cart.
#[derive(Debug, Clone)]
pub struct RemoveItem {
    /// The cart to remove from.
    pub cart_id: CartId,

    /// The product to remove.
    pub product_id: ProductId,

    /// Quantity to remove.
    pub quantity: Quantity,
}

impl RemoveItem {
    /// Creates a new RemoveItem command.
    pub fn new(
        cart_id: CartId,
        product_id: impl Into<ProductId>,
        quantity: impl Into<Quantity>,
    ) -> Self {
        Self {
            cart_id,
            product_id: product_id.into(),
            quantity: quantity.into(),
        }
    }
}
