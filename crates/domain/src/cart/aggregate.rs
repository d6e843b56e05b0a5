//! Shopping cart aggregate implementation.

use std::sync::Arc;

use common::{AggregateId, AuditStamp, OperationContextProvider, OperationKind};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::config::{CartConfig, OverRemovalPolicy};

use super::{
    CartError, CartEvent, CartId, LineItem, LineItemId, Money, OwnerId, Product, ProductId,
    Quantity,
    events::{CartCreatedData, ItemAddedData, ItemRemovedData},
};

/// Shopping cart aggregate root.
///
/// State is derived only from applied [`CartEvent`]s. Line items are kept in
/// insertion order, one per product; the total is recomputed on demand.
#[derive(Clone)]
pub struct ShoppingCart {
    root: AggregateRoot<CartEvent>,
    id: Option<CartId>,
    owner_id: Option<OwnerId>,
    items: Vec<LineItem>,
    operations: Arc<dyn OperationContextProvider>,
    over_removal: OverRemovalPolicy,
}

impl ShoppingCart {
    /// Creates an empty, uncreated cart whose events are stamped by `operations`.
    pub fn new(operations: Arc<dyn OperationContextProvider>) -> Self {
        Self::with_config(operations, &CartConfig::default())
    }

    /// Creates an empty cart using the policies from `config`.
    pub fn with_config(operations: Arc<dyn OperationContextProvider>, config: &CartConfig) -> Self {
        Self {
            root: AggregateRoot::default(),
            id: None,
            owner_id: None,
            items: Vec::new(),
            operations,
            over_removal: config.over_removal,
        }
    }
}

impl std::fmt::Debug for ShoppingCart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShoppingCart")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("items", &self.items)
            .field("version", &self.root.version())
            .field("pending_events", &self.root.pending_events().len())
            .finish_non_exhaustive()
    }
}

impl Aggregate for ShoppingCart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "ShoppingCart"
    }

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.id.map(|id| id.as_aggregate_id())
    }

    fn root(&self) -> &AggregateRoot<CartEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<CartEvent> {
        &mut self.root
    }

    fn apply(&mut self, event: &CartEvent) -> Result<(), CartError> {
        match event {
            CartEvent::CartCreated(data) => self.apply_cart_created(data),
            CartEvent::ItemAdded(data) => self.apply_item_added(data),
            CartEvent::ItemRemoved(data) => self.apply_item_removed(data),
        }
    }
}

// Query methods
impl ShoppingCart {
    /// Returns the cart ID, once created.
    pub fn id(&self) -> Option<CartId> {
        self.id
    }

    /// Returns the owning account, once created.
    pub fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    /// Returns true once the creation event has been applied.
    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// Returns the line items in insertion order.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Returns the line item for a product.
    pub fn item(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.product_id() == product_id)
    }

    /// Returns the number of line items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the sum of all line subtotals.
    pub fn total(&self) -> Money {
        self.items.iter().map(LineItem::subtotal).sum()
    }

    /// Returns the stamp of the operation that created the cart.
    pub fn creation(&self) -> Option<&AuditStamp> {
        self.root.creation()
    }

    /// Returns the stamp of the latest item change.
    pub fn last_mutation(&self) -> Option<&AuditStamp> {
        self.root.last_mutation()
    }

    fn position_of(&self, product_id: &ProductId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.product_id() == product_id)
    }

    /// Cart total once the line for `product_id` holds `quantity` at
    /// `unit_price`, summed in the same order as [`ShoppingCart::total`].
    ///
    /// Every committed state passes through here, so `total` never overflows.
    fn total_with(
        &self,
        product_id: &ProductId,
        unit_price: Money,
        quantity: Quantity,
    ) -> Result<Money, CartError> {
        let overflow = || CartError::Overflow {
            product_id: product_id.clone(),
        };
        let line = unit_price.checked_times(quantity).ok_or_else(overflow)?;

        let mut replaced = false;
        let mut total = Money::zero();
        for item in &self.items {
            let subtotal = if item.product_id() == product_id {
                replaced = true;
                line
            } else {
                item.subtotal()
            };
            total = total.checked_add(subtotal).ok_or_else(overflow)?;
        }
        if !replaced {
            total = total.checked_add(line).ok_or_else(overflow)?;
        }
        Ok(total)
    }

    fn grown_quantity(&self, product_id: &ProductId, by: Quantity) -> Result<Quantity, CartError> {
        let current = self.item(product_id).map_or_else(Quantity::zero, LineItem::quantity);
        current.checked_add(by).ok_or_else(|| CartError::Overflow {
            product_id: product_id.clone(),
        })
    }

    fn created_id(&self) -> Result<CartId, CartError> {
        self.id.ok_or(CartError::NotCreated)
    }
}

// Command methods (record events)
impl ShoppingCart {
    /// Creates the cart for an owner and returns its new identity.
    pub fn create(&mut self, owner_id: impl Into<OwnerId>) -> Result<CartId, CartError> {
        if let Some(cart_id) = self.id {
            return Err(CartError::AlreadyCreated { cart_id });
        }

        let cart_id = CartId::new();
        self.apply_change(CartEvent::CartCreated(CartCreatedData {
            operation: self.operations.create_operation(OperationKind::Creation),
            cart_id,
            owner_id: owner_id.into(),
        }))?;
        Ok(cart_id)
    }

    /// Adds `quantity` of a product.
    ///
    /// An existing line for the product grows by `quantity` and takes the
    /// product's current price; otherwise a new line is opened.
    pub fn add_item(&mut self, product: &Product, quantity: Quantity) -> Result<(), CartError> {
        let cart_id = self.created_id()?;
        if !quantity.is_positive() {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let line_item_id = self
            .item(&product.id)
            .map_or_else(LineItemId::new, LineItem::id);
        let grown = self.grown_quantity(&product.id, quantity)?;
        let cart_total = self.total_with(&product.id, product.price, grown)?;

        self.apply_change(CartEvent::ItemAdded(ItemAddedData {
            operation: self.operations.create_operation(OperationKind::Creation),
            cart_id,
            line_item_id,
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            product_price: product.price,
            quantity,
            cart_total,
        }))
    }

    /// Removes `quantity` of a product.
    ///
    /// Removing a product that is not in the cart records nothing. Asking
    /// for more than the line holds follows the configured
    /// [`OverRemovalPolicy`].
    pub fn remove_item(&mut self, product_id: &ProductId, quantity: Quantity) -> Result<(), CartError> {
        let cart_id = self.created_id()?;
        if !quantity.is_positive() {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let Some(item) = self.item(product_id) else {
            tracing::debug!(%cart_id, %product_id, "product not in cart, nothing to remove");
            return Ok(());
        };

        let quantity = if quantity > item.quantity() {
            match self.over_removal {
                OverRemovalPolicy::Reject => {
                    return Err(CartError::InsufficientQuantity {
                        product_id: product_id.clone(),
                        available: item.quantity(),
                        requested: quantity,
                    });
                }
                OverRemovalPolicy::Clamp => item.quantity(),
            }
        } else {
            quantity
        };

        let remaining = item.quantity() - quantity;
        let cart_total = self.total_with(product_id, item.unit_price(), remaining)?;

        let event = CartEvent::ItemRemoved(ItemRemovedData {
            operation: self.operations.create_operation(OperationKind::Mutation),
            cart_id,
            product_id: item.product_id().clone(),
            product_name: item.product_name().to_string(),
            product_price: item.unit_price(),
            item_subtotal: item.subtotal(),
            quantity,
            cart_total,
        });
        self.apply_change(event)
    }
}

// Apply event helpers
impl ShoppingCart {
    fn ensure_addressed(&self, cart_id: CartId) -> Result<(), CartError> {
        let expected = self.created_id()?;
        if expected != cart_id {
            return Err(CartError::CartMismatch {
                expected,
                actual: cart_id,
            });
        }
        Ok(())
    }

    fn apply_cart_created(&mut self, data: &CartCreatedData) -> Result<(), CartError> {
        if let Some(cart_id) = self.id {
            return Err(CartError::AlreadyCreated { cart_id });
        }

        self.id = Some(data.cart_id);
        self.owner_id = Some(data.owner_id.clone());
        self.root.record_creation(&data.operation);
        Ok(())
    }

    fn apply_item_added(&mut self, data: &ItemAddedData) -> Result<(), CartError> {
        self.ensure_addressed(data.cart_id)?;
        if !data.quantity.is_positive() {
            return Err(CartError::InvalidQuantity {
                quantity: data.quantity,
            });
        }

        let quantity = self.grown_quantity(&data.product_id, data.quantity)?;
        self.total_with(&data.product_id, data.product_price, quantity)?;

        match self.position_of(&data.product_id) {
            Some(index) => {
                let updated = self.items[index]
                    .clone()
                    .with_quantity(quantity)
                    .with_unit_price(data.product_price);
                self.items[index] = updated;
            }
            None => self.items.push(LineItem::new(
                data.line_item_id,
                data.product_id.clone(),
                data.product_name.clone(),
                data.product_price,
                data.quantity,
            )),
        }

        self.root.record_mutation(&data.operation);
        Ok(())
    }

    fn apply_item_removed(&mut self, data: &ItemRemovedData) -> Result<(), CartError> {
        self.ensure_addressed(data.cart_id)?;
        if !data.quantity.is_positive() {
            return Err(CartError::InvalidQuantity {
                quantity: data.quantity,
            });
        }

        let index = self
            .position_of(&data.product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: data.product_id.clone(),
            })?;
        let item = &self.items[index];
        let remaining = item.quantity() - data.quantity;
        if remaining.is_negative() {
            return Err(CartError::InsufficientQuantity {
                product_id: data.product_id.clone(),
                available: item.quantity(),
                requested: data.quantity,
            });
        }
        self.total_with(&data.product_id, item.unit_price(), remaining)?;

        if remaining.is_zero() {
            self.items.remove(index);
        } else {
            self.items[index] = item.clone().with_quantity(remaining);
        }

        self.root.record_mutation(&data.operation);
        Ok(())
    }
}
