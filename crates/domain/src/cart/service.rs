//! Command entry points for shopping carts.

use std::sync::Arc;

use common::OperationContextProvider;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::config::CartConfig;
use crate::error::DomainError;

use super::{AddItem, CartId, CreateCart, RemoveItem, ShoppingCart};

/// Loads carts from an event store, runs commands and persists the outcome.
pub struct CartService<S: EventStore> {
    handler: CommandHandler<S, ShoppingCart>,
    operations: Arc<dyn OperationContextProvider>,
    config: CartConfig,
}

impl<S: EventStore> CartService<S> {
    pub fn new(store: S, operations: Arc<dyn OperationContextProvider>, config: CartConfig) -> Self {
        Self {
            handler: CommandHandler::new(store),
            operations,
            config,
        }
    }

    /// Returns the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, ShoppingCart> {
        &self.handler
    }

    /// Creates a new cart and persists its `CartCreated` event.
    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self, command: CreateCart) -> Result<CommandResult<ShoppingCart>, DomainError> {
        metrics::counter!("cart_commands_total", "command" => "create_cart").increment(1);
        self.handler
            .execute(self.fresh_cart(), |cart| cart.create(command.owner_id).map(|_| ()))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, command: AddItem) -> Result<CommandResult<ShoppingCart>, DomainError> {
        metrics::counter!("cart_commands_total", "command" => "add_item").increment(1);
        let cart = self.load(command.cart_id).await?;
        self.handler
            .execute(cart, |cart| cart.add_item(&command.product, command.quantity))
            .await
    }

    /// Removing a product the cart does not hold persists nothing.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, command: RemoveItem) -> Result<CommandResult<ShoppingCart>, DomainError> {
        metrics::counter!("cart_commands_total", "command" => "remove_item").increment(1);
        let cart = self.load(command.cart_id).await?;
        self.handler
            .execute(cart, |cart| cart.remove_item(&command.product_id, command.quantity))
            .await
    }

    /// Rebuilds a cart from its stored events.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, cart_id: CartId) -> Result<ShoppingCart, DomainError> {
        let mut cart = self.fresh_cart();
        self.handler.load_into(cart_id.as_aggregate_id(), &mut cart).await?;
        Ok(cart)
    }

    fn fresh_cart(&self) -> ShoppingCart {
        ShoppingCart::with_config(Arc::clone(&self.operations), &self.config)
    }
}
