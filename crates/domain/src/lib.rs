//! Domain layer for the shopping cart system.
//!
//! This crate provides:
//! - The Aggregate trait and the embedded AggregateRoot bookkeeping
//! - CommandHandler, which loads aggregates from and saves them to an event store
//! - The ShoppingCart aggregate with its events, value objects and service
//! - Environment configuration and tracing setup

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod config;
pub mod error;
pub mod telemetry;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, ReplayError};
pub use cart::{
    AddItem, CartCreatedData, CartError, CartEvent, CartId, CartService, CreateCart,
    ItemAddedData, ItemRemovedData, LineItem, LineItemId, Money, OwnerId, Product, ProductId,
    Quantity, RemoveItem, ShoppingCart,
};
pub use command::{CommandHandler, CommandResult, decode_event};
pub use config::{CartConfig, OverRemovalPolicy};
pub use error::DomainError;
pub use telemetry::init_tracing;
