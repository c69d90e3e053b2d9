//! Strata Subscription - Live table subscriptions over the binary protocol.
//!
//! This crate connects table outputs to remote consumers:
//!
//! - `SubscriptionSink`: An input that encodes an output's batches as responses
//! - `DeltaEncoder`: Schema projection and columnar encoding of row batches
//! - `SubscriptionDecoder`: Client-side mirror rebuilt from responses, itself an output
//! - `ServerSession` / `SubscriptionServer`: Request handling per connection
//! - `SubscriptionClient`: Request issuing and response dispatch
//!
//! Tables and their subscribers live on one thread. Transports on other
//! threads exchange bytes with it through `tokio::sync::mpsc` channels: a
//! bounded command queue into the server, and an unbounded frame queue out of
//! it per connection.
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::SchemaBuilder;
//! use strata_core::{DataType, Value};
//! use strata_storage::Table;
//! use strata_subscription::{
//!     ClientConfig, ServerConfig, SubscriptionClient, SubscriptionConfig, SubscriptionServer,
//! };
//!
//! let schema = SchemaBuilder::new("orders")
//!     .add_field("id", DataType::Int32)
//!     .unwrap()
//!     .build();
//! let mut table = Table::new(schema);
//! table.insert(|w| w.set(0, 7)).unwrap();
//! table.fire_changes();
//!
//! let (mut server, handle) = SubscriptionServer::new(ServerConfig::default());
//! server.register_output("orders", table.output());
//! let (conn, mut to_client) = handle.connect().unwrap();
//!
//! let (mut client, mut transport) = SubscriptionClient::new(ClientConfig::default());
//! let id = client.subscribe(SubscriptionConfig::new("orders"));
//!
//! while let Ok(bytes) = transport.requests.try_recv() {
//!     handle.send_frame(conn, bytes).unwrap();
//! }
//! server.poll();
//! while let Ok(bytes) = to_client.try_recv() {
//!     client.accept_frame(&bytes).unwrap();
//! }
//!
//! let mirror = client.decoder(id).unwrap();
//! assert_eq!(mirror.get(0, "id").unwrap(), Value::Int32(7));
//! ```

pub mod client;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod server;
pub mod sink;

pub use client::{ClientMessage, ClientTransport, SubscriptionClient};
pub use config::{ClientConfig, ServerConfig, SubscriptionConfig};
pub use decoder::{DecoderState, SubscriptionDecoder, DEFAULT_MAX_ROW_ID};
pub use encoder::DeltaEncoder;
pub use server::{
    Command, ModificationHandler, RegisteredOutputs, ServerHandle, ServerSession,
    SubscriptionServer,
};
pub use sink::{ConnectionSender, ResponseSink, SinkState, SubscriptionSink};
