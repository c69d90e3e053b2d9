//! Configuration for subscriptions, servers and clients.

use strata_binary::{CreateSubscription, Modification, DEFAULT_MAX_FRAME_LEN};

/// What a client subscribes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Name of the registered output.
    pub name: String,
    /// Fields to receive, in order. Empty means every field.
    pub field_names: Vec<String>,
    /// Receive every field regardless of `field_names`.
    pub default_all: bool,
    /// Modifications applied when the subscription is created.
    pub modifications: Vec<Modification>,
}

impl SubscriptionConfig {
    /// Subscribes to every field of the named output.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_names: Vec::new(),
            default_all: true,
            modifications: Vec::new(),
        }
    }

    /// Restricts the subscription to the given fields.
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_names = names.into_iter().map(Into::into).collect();
        self.default_all = self.field_names.is_empty();
        self
    }

    /// Adds a modification applied on subscribe.
    pub fn modification(mut self, modification: Modification) -> Self {
        self.modifications.push(modification);
        self
    }

    /// Returns true if every field is requested.
    pub fn wants_all_fields(&self) -> bool {
        self.default_all || self.field_names.is_empty()
    }

    /// Returns the requested field names, or `None` for every field.
    pub fn projection(&self) -> Option<&[String]> {
        if self.wants_all_fields() {
            None
        } else {
            Some(&self.field_names)
        }
    }
}

impl From<CreateSubscription> for SubscriptionConfig {
    fn from(create: CreateSubscription) -> Self {
        Self {
            name: create.name,
            field_names: create.field_names,
            default_all: create.default_all,
            modifications: create.modifications,
        }
    }
}

impl From<&SubscriptionConfig> for CreateSubscription {
    fn from(config: &SubscriptionConfig) -> Self {
        CreateSubscription {
            name: config.name.clone(),
            field_names: config.field_names.clone(),
            default_all: config.default_all,
            modifications: config.modifications.clone(),
        }
    }
}

/// Configuration for a [`crate::SubscriptionServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the bounded command queue from transports.
    pub inbound_capacity: usize,
    /// Largest accepted frame, excluding the length prefix.
    pub max_frame_len: usize,
    /// Maximum commands handled per `poll`.
    pub drain_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            drain_limit: 256,
        }
    }
}

/// Configuration for a [`crate::SubscriptionClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the bounded queue of frames from the transport.
    pub inbound_capacity: usize,
    /// Largest accepted frame, excluding the length prefix.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
