//! Server side of a subscription: an input that turns batches into responses.

use std::cell::RefCell;
use std::rc::Rc;

use strata_binary::{encode_response, ResponseType, SubscriptionResponse};
use strata_core::schema::SchemaRef;
use strata_core::{FieldSet, RowId};
use strata_reactive::{TransformInput, TransformOutput};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::encoder::DeltaEncoder;

/// Destination for encoded responses.
pub trait ResponseSink {
    fn send(&self, response: SubscriptionResponse);
}

/// Writes responses as frames to a connection's outbound channel.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    connection_id: u64,
    outbound: UnboundedSender<Vec<u8>>,
}

impl ConnectionSender {
    pub fn new(connection_id: u64, outbound: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            connection_id,
            outbound,
        }
    }

    #[inline]
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }
}

impl ResponseSink for ConnectionSender {
    fn send(&self, response: SubscriptionResponse) {
        debug!(
            connection_id = self.connection_id,
            subscription_id = response.subscription_id,
            response_type = response.response_type.name(),
            rows = response.data.as_ref().map_or(0, |d| d.rows.len()),
            "Sending response"
        );
        if self.outbound.send(encode_response(&response)).is_err() {
            debug!(
                connection_id = self.connection_id,
                "Outbound channel closed, response dropped"
            );
        }
    }
}

impl ResponseSink for RefCell<Vec<SubscriptionResponse>> {
    fn send(&self, response: SubscriptionResponse) {
        self.borrow_mut().push(response);
    }
}

/// Progress of a sink through the subscription protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    AwaitingSchema,
    AwaitingInit,
    Live,
    /// The subscription could not be served; no more data is sent.
    Failed,
}

/// A `TransformInput` that encodes every notification for one subscription.
///
/// The first `rows_added` after a schema becomes `INIT`; later ones become
/// `ADD`. A source without live rows gets an empty `INIT` right after the
/// schema.
pub struct SubscriptionSink {
    encoder: DeltaEncoder,
    sink: Rc<dyn ResponseSink>,
    source: Option<TransformOutput>,
    state: SinkState,
}

impl SubscriptionSink {
    pub fn new(
        subscription_id: i32,
        projection: Option<Vec<String>>,
        sink: Rc<dyn ResponseSink>,
    ) -> Self {
        Self {
            encoder: DeltaEncoder::new(subscription_id, projection),
            sink,
            source: None,
            state: SinkState::AwaitingSchema,
        }
    }

    /// Splits row batches so every frame stays within `max_frame_len`.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.encoder = self.encoder.with_max_frame_len(max_frame_len);
        self
    }

    /// Creates a sink ready to be attached.
    pub fn shared(
        subscription_id: i32,
        projection: Option<Vec<String>>,
        sink: Rc<dyn ResponseSink>,
    ) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(subscription_id, projection, sink)))
    }

    #[inline]
    pub fn subscription_id(&self) -> i32 {
        self.encoder.subscription_id()
    }

    #[inline]
    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Returns true while attached to an output.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Checks the projection against a schema without adopting it.
    pub fn validate(&self, schema: &SchemaRef) -> strata_core::Result<()> {
        self.encoder.validate(schema)
    }

    fn fail(&mut self, message: String) {
        warn!(
            subscription_id = self.subscription_id(),
            error = %message,
            "Subscription failed"
        );
        self.state = SinkState::Failed;
        self.sink.send(SubscriptionResponse::message(
            self.subscription_id(),
            0,
            false,
            message,
        ));
    }

    fn send_all(&mut self, encoded: strata_core::Result<Vec<SubscriptionResponse>>) {
        match encoded {
            Ok(responses) => {
                for response in responses {
                    self.sink.send(response);
                }
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn send_rows(&mut self, response_type: ResponseType, rows: &[RowId]) {
        let encoded = self.encoder.encode_rows(response_type, rows);
        self.send_all(encoded);
    }
}

impl TransformInput for SubscriptionSink {
    fn set_source(&mut self, source: Option<&TransformOutput>) {
        self.source = source.cloned();
    }

    fn schema_updated(&mut self, schema: Option<SchemaRef>) {
        if self.state == SinkState::Failed {
            return;
        }
        let Some(schema) = schema else {
            self.encoder.reset();
            self.state = SinkState::AwaitingSchema;
            return;
        };
        match self.encoder.encode_schema(&schema) {
            Ok(response) => {
                self.sink.send(response);
                let empty = self.source.as_ref().map_or(true, |s| s.row_count() == 0);
                if empty {
                    self.state = SinkState::Live;
                    self.send_rows(ResponseType::Init, &[]);
                } else {
                    self.state = SinkState::AwaitingInit;
                }
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn rows_added(&mut self, rows: &[RowId]) {
        match self.state {
            SinkState::AwaitingInit => {
                self.state = SinkState::Live;
                self.send_rows(ResponseType::Init, rows);
            }
            SinkState::Live => self.send_rows(ResponseType::Add, rows),
            SinkState::AwaitingSchema | SinkState::Failed => {}
        }
    }

    fn rows_changed(&mut self, rows: &[RowId], fields: &FieldSet) {
        if self.state != SinkState::Live {
            return;
        }
        let encoded = self.encoder.encode_change(rows, fields);
        self.send_all(encoded);
    }

    fn rows_removed(&mut self, rows: &[RowId]) {
        if self.state == SinkState::Live {
            let encoded = self.encoder.encode_remove(rows);
            self.send_all(encoded);
        }
    }
}

impl std::fmt::Debug for SubscriptionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSink")
            .field("subscription_id", &self.subscription_id())
            .field("state", &self.state)
            .field("attached", &self.is_attached())
            .finish()
    }
}
