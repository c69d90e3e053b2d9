//! Client side of a connection: issues requests and mirrors subscriptions.

use hashbrown::{HashMap, HashSet};
use strata_binary::{
    encode_request, CreateSubscription, Frame, FrameDecoder, Modification, RequestType,
    ResponseType, SubscriptionRequest, SubscriptionResponse,
};
use strata_core::{Error, Result};
use strata_reactive::TransformOutput;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, SubscriptionConfig};
use crate::decoder::SubscriptionDecoder;

/// The transport's ends of a client's channels.
#[derive(Debug)]
pub struct ClientTransport {
    /// Request frames to write to the server.
    pub requests: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Bytes read from the server.
    pub responses: mpsc::Sender<Vec<u8>>,
}

/// An acknowledgement or error reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub subscription_id: i32,
    /// Token of the request this answers; 0 if none.
    pub msg_token: i64,
    pub success: bool,
    pub message: String,
}

#[derive(Debug)]
struct ClientSubscription {
    config: SubscriptionConfig,
    decoder: SubscriptionDecoder,
}

/// Issues subscription requests and applies responses to local mirrors.
///
/// Each subscription's mirror is a [`SubscriptionDecoder`] whose output can
/// feed further local inputs. Responses are only applied from [`poll`] or
/// [`accept_frame`], on the thread that owns the client.
///
/// [`poll`]: SubscriptionClient::poll
/// [`accept_frame`]: SubscriptionClient::accept_frame
#[derive(Debug)]
pub struct SubscriptionClient {
    config: ClientConfig,
    next_token: i64,
    next_subscription_id: i32,
    subscriptions: HashMap<i32, ClientSubscription>,
    /// Unsubscribed ids whose acknowledgement has not arrived.
    closing: HashSet<i32>,
    pending: HashMap<i64, RequestType>,
    frames: FrameDecoder,
    requests: mpsc::UnboundedSender<Vec<u8>>,
    responses: mpsc::Receiver<Vec<u8>>,
    messages: Vec<ClientMessage>,
}

impl SubscriptionClient {
    /// Creates a client and the channel ends its transport drives.
    pub fn new(config: ClientConfig) -> (Self, ClientTransport) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let client = Self {
            frames: FrameDecoder::with_max_frame_len(config.max_frame_len),
            config,
            next_token: 1,
            next_subscription_id: 1,
            subscriptions: HashMap::new(),
            closing: HashSet::new(),
            pending: HashMap::new(),
            requests: request_tx,
            responses: response_rx,
            messages: Vec::new(),
        };
        let transport = ClientTransport {
            requests: request_rx,
            responses: response_tx,
        };
        (client, transport)
    }

    /// Subscribes to an output and returns the new subscription id.
    pub fn subscribe(&mut self, config: SubscriptionConfig) -> i32 {
        let subscription_id = self.next_subscription_id;
        self.next_subscription_id += 1;
        info!(subscription_id, output = %config.name, "Subscribing");
        self.send(
            subscription_id,
            RequestType::Subscribe,
            Some(CreateSubscription::from(&config)),
        );
        self.subscriptions.insert(
            subscription_id,
            ClientSubscription {
                config,
                decoder: SubscriptionDecoder::new(subscription_id),
            },
        );
        subscription_id
    }

    /// Sends a modification for a subscription and returns the request token.
    pub fn modify(&mut self, subscription_id: i32, modification: Modification) -> Result<i64> {
        let name = self
            .subscriptions
            .get(&subscription_id)
            .map(|s| s.config.name.clone())
            .ok_or_else(|| Error::unknown_subscription(subscription_id))?;
        let create = CreateSubscription {
            name,
            modifications: vec![modification],
            ..CreateSubscription::default()
        };
        Ok(self.send(subscription_id, RequestType::Modify, Some(create)))
    }

    /// Removes a subscription and returns the request token.
    pub fn unsubscribe(&mut self, subscription_id: i32) -> Result<i64> {
        if self.subscriptions.remove(&subscription_id).is_none() {
            return Err(Error::unknown_subscription(subscription_id));
        }
        info!(subscription_id, "Unsubscribing");
        self.closing.insert(subscription_id);
        Ok(self.send(subscription_id, RequestType::Unsubscribe, None))
    }

    /// Re-issues `SUBSCRIBE` for every subscription, as after a reconnect.
    ///
    /// Mirrors are reset and buffered bytes from the old stream discarded.
    /// Returns the number of subscriptions re-issued.
    pub fn resubscribe_all(&mut self) -> usize {
        self.frames = FrameDecoder::with_max_frame_len(self.config.max_frame_len);
        self.pending.clear();
        self.closing.clear();

        let mut ids: Vec<i32> = self.subscriptions.keys().copied().collect();
        ids.sort_unstable();
        for &subscription_id in &ids {
            let Some(sub) = self.subscriptions.get_mut(&subscription_id) else {
                continue;
            };
            sub.decoder.reset();
            let create = CreateSubscription::from(&sub.config);
            self.send(subscription_id, RequestType::Subscribe, Some(create));
        }
        info!(count = ids.len(), "Resubscribed");
        ids.len()
    }

    /// Applies bytes received from the server. Returns the number of
    /// responses handled.
    ///
    /// Only framing errors are returned; the connection must then be
    /// dropped. Other errors are logged and the offending message skipped.
    pub fn accept_frame(&mut self, bytes: &[u8]) -> Result<usize> {
        self.frames.push(bytes);
        let mut handled = 0;
        loop {
            match self.frames.next_frame() {
                Ok(Some(Frame::Response(response))) => {
                    self.dispatch(response);
                    handled += 1;
                }
                Ok(Some(Frame::Request(request))) => {
                    warn!(msg_token = request.msg_token, "Ignoring request frame from server");
                }
                Ok(None) => return Ok(handled),
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Server stream unreadable");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Dropped malformed response"),
            }
        }
    }

    /// Drains bytes queued by the transport. Returns the number of
    /// responses handled.
    pub fn poll(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            match self.responses.try_recv() {
                Ok(bytes) => handled += self.accept_frame(&bytes)?,
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) => {
                    debug!("Transport closed");
                    return Ok(handled);
                }
            }
        }
    }

    /// Takes acknowledgements and errors received since the last call.
    pub fn take_messages(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Returns the output of a subscription's mirror.
    pub fn output(&self, subscription_id: i32) -> Option<TransformOutput> {
        self.subscriptions
            .get(&subscription_id)
            .map(|s| s.decoder.output())
    }

    /// Returns a subscription's mirror.
    pub fn decoder(&self, subscription_id: i32) -> Option<&SubscriptionDecoder> {
        self.subscriptions
            .get(&subscription_id)
            .map(|s| &s.decoder)
    }

    /// Returns the ids of current subscriptions in ascending order.
    pub fn subscription_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.subscriptions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn send(
        &mut self,
        subscription_id: i32,
        request_type: RequestType,
        subscription: Option<CreateSubscription>,
    ) -> i64 {
        let msg_token = self.next_token;
        self.next_token += 1;
        self.pending.insert(msg_token, request_type);

        let request = SubscriptionRequest {
            msg_token,
            subscription_id,
            request_type,
            subscription,
        };
        debug!(
            msg_token,
            subscription_id,
            request_type = request_type.code(),
            "Sending request"
        );
        if self.requests.send(encode_request(&request)).is_err() {
            warn!(msg_token, "Transport closed, request dropped");
        }
        msg_token
    }

    fn dispatch(&mut self, response: SubscriptionResponse) {
        let subscription_id = response.subscription_id;
        debug!(
            subscription_id,
            response_type = response.response_type.name(),
            "Received response"
        );

        if response.response_type == ResponseType::Message {
            let ack = response.response.clone().unwrap_or_default();
            let request_type = self.pending.remove(&response.msg_token);
            if !ack.success {
                warn!(subscription_id, error = %ack.message, "Request failed");
            }
            self.messages.push(ClientMessage {
                subscription_id,
                msg_token: response.msg_token,
                success: ack.success,
                message: ack.message,
            });
            if request_type == Some(RequestType::Unsubscribe) {
                self.closing.remove(&subscription_id);
                return;
            }
            // Success acks and failed modifications leave the mirror as is
            if ack.success || request_type == Some(RequestType::Modify) {
                return;
            }
        }

        let Some(sub) = self.subscriptions.get_mut(&subscription_id) else {
            if self.closing.contains(&subscription_id) {
                debug!(subscription_id, "Dropped response for closing subscription");
            } else if subscription_id != 0 || response.response_type != ResponseType::Message {
                warn!(
                    error = %Error::unknown_subscription(subscription_id),
                    "Dropped response"
                );
            }
            return;
        };
        match sub.decoder.accept(&response) {
            Ok(()) => {}
            Err(e @ Error::ProtocolViolation { .. }) => {
                warn!(subscription_id, error = %e, "Subscription corrupted");
                self.messages.push(ClientMessage {
                    subscription_id,
                    msg_token: 0,
                    success: false,
                    message: e.to_string(),
                });
            }
            Err(e) => warn!(subscription_id, error = %e, "Dropped response"),
        }
    }
}
