//! Server side of connections: sessions, the output registry and the
//! command queue transports feed.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use strata_binary::{
    Acknowledgement, Frame, FrameDecoder, Modification, RequestType, SubscriptionRequest,
    SubscriptionResponse, DEFAULT_MAX_FRAME_LEN,
};
use strata_core::{Error, Result};
use strata_reactive::{InputRef, TransformOutput};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, SubscriptionConfig};
use crate::sink::{ConnectionSender, ResponseSink, SubscriptionSink};

/// Applies `MODIFY` requests for one output.
pub trait ModificationHandler {
    fn apply(&self, subscription_id: i32, modification: &Modification) -> Acknowledgement;
}

/// Outputs available for subscription, by name.
#[derive(Default)]
pub struct RegisteredOutputs {
    outputs: HashMap<String, TransformOutput>,
    handlers: HashMap<String, Rc<dyn ModificationHandler>>,
}

impl RegisteredOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an output, returning the one previously under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        output: TransformOutput,
    ) -> Option<TransformOutput> {
        self.outputs.insert(name.into(), output)
    }

    pub fn unregister(&mut self, name: &str) -> Option<TransformOutput> {
        self.handlers.remove(name);
        self.outputs.remove(name)
    }

    /// Routes modifications of subscriptions to `name` to `handler`.
    pub fn set_modification_handler(
        &mut self,
        name: impl Into<String>,
        handler: Rc<dyn ModificationHandler>,
    ) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn output(&self, name: &str) -> Option<TransformOutput> {
        self.outputs.get(name).cloned()
    }

    pub fn handler(&self, name: &str) -> Option<Rc<dyn ModificationHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Returns registered names in ascending order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outputs.keys().cloned().collect();
        names.sort();
        names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl std::fmt::Debug for RegisteredOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredOutputs")
            .field("outputs", &self.names())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[derive(Debug)]
struct SessionSubscription {
    name: String,
    output: TransformOutput,
    sink: Rc<RefCell<SubscriptionSink>>,
}

impl SessionSubscription {
    fn detach(&self) -> bool {
        let input: InputRef = self.sink.clone();
        self.output.detach_input(&input)
    }
}

/// The subscriptions of one connection.
pub struct ServerSession {
    connection_id: u64,
    sender: Rc<dyn ResponseSink>,
    subscriptions: HashMap<i32, SessionSubscription>,
    max_frame_len: usize,
}

impl ServerSession {
    pub fn new(connection_id: u64, sender: Rc<dyn ResponseSink>) -> Self {
        Self {
            connection_id,
            sender,
            subscriptions: HashMap::new(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Keeps every response frame within `max_frame_len` bytes.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    #[inline]
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Returns the number of active subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Handles one request. Every request is acknowledged with a `MESSAGE`
    /// echoing its token.
    pub fn handle_request(&mut self, outputs: &RegisteredOutputs, request: SubscriptionRequest) {
        debug!(
            connection_id = self.connection_id,
            msg_token = request.msg_token,
            subscription_id = request.subscription_id,
            request_type = request.request_type.code(),
            "Received request"
        );
        match request.request_type {
            RequestType::Subscribe => self.subscribe(outputs, request),
            RequestType::Modify => self.modify(outputs, &request),
            RequestType::Unsubscribe => self.unsubscribe(&request),
            RequestType::Unknown(code) => {
                warn!(
                    connection_id = self.connection_id,
                    request_type = code,
                    "Unknown request type"
                );
                self.reply(&request, false, format!("Request type not understood: {}", code));
            }
        }
    }

    /// Detaches every subscription.
    pub fn close(&mut self) {
        let count = self.subscriptions.len();
        for (_, sub) in self.subscriptions.drain() {
            sub.detach();
        }
        info!(
            connection_id = self.connection_id,
            subscriptions = count,
            "Session closed"
        );
    }

    fn subscribe(&mut self, outputs: &RegisteredOutputs, request: SubscriptionRequest) {
        let subscription_id = request.subscription_id;
        let Some(create) = request.subscription.clone() else {
            self.reply(&request, false, "Subscribe without subscription");
            return;
        };
        if self.subscriptions.contains_key(&subscription_id) {
            self.reply(
                &request,
                false,
                format!("Subscription already exists: {}", subscription_id),
            );
            return;
        }
        let Some(output) = outputs.output(&create.name) else {
            warn!(
                connection_id = self.connection_id,
                output = %create.name,
                "Output not found"
            );
            self.reply(&request, false, format!("Output not found: {}", create.name));
            return;
        };

        let config = SubscriptionConfig::from(create);
        let projection = config.projection().map(<[String]>::to_vec);
        let sink = Rc::new(RefCell::new(
            SubscriptionSink::new(subscription_id, projection, self.sender.clone())
                .with_max_frame_len(self.max_frame_len),
        ));
        if let Some(schema) = output.schema() {
            if let Err(e) = sink.borrow().validate(&schema) {
                self.reply(
                    &request,
                    false,
                    format!("Exception handling subscription for {}: {}", config.name, e),
                );
                return;
            }
        }

        // A subscription whose modifications fail is never created
        for modification in &config.modifications {
            let ack = apply_modification(outputs, subscription_id, &config.name, modification);
            if !ack.success {
                self.reply(&request, false, ack.message);
                return;
            }
        }

        self.reply(&request, true, format!("Subscribed to {}", config.name));
        info!(
            connection_id = self.connection_id,
            subscription_id,
            output = %config.name,
            "Subscription created"
        );

        let sub = SessionSubscription {
            name: config.name,
            output: output.clone(),
            sink: sink.clone(),
        };
        self.subscriptions.insert(subscription_id, sub);
        output.attach_input(sink);
    }

    fn modify(&mut self, outputs: &RegisteredOutputs, request: &SubscriptionRequest) {
        let Some(sub) = self.subscriptions.get(&request.subscription_id) else {
            self.reply(request, false, "Subscription not found");
            return;
        };
        let modifications = request
            .subscription
            .as_ref()
            .map(|c| c.modifications.as_slice())
            .unwrap_or_default();
        if modifications.is_empty() {
            self.reply(request, false, "Modify without modification");
            return;
        }
        let name = sub.name.clone();
        let mut ack = Acknowledgement::default();
        for modification in modifications {
            ack = apply_modification(outputs, request.subscription_id, &name, modification);
            if !ack.success {
                break;
            }
        }
        self.reply(request, ack.success, ack.message);
    }

    fn unsubscribe(&mut self, request: &SubscriptionRequest) {
        match self.subscriptions.remove(&request.subscription_id) {
            Some(sub) => {
                sub.detach();
                info!(
                    connection_id = self.connection_id,
                    subscription_id = request.subscription_id,
                    output = %sub.name,
                    "Subscription removed"
                );
                self.reply(request, true, format!("Unsubscribed from {}", sub.name));
            }
            None => self.reply(request, false, "Subscription not found"),
        }
    }

    fn reply(&self, request: &SubscriptionRequest, success: bool, message: impl Into<String>) {
        let message = message.into();
        if !success {
            warn!(
                connection_id = self.connection_id,
                msg_token = request.msg_token,
                subscription_id = request.subscription_id,
                error = %message,
                "Request failed"
            );
        }
        self.sender.send(SubscriptionResponse::message(
            request.subscription_id,
            request.msg_token,
            success,
            message,
        ));
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("connection_id", &self.connection_id)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

fn apply_modification(
    outputs: &RegisteredOutputs,
    subscription_id: i32,
    name: &str,
    modification: &Modification,
) -> Acknowledgement {
    match outputs.handler(name) {
        Some(handler) => handler.apply(subscription_id, modification),
        None => Acknowledgement {
            success: false,
            message: format!("No modification handler for {}", name),
        },
    }
}

/// Work handed from transports to the server's thread.
#[derive(Debug)]
pub enum Command {
    Open {
        connection_id: u64,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    },
    /// Bytes read from a connection; need not align with frames.
    Frame { connection_id: u64, bytes: Vec<u8> },
    Close { connection_id: u64 },
}

/// Cloneable, thread-safe handle transports use to reach a server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::Sender<Command>,
    next_connection: Arc<AtomicU64>,
}

impl ServerHandle {
    /// Opens a connection. Returns its id and the receiver of response frames.
    pub fn connect(&self) -> Result<(u64, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (outbound, frames) = mpsc::unbounded_channel();
        self.submit(Command::Open {
            connection_id,
            outbound,
        })?;
        Ok((connection_id, frames))
    }

    /// Queues bytes read from a connection.
    pub fn send_frame(&self, connection_id: u64, bytes: Vec<u8>) -> Result<()> {
        self.submit(Command::Frame {
            connection_id,
            bytes,
        })
    }

    /// Queues the close of a connection.
    pub fn disconnect(&self, connection_id: u64) -> Result<()> {
        self.submit(Command::Close { connection_id })
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => Error::invalid_operation("Server command queue is full"),
            TrySendError::Closed(_) => Error::invalid_operation("Server has stopped"),
        })
    }
}

struct Connection {
    session: ServerSession,
    frames: FrameDecoder,
    sender: Rc<dyn ResponseSink>,
}

/// Serves registered outputs to connections.
///
/// Transports submit commands through a [`ServerHandle`] from any thread;
/// the thread owning the server applies them in [`poll`], between mutation
/// cycles of the tables it serves.
///
/// [`poll`]: SubscriptionServer::poll
pub struct SubscriptionServer {
    config: ServerConfig,
    outputs: RegisteredOutputs,
    connections: HashMap<u64, Connection>,
    commands: mpsc::Receiver<Command>,
}

impl SubscriptionServer {
    pub fn new(config: ServerConfig) -> (Self, ServerHandle) {
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let server = Self {
            config,
            outputs: RegisteredOutputs::new(),
            connections: HashMap::new(),
            commands: rx,
        };
        let handle = ServerHandle {
            commands: tx,
            next_connection: Arc::new(AtomicU64::new(1)),
        };
        (server, handle)
    }

    #[inline]
    pub fn outputs(&self) -> &RegisteredOutputs {
        &self.outputs
    }

    #[inline]
    pub fn outputs_mut(&mut self) -> &mut RegisteredOutputs {
        &mut self.outputs
    }

    /// Registers an output under `name`.
    pub fn register_output(&mut self, name: impl Into<String>, output: TransformOutput) {
        self.outputs.register(name, output);
    }

    /// Returns the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns a connection's session.
    pub fn session(&self, connection_id: u64) -> Option<&ServerSession> {
        self.connections.get(&connection_id).map(|c| &c.session)
    }

    /// Applies queued commands, at most `drain_limit` per call. Returns the
    /// number applied.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while handled < self.config.drain_limit {
            match self.commands.try_recv() {
                Ok(command) => {
                    self.handle(command);
                    handled += 1;
                }
                Err(_) => break,
            }
        }
        handled
    }

    /// Applies one command.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Open {
                connection_id,
                outbound,
            } => self.open(connection_id, outbound),
            Command::Frame {
                connection_id,
                bytes,
            } => self.process(connection_id, &bytes),
            Command::Close { connection_id } => {
                self.close(connection_id);
            }
        }
    }

    /// Registers a connection whose responses go to `outbound`.
    pub fn open(&mut self, connection_id: u64, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        let sender: Rc<dyn ResponseSink> = Rc::new(ConnectionSender::new(connection_id, outbound));
        let connection = Connection {
            session: ServerSession::new(connection_id, sender.clone())
                .with_max_frame_len(self.config.max_frame_len),
            frames: FrameDecoder::with_max_frame_len(self.config.max_frame_len),
            sender,
        };
        if let Some(mut previous) = self.connections.insert(connection_id, connection) {
            warn!(connection_id, "Connection reopened, closing previous session");
            previous.session.close();
        }
        info!(connection_id, "Connection opened");
    }

    /// Handles bytes read from a connection.
    ///
    /// A malformed request is answered with an error on subscription 0; a
    /// framing error closes the connection.
    pub fn process(&mut self, connection_id: u64, bytes: &[u8]) {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            warn!(connection_id, "Bytes for unknown connection");
            return;
        };
        connection.frames.push(bytes);
        let mut fatal = false;
        loop {
            match connection.frames.next_frame() {
                Ok(Some(Frame::Request(request))) => {
                    connection.session.handle_request(&self.outputs, request)
                }
                Ok(Some(Frame::Response(response))) => warn!(
                    connection_id,
                    subscription_id = response.subscription_id,
                    "Ignoring response frame from client"
                ),
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    warn!(connection_id, error = %e, "Closing unreadable connection");
                    fatal = true;
                    break;
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "Dropped malformed request");
                    connection
                        .sender
                        .send(SubscriptionResponse::message(0, 0, false, e.to_string()));
                }
            }
        }
        if fatal {
            self.close(connection_id);
        }
    }

    /// Closes a connection, detaching its subscriptions. Returns false if
    /// the connection was unknown.
    pub fn close(&mut self, connection_id: u64) -> bool {
        match self.connections.remove(&connection_id) {
            Some(mut connection) => {
                connection.session.close();
                info!(connection_id, "Connection closed");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SubscriptionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionServer")
            .field("config", &self.config)
            .field("outputs", &self.outputs)
            .field("connections", &self.connections.len())
            .finish()
    }
}
