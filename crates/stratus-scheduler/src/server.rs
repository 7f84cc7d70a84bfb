//! TCP front end: one listener per channel, all feeding the event loop.

use std::net::SocketAddr;

use stratus_proto::{
    ClientMessage, ClientRequest, ClientResponse, Codec, Envelope, ExecutorMessage, GenericResponse,
    GossipMessage, MessageType, SchedulerErrorCode,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ListenConfig, PortConfig};
use crate::error::{Result, SchedulerError};
use crate::service::{Inbound, Scheduler};
use crate::transport;

/// Queue depth between listeners and the event loop.
const INBOUND_CAPACITY: usize = 1024;

/// Inbound channels, each on its own port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Connect,
    FunctionCreate,
    FunctionCall,
    DagCreate,
    DagCall,
    List,
    ExecutorStatus,
    SchedulerUpdate,
}

impl Channel {
    pub const ALL: [Self; 8] = [
        Self::Connect,
        Self::FunctionCreate,
        Self::FunctionCall,
        Self::DagCreate,
        Self::DagCall,
        Self::List,
        Self::ExecutorStatus,
        Self::SchedulerUpdate,
    ];

    #[must_use]
    pub const fn port(self, ports: &PortConfig) -> u16 {
        match self {
            Self::Connect => ports.connect,
            Self::FunctionCreate => ports.function_create,
            Self::FunctionCall => ports.function_call,
            Self::DagCreate => ports.dag_create,
            Self::DagCall => ports.dag_call,
            Self::List => ports.list,
            Self::ExecutorStatus => ports.executor_status,
            Self::SchedulerUpdate => ports.scheduler_update,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::FunctionCreate => "function_create",
            Self::FunctionCall => "function_call",
            Self::DagCreate => "dag_create",
            Self::DagCall => "dag_call",
            Self::List => "list",
            Self::ExecutorStatus => "executor_status",
            Self::SchedulerUpdate => "scheduler_update",
        }
    }

    /// Whether a client request belongs on this channel.
    #[must_use]
    pub fn accepts(self, request: &ClientRequest) -> bool {
        request.kind() == self.name()
    }
}

/// Bound listeners, not yet accepting.
#[derive(Debug)]
pub struct Listeners {
    bound: Vec<(Channel, TcpListener)>,
}

impl Listeners {
    /// Binds every channel port.
    pub async fn bind(config: &ListenConfig) -> Result<Self> {
        let mut bound = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let addr = config.socket_addr(channel.port(&config.ports));
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                SchedulerError::Config(format!("cannot bind {} on {addr}: {e}", channel.name()))
            })?;
            info!(channel = channel.name(), addr = %listener.local_addr()?, "listening");
            bound.push((channel, listener));
        }
        Ok(Self { bound })
    }

    /// Actual address of a channel, useful with ephemeral ports.
    #[must_use]
    pub fn local_addr(&self, channel: Channel) -> Option<SocketAddr> {
        self.bound
            .iter()
            .find(|(c, _)| *c == channel)
            .and_then(|(_, listener)| listener.local_addr().ok())
    }

    /// Starts one accept loop per channel.
    pub fn spawn(self, inbound: &mpsc::Sender<Inbound>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.bound
            .into_iter()
            .map(|(channel, listener)| {
                tokio::spawn(accept_loop(channel, listener, inbound.clone(), cancel.clone()))
            })
            .collect()
    }
}

/// Runs the scheduler behind `listeners` until `cancel` fires.
pub async fn serve(scheduler: Scheduler, listeners: Listeners, cancel: CancellationToken) {
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    let accept_tasks = listeners.spawn(&tx, &cancel);
    drop(tx);

    scheduler.run(rx, cancel.clone()).await;

    cancel.cancel();
    for task in accept_tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "listener task ended abnormally");
        }
    }
}

async fn accept_loop(
    channel: Channel,
    listener: TcpListener,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(channel = channel.name(), "listener shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(channel = channel.name(), peer = %peer, "accepted connection");
                        let inbound = inbound.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(channel, stream, inbound, cancel).await {
                                warn!(channel = channel.name(), peer = %peer, error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(channel = channel.name(), error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    channel: Channel,
    mut stream: TcpStream,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) -> Result<()> {
    match channel {
        Channel::ExecutorStatus => executor_status(&mut stream, &inbound, &cancel).await,
        Channel::SchedulerUpdate => scheduler_update(&mut stream, &inbound, &cancel).await,
        _ => client_requests(channel, &mut stream, &inbound, &cancel).await,
    }
}

/// Reads frames until the peer closes or shutdown begins.
macro_rules! next_frame {
    ($stream:expr, $ty:ty, $kind:expr, $cancel:expr) => {
        tokio::select! {
            () = $cancel.cancelled() => None,
            frame = transport::read_frame::<_, $ty>($stream, $kind) => frame?,
        }
    };
}

async fn executor_status(
    stream: &mut TcpStream,
    inbound: &mpsc::Sender<Inbound>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(envelope) = next_frame!(stream, ExecutorMessage, MessageType::Executor, cancel) {
        match envelope.payload {
            ExecutorMessage::Status(status) => forward(inbound, Inbound::Status(status)).await?,
            other => warn!(message = ?other, "unexpected message on status channel"),
        }
    }
    Ok(())
}

async fn scheduler_update(
    stream: &mut TcpStream,
    inbound: &mpsc::Sender<Inbound>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(envelope) = next_frame!(stream, GossipMessage, MessageType::Gossip, cancel) {
        let GossipMessage::KnownDags(dags) = envelope.payload;
        forward(inbound, Inbound::Gossip(dags)).await?;
    }
    Ok(())
}

async fn client_requests(
    channel: Channel,
    stream: &mut TcpStream,
    inbound: &mpsc::Sender<Inbound>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut codec = Codec::new();
    while let Some(envelope) = next_frame!(stream, ClientMessage, MessageType::Client, cancel) {
        let response = match envelope.payload {
            ClientMessage::Request(request) if channel.accepts(&request) => {
                let (reply, answer) = oneshot::channel();
                forward(inbound, Inbound::Client { request, reply }).await?;
                match answer.await {
                    Ok(response) => response,
                    // loop stopped before answering
                    Err(_) => return Ok(()),
                }
            }
            ClientMessage::Request(request) => {
                debug!(channel = channel.name(), request = request.kind(), "request on wrong channel");
                ClientResponse::Generic(GenericResponse::error(SchedulerErrorCode::InvalidRequest))
            }
            ClientMessage::Response(_) => {
                ClientResponse::Generic(GenericResponse::error(SchedulerErrorCode::InvalidRequest))
            }
        };

        let reply = Envelope::response_to(&envelope.header, ClientMessage::Response(response));
        transport::write_frame(stream, &mut codec, &reply, MessageType::Client).await?;
    }
    Ok(())
}

async fn forward(inbound: &mpsc::Sender<Inbound>, message: Inbound) -> Result<()> {
    inbound
        .send(message)
        .await
        .map_err(|_| SchedulerError::Internal("event loop stopped".into()))
}
