//! The hub: connection registry plus dispatch and bus bridging for one
//! relay process.
//!
//! ```text
//! read pumps ──submit──▶ inbound ──▶ Dispatcher ──▶ Registry ──▶ outbound queues
//!                          ▲             │
//!                          │             └──▶ Publisher ──▶ bus
//!            Subscriber ◀──┴──────────────────────────────── bus
//!
//! handler / read pumps ──Membership──▶ Coordinator ──▶ Registry
//! ```
//!
//! [`Hub`] is an explicitly constructed handle; nothing here is a
//! process-wide singleton, so tests can run any number of hubs side by
//! side over a shared [`crate::bus::MemoryBus`].

pub mod coordinator;
pub mod dispatcher;
pub mod echo;
pub mod names;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::bus::bridge::{run_publisher, run_subscriber};
use crate::bus::{MessageBus, all_topics};
use crate::domain::{ChatMessage, ConnectionId, UserId};
use crate::error::RelayError;
use crate::persistence::{ChatStore, PersistenceWriter};

pub use coordinator::Membership;
pub use echo::EchoFilter;
pub use names::{DisplayNameCache, UNKNOWN_USER};
pub use registry::{BroadcastReport, Registration, Registry, preload_budget};

use coordinator::run_coordinator;
use dispatcher::{Dispatcher, run_dispatcher};

/// Capacity of the membership request channel.
const MEMBERSHIP_CAPACITY: usize = 256;

/// Where a message entered this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted by a client connected to this process.
    Local,
    /// Received from the bus (any process, possibly this one).
    Bus,
}

/// A message on the hub's inbound stream.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The message.
    pub message: ChatMessage,
    /// Where it came from.
    pub origin: Origin,
}

impl Envelope {
    /// Wraps a message submitted by a local client.
    #[must_use]
    pub const fn local(message: ChatMessage) -> Self {
        Self {
            message,
            origin: Origin::Local,
        }
    }

    /// Wraps a message received from the bus.
    #[must_use]
    pub const fn from_bus(message: ChatMessage) -> Self {
        Self {
            message,
            origin: Origin::Bus,
        }
    }
}

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Shared inbound stream buffer.
    pub inbound_capacity: usize,
    /// Per-connection outbound queue bound.
    pub outbound_capacity: usize,
    /// Persistence work-queue bound.
    pub persistence_capacity: usize,
    /// Topic namespace on the bus.
    pub topic_prefix: String,
    /// Bound on handing a message to the bus publisher or publishing it.
    pub publish_timeout: Duration,
    /// Bound on a read pump's submit into the inbound stream.
    pub submit_timeout: Duration,
    /// Drop bus copies of locally originated messages.
    pub suppress_echo: bool,
    /// How long originated ids are remembered.
    pub echo_window: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            outbound_capacity: 100,
            persistence_capacity: 1024,
            topic_prefix: "chat:".to_string(),
            publish_timeout: Duration::from_millis(500),
            submit_timeout: Duration::from_millis(1000),
            suppress_echo: true,
            echo_window: Duration::from_secs(30),
        }
    }
}

/// Handle to a running hub. Cheap to clone; all clones share one hub.
#[derive(Debug, Clone)]
pub struct Hub {
    membership: mpsc::Sender<Membership>,
    inbound: mpsc::Sender<Envelope>,
    registry: Arc<Registry>,
    names: Arc<DisplayNameCache>,
    persistence: PersistenceWriter,
    outbound_capacity: usize,
    submit_timeout: Duration,
}

impl Hub {
    /// Subscribes to the bus and spawns the coordinator, dispatcher,
    /// publisher, subscriber and persistence tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bus`] if the bus subscription cannot be
    /// established; the process must not serve traffic in that case.
    pub async fn start(
        config: HubConfig,
        store: Arc<dyn ChatStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Result<Self, RelayError> {
        let subscription = bus.subscribe(&all_topics(&config.topic_prefix)).await?;

        let registry = Arc::new(Registry::new());
        let (membership, membership_rx) = mpsc::channel(MEMBERSHIP_CAPACITY);
        let (inbound, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (publish, publish_rx) = mpsc::channel(config.inbound_capacity.max(1));

        tokio::spawn(run_coordinator(Arc::clone(&registry), membership_rx));
        tokio::spawn(run_dispatcher(
            Dispatcher {
                registry: Arc::clone(&registry),
                publish,
                publish_timeout: config.publish_timeout,
                echoes: config
                    .suppress_echo
                    .then(|| EchoFilter::new(config.echo_window)),
            },
            inbound_rx,
        ));
        tokio::spawn(run_publisher(
            bus,
            publish_rx,
            config.topic_prefix.clone(),
            config.publish_timeout,
        ));
        tokio::spawn(run_subscriber(subscription, inbound.clone()));

        let persistence = PersistenceWriter::spawn(Arc::clone(&store), config.persistence_capacity);
        let names = Arc::new(DisplayNameCache::new(store));

        tracing::info!(
            topic_prefix = %config.topic_prefix,
            suppress_echo = config.suppress_echo,
            "hub started"
        );

        Ok(Self {
            membership,
            inbound,
            registry,
            names,
            persistence,
            outbound_capacity: config.outbound_capacity.max(1),
            submit_timeout: config.submit_timeout,
        })
    }

    /// Asks the coordinator to register a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the coordinator has stopped.
    pub async fn register(&self, registration: Registration) -> Result<(), RelayError> {
        self.membership
            .send(Membership::Register(registration))
            .await
            .map_err(|_| RelayError::Internal("lifecycle coordinator stopped".into()))
    }

    /// Asks the coordinator to remove a connection and close its queue.
    pub async fn unregister(&self, id: ConnectionId) {
        if self.membership.send(Membership::Unregister(id)).await.is_err() {
            tracing::warn!(conn_id = %id, "lifecycle coordinator stopped before unregister");
        }
    }

    /// Submits a locally originated message to the inbound stream.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the dispatcher has stopped or
    /// the stream stays full past the submit timeout.
    pub async fn submit(&self, message: ChatMessage) -> Result<(), RelayError> {
        let send = self.inbound.send(Envelope::local(message));
        match tokio::time::timeout(self.submit_timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RelayError::Internal("dispatcher stopped".into())),
            Err(_) => Err(RelayError::Internal("inbound stream full".into())),
        }
    }

    /// Queues a message for persistence without waiting for the store.
    pub fn persist(&self, message: ChatMessage) -> bool {
        self.persistence.enqueue(message)
    }

    /// Resolves a sender's display name through the cache.
    pub async fn display_name(&self, user_id: UserId) -> String {
        self.names.resolve(user_id).await
    }

    /// Number of live registered connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Returns `true` if the connection is currently registered.
    pub async fn is_registered(&self, id: ConnectionId) -> bool {
        self.registry.contains(id).await
    }

    /// Bound for new connections' outbound queues.
    #[must_use]
    pub const fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    /// Messages waiting to be persisted.
    #[must_use]
    pub fn persistence_backlog(&self) -> usize {
        self.persistence.backlog()
    }
}
