//! # Network interface
//!
//! [Adapter] is the entry point of the crate: it allocates socket ids, opens TCP connections and UDP
//! sockets and resolves hostnames. URC messages are routed to the owning sockets by [Adapter::handle_urc],
//! which is usually driven by [Runner].
//!
//! ## Example
//!
//! ````
//! # use embassy_futures::select::select;
//! # use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! # use embassy_sync::pubsub::PubSubChannel;
//! # use quectel_at_nal::example::{ExampleAtClient, ExampleModem};
//! # use quectel_at_nal::{Adapter, Config, Runner, Urc};
//! #
//! # embassy_futures::block_on(async {
//! let channel: PubSubChannel<CriticalSectionRawMutex, Urc, 8, 1, 1> = PubSubChannel::new();
//! let client = ExampleAtClient::init(&channel);
//!
//! let adapter = Adapter::new(client, ExampleModem::default(), Config::default());
//! let mut runner = Runner::new(&adapter, channel.subscriber().unwrap());
//!
//! let application = async {
//!     // Creating a TCP connection
//!     let mut socket = adapter.connect_tcp_host("example.org", 80).await.unwrap();
//!
//!     // Sending some data
//!     let length = socket.write(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
//!     assert_eq!(18, length);
//!
//!     // Receiving some data
//!     let mut buffer = [0x0; 64];
//!     let length = socket.read(&mut buffer).await.unwrap();
//!     assert_eq!(b"HTTP/1.0 200 OK", &buffer[..length]);
//!
//!     // Closing socket
//!     socket.close().await.unwrap();
//! };
//!
//! select(runner.run(), application).await;
//! # });
//! ````
use crate::commands::{ActivateContextCommand, OpenCommand};
use crate::condition::{Condition, ConditionState};
use crate::config::Config;
use crate::dns::DnsLatch;
use crate::modem::ModemState;
use crate::stack::{Error, SocketTable, SlotState, MAX_SOCKETS, OPERATION_TIMEOUT};
use crate::tcp::TcpSocket;
use crate::udp::UdpSocket;
use crate::urc::{Notification, Urc};
use atat::asynch::AtatClient;
use atat::UrcSubscription;
use core::cell::RefCell;
use core::future::pending;
use core::net::SocketAddr;
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Timer};
use embedded_nal_async::TcpConnect;

/// Central client for network communication
pub struct Adapter<A: AtatClient, M: ModemState> {
    /// ATAT client, locked for each command exchange
    pub(crate) client: Mutex<CriticalSectionRawMutex, A>,

    /// Modem driver owning the AT session
    pub(crate) modem: M,

    pub(crate) config: Config,

    /// Socket id table
    pub(crate) table: BlockingMutex<CriticalSectionRawMutex, RefCell<SocketTable>>,

    /// Condition registers, array index = socket id
    pub(crate) conditions: [ConditionState; MAX_SOCKETS],

    /// Serializes DNS queries, as the modem reports results without query reference
    pub(crate) dns_lock: Mutex<CriticalSectionRawMutex, ()>,

    /// Result of the outstanding DNS query
    pub(crate) dns: DnsLatch,

    /// Signaled when a remote close schedules a new cleanup
    pub(crate) cleanup_scheduled: Signal<CriticalSectionRawMutex, ()>,
}

impl<A: AtatClient, M: ModemState> Adapter<A, M> {
    /// Creates a new network adapter. The PDP context given by config is expected to be active.
    pub fn new(client: A, modem: M, config: Config) -> Self {
        Self {
            client: Mutex::new(client),
            modem,
            config,
            table: BlockingMutex::new(RefCell::new(SocketTable::new())),
            conditions: core::array::from_fn(|_| ConditionState::new()),
            dns_lock: Mutex::new(()),
            dns: DnsLatch::new(),
            cleanup_scheduled: Signal::new(),
        }
    }

    /// Opens a TCP connection to the given remote and waits until the modem confirmed it
    pub async fn connect_tcp(&self, remote: SocketAddr) -> Result<TcpSocket<'_, A, M>, Error> {
        self.ensure_context_active().await?;

        // Socket needs to be registered before sending the open command, as the URC may arrive at any time
        let socket = self.allocate_id()?;
        let command = OpenCommand::tcp(self.config.context_id, socket.id, remote);

        if let Err(error) = self.send_command(&command).await {
            self.free(socket.id);
            return Err(error);
        }

        let mut connection = TcpSocket::new(self, socket, remote);
        if let Err(error) = self.await_connected(&connection).await {
            let code = match &error {
                Error::ConnectFailed(code) => *code,
                _ => OPERATION_TIMEOUT,
            };
            self.latch_error(&connection.socket, code);

            if let Err(close_error) = connection.close_ref().await {
                log::debug!("[{}] Closing failed connection failed: {:?}", connection.socket.id, close_error);
            }

            return Err(error);
        }

        log::debug!("[{}] Connected to {}", connection.socket.id, remote);
        Ok(connection)
    }

    /// Resolves the hostname and opens a TCP connection
    pub async fn connect_tcp_host(&self, host: &str, port: u16) -> Result<TcpSocket<'_, A, M>, Error> {
        let address = self.resolve(host).await?;
        self.connect_tcp(SocketAddr::new(address, port)).await
    }

    /// Opens a UDP socket on the given local port. If no port is given, a free one is picked.
    pub async fn open_udp(&self, local_port: Option<u16>) -> Result<UdpSocket<'_, A, M>, Error> {
        self.ensure_context_active().await?;

        let (socket, local_port) = self.allocate_udp(local_port)?;
        let command = OpenCommand::udp_service(self.config.context_id, socket.id, local_port);

        if let Err(error) = self.send_command(&command).await {
            self.free(socket.id);
            return Err(error);
        }

        self.activate(socket.id);
        log::debug!("[{}] UDP socket bound to port {}", socket.id, local_port);
        Ok(UdpSocket::new(self, socket, local_port))
    }

    /// Routes a single URC message to the owning socket or the outstanding DNS query
    pub fn handle_urc(&self, message: Urc) {
        match message {
            Urc::Opened(id, result) => self.handle_opened(id, result),
            Urc::Notification(Notification::DnsResult { error, count }) => self.dns.handle_result(error, count),
            Urc::Notification(Notification::DnsAddress(address)) => self.dns.handle_address(address),
            Urc::Notification(Notification::DataAvailable(id)) => {
                if self.is_registered(id) {
                    self.conditions[id].set(Condition::READ_READY);
                }
            }
            Urc::Notification(Notification::Closed(id)) => {
                if self.is_registered(id) {
                    log::debug!("[{}] Socket closed by modem", id);
                    self.close_wait(id);
                }
            }
            Urc::Notification(Notification::PdpDeactivated(context_id)) => self.handle_pdp_deactivated(context_id),
            Urc::Notification(Notification::Unknown) | Urc::Unknown => {}
        }
    }

    /// Handles the open result of the given socket
    fn handle_opened(&self, id: usize, result: u16) {
        if !self.is_registered(id) {
            return;
        }

        let latched_error = self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[id];
            if result != 0 {
                slot.latched_error = Some(result);
            }

            slot.latched_error
        });

        match (result, latched_error) {
            (0, None) => {
                self.activate(id);
                self.conditions[id].set(Condition::CONNECTED);
            }
            (0, Some(code)) => {
                log::warn!("[{}] Late open confirmation of aborted connection (error {})", id, code);
                self.close_wait(id);
            }
            _ => {
                log::warn!("[{}] Opening socket failed with error {}", id, result);
                self.close_wait(id);
            }
        }
    }

    /// Marks all sockets of the deactivated context for PDP deactivation and closes them
    fn handle_pdp_deactivated(&self, context_id: u8) {
        if context_id != self.config.context_id {
            log::warn!("Ignoring deactivation of unknown PDP context {}", context_id);
            return;
        }

        log::warn!("PDP context {} deactivated by network", context_id);
        for id in 0..MAX_SOCKETS {
            let registered = self.table.lock(|table| {
                let slot = &mut table.borrow_mut().slots[id];
                if slot.state == SlotState::Free {
                    return false;
                }

                slot.pdp_deactivation = true;
                true
            });

            if registered {
                self.close_wait(id);
            }
        }
    }

    /// Returns true if the socket id is known. Unknown ids may occur on races with socket removal.
    fn is_registered(&self, id: usize) -> bool {
        let registered = id < MAX_SOCKETS && self.slot(id).state != SlotState::Free;

        if !registered {
            log::debug!("[{}] Dropping URC message of unknown socket", id);
        }

        registered
    }

    /// Waits for the open confirmation of the given connection
    async fn await_connected(&self, connection: &TcpSocket<'_, A, M>) -> Result<(), Error> {
        let condition = &self.conditions[connection.socket.id];
        let bits = with_timeout(self.config.open_timeout, condition.wait(Condition::CONNECTED))
            .await
            .map_err(|_| Error::Timeout)?;

        if bits.contains(Condition::CLOSED) {
            let code = self.slot(connection.socket.id).latched_error.unwrap_or(0);
            return Err(Error::ConnectFailed(code));
        }

        Ok(())
    }

    /// Activates the PDP context if it was deactivated after a network side deactivation
    async fn ensure_context_active(&self) -> Result<(), Error> {
        if self.table.lock(|table| table.borrow().context_active) {
            return Ok(());
        }

        let mut client = self.client.lock().await;

        // Activated by a concurrent open in the meantime
        if self.table.lock(|table| table.borrow().context_active) {
            return Ok(());
        }

        log::debug!("Activating PDP context {}", self.config.context_id);
        Self::exchange(&mut client, &ActivateContextCommand::new(self.config.context_id)).await?;
        self.table.lock(|table| table.borrow_mut().context_active = true);
        Ok(())
    }
}

impl<A: AtatClient, M: ModemState> TcpConnect for Adapter<A, M> {
    type Error = Error;

    type Connection<'a> = TcpSocket<'a, A, M>
        where
            Self: 'a;

    async fn connect<'a>(&'a self, remote: SocketAddr) -> Result<Self::Connection<'a>, Self::Error> {
        self.connect_tcp(remote).await
    }
}

/// Drives URC dispatching and the deferred cleanup of remotely closed sockets
pub struct Runner<'a, 'urc_sub, A: AtatClient, M: ModemState, const URC_CAPACITY: usize> {
    adapter: &'a Adapter<A, M>,

    /// URC message subscriber
    urc_subscription: UrcSubscription<'urc_sub, Urc, URC_CAPACITY, 1>,
}

impl<'a, 'urc_sub, A: AtatClient, M: ModemState, const URC_CAPACITY: usize> Runner<'a, 'urc_sub, A, M, URC_CAPACITY> {
    pub fn new(adapter: &'a Adapter<A, M>, urc_subscription: UrcSubscription<'urc_sub, Urc, URC_CAPACITY, 1>) -> Self {
        Self {
            adapter,
            urc_subscription,
        }
    }

    /// Processes URC messages and pending cleanups forever
    pub async fn run(&mut self) -> ! {
        loop {
            let deadline = self.adapter.next_cleanup_deadline();
            let cleanup = async {
                match deadline {
                    Some(deadline) => Timer::at(deadline).await,
                    None => pending().await,
                }
            };

            match select3(
                self.urc_subscription.next_message_pure(),
                cleanup,
                self.adapter.cleanup_scheduled.wait(),
            )
            .await
            {
                Either3::First(message) => self.adapter.handle_urc(message),
                Either3::Second(_) => self.adapter.cleanup_expired().await,
                // Deadline gets recalculated
                Either3::Third(_) => {}
            }
        }
    }

    /// Processes all pending URC messages without blocking
    pub fn process_urc_messages(&mut self) {
        while let Some(message) = self.urc_subscription.try_next_message_pure() {
            self.adapter.handle_urc(message);
        }
    }
}
