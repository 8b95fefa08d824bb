//! # Socket engine
//!
//! Shared socket lifecycle of [TcpSocket](crate::tcp::TcpSocket) and [UdpSocket](crate::udp::UdpSocket):
//! the socket id table, the guarded command execution including error classification and both
//! close paths (local close and remote close).
//!
//! Every command touching a socket holds the AT channel exclusively for the full exchange. If a
//! command fails, the error of the last TCP/IP command is queried (`AT+QIGETERROR`) within the
//! same exclusive section and classified as either [Error::Unavailable] (transient, retry later)
//! or [Error::Unknown] (fatal for the operation).
use crate::adapter::Adapter;
use crate::commands::{
    CloseCommand, DeactivateContextCommand, ErrorQueryCommand, ReceiveDataCommand, TransmissionCommand,
    TransmissionPrepareCommand, TransmissionPrepareToCommand,
};
use crate::condition::Condition;
use crate::modem::ModemState;
use crate::responses::{ReadData, MAX_READ_LENGTH};
use atat::asynch::AtatClient;
use atat::{AtatCmd, Error as AtError};
use core::net::SocketAddr;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::MutexGuard;
use embassy_time::{with_timeout, Duration, Instant};
use heapless::String;

/// Number of socket contexts supported by the modem
pub const MAX_SOCKETS: usize = 12;

/// Result code: Operation successful
const NO_ERROR: u16 = 0;

/// Result code: Memory not enough
const MEMORY_NOT_ENOUGH: u16 = 553;

/// Result code: Socket has been closed
const SOCKET_CLOSED: u16 = 567;

/// Result code: Operation busy
const OPERATION_BUSY: u16 = 568;

/// Result code: Operation timeout
pub(crate) const OPERATION_TIMEOUT: u16 = 569;

/// Result code: Operation not allowed
const OPERATION_NOT_ALLOWED: u16 = 572;

/// Error code and description reported by the modem
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModemError {
    /// Numeric result code, e.g. 553
    pub code: u16,

    /// Description as reported by the modem, e.g. "memory not enough"
    pub message: String<64>,
}

impl ModemError {
    pub(crate) fn new(code: u16, message: String<64>) -> Self {
        Self { code, message }
    }

    /// Raised without consulting the modem if a socket is already known to be closed
    pub(crate) fn socket_closed() -> Self {
        let mut message = String::new();
        let _ = message.push_str("socket closed");
        Self::new(SOCKET_CLOSED, message)
    }
}

/// Network related errors
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Transient condition, e.g. modem busy, out of memory, operation not allowed in current state or socket
    /// already closed. Caller may retry later.
    Unavailable(ModemError),

    /// Modem reported an unrecognized error code. Fatal for the operation.
    Unknown(ModemError),

    /// Command failed and the error code could not be queried
    Protocol(AtError),

    /// Response of the modem could not be interpreted
    InvalidResponse,

    /// No socket available, since all hardware contexts are in use
    NoSocketAvailable,

    /// Modem did not signal the expected URC message in time
    Timeout,

    /// Operation is not offered by the modem
    Unsupported,

    /// Opening the connection was rejected by the modem with the given result code
    ConnectFailed(u16),

    /// DNS query failed with the given result code. 0 => Query succeeded without any address.
    DnsFailed(u16),

    /// Socket was closed
    SocketClosed,

    /// UDP socket has no destination address
    NotConnected,

    /// Payload exceeds the MTU
    PayloadTooLarge,

    /// Hostname is empty or too long
    InvalidHostname,

    /// Modem entered power saving mode while the connection was active
    PowerSaving,
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::Timeout => embedded_io::ErrorKind::TimedOut,
            Error::Unsupported => embedded_io::ErrorKind::Unsupported,
            Error::NoSocketAvailable => embedded_io::ErrorKind::OutOfMemory,
            Error::ConnectFailed(_) => embedded_io::ErrorKind::ConnectionRefused,
            Error::SocketClosed | Error::NotConnected => embedded_io::ErrorKind::NotConnected,
            Error::PowerSaving => embedded_io::ErrorKind::ConnectionAborted,
            Error::PayloadTooLarge | Error::InvalidHostname => embedded_io::ErrorKind::InvalidInput,
            Error::InvalidResponse => embedded_io::ErrorKind::InvalidData,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

/// Handle of a registered socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Socket {
    /// Socket id known to the modem
    pub(crate) id: usize,

    /// Generation of the slot at allocation time. Detects handles outliving their slot.
    pub(crate) generation: u32,
}

impl Socket {
    pub(crate) fn new(id: usize, generation: u32) -> Self {
        Self { id, generation }
    }
}

/// Lifecycle state of a socket slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Id may be (re)used
    Free,
    /// Registered, open command sent
    Opening,
    /// Open confirmed
    Active,
    /// Closed locally, close commands in progress
    Closing,
    /// Closed by URC message, id gets released at the given instant
    RemoteClosing(Instant),
}

/// Internal state of a single socket id
#[derive(Copy, Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) state: SlotState,

    pub(crate) generation: u32,

    /// Result code of a failed open
    pub(crate) latched_error: Option<u16>,

    /// PDP context needs to be deactivated when closing
    pub(crate) pdp_deactivation: bool,

    /// Local port of UDP service sockets
    pub(crate) local_port: u16,
}

impl Slot {
    const FREE: Self = Self {
        state: SlotState::Free,
        generation: 0,
        latched_error: None,
        pdp_deactivation: false,
        local_port: 0,
    };

    /// True if the public handle may still use the socket id
    fn is_live(&self) -> bool {
        matches!(self.state, SlotState::Opening | SlotState::Active)
    }
}

/// Socket id table, array index = socket id
pub(crate) struct SocketTable {
    pub(crate) slots: [Slot; MAX_SOCKETS],

    /// Next candidate for automatic UDP port assignment
    pub(crate) next_port: u16,

    /// False if the PDP context was deactivated and needs to be activated before opening the next socket
    pub(crate) context_active: bool,
}

impl SocketTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: [Slot::FREE; MAX_SOCKETS],
            next_port: EPHEMERAL_PORT_MIN,
            context_active: true,
        }
    }

    /// Picks the next local port not used by any registered socket, cycling through the ephemeral range.
    /// Returns 0 (=> assigned by modem) in case no port is available.
    pub(crate) fn allocate_port(&mut self) -> u16 {
        for _ in EPHEMERAL_PORT_MIN..=EPHEMERAL_PORT_MAX {
            let port = self.next_port;
            self.next_port = if port == EPHEMERAL_PORT_MAX {
                EPHEMERAL_PORT_MIN
            } else {
                port + 1
            };

            let used = self
                .slots
                .iter()
                .any(|slot| slot.state != SlotState::Free && slot.local_port == port);

            if !used {
                return port;
            }
        }

        0
    }
}

/// First port of automatic UDP port assignment
const EPHEMERAL_PORT_MIN: u16 = 49152;

/// Last port of automatic UDP port assignment
const EPHEMERAL_PORT_MAX: u16 = 65535;

impl<A: AtatClient, M: ModemState> Adapter<A, M> {
    /// Assigns the first free socket id and registers it as opening
    pub(crate) fn allocate_id(&self) -> Result<Socket, Error> {
        let (socket, _) = self.register(|_| 0)?;
        Ok(socket)
    }

    /// Registers a UDP socket on the requested local port or on the next free port if none was requested
    pub(crate) fn allocate_udp(&self, local_port: Option<u16>) -> Result<(Socket, u16), Error> {
        self.register(|table| local_port.unwrap_or_else(|| table.allocate_port()))
    }

    /// Registers the first free socket id. Port assignment happens atomically with the registration.
    fn register<F: FnOnce(&mut SocketTable) -> u16>(&self, port: F) -> Result<(Socket, u16), Error> {
        let (socket, local_port) = self
            .table
            .lock(|table| {
                let mut table = table.borrow_mut();
                let id = table.slots.iter().position(|slot| slot.state == SlotState::Free)?;
                let local_port = port(&mut table);

                let slot = &mut table.slots[id];
                slot.generation = slot.generation.wrapping_add(1);
                slot.state = SlotState::Opening;
                slot.latched_error = None;
                slot.pdp_deactivation = false;
                slot.local_port = local_port;

                Some((Socket::new(id, slot.generation), local_port))
            })
            .ok_or(Error::NoSocketAvailable)?;

        self.conditions[socket.id].reset();
        Ok((socket, local_port))
    }

    /// Releases the socket id for reuse
    pub(crate) fn free(&self, id: usize) {
        self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[id];
            slot.state = SlotState::Free;
            slot.local_port = 0;
        });
    }

    /// Returns a copy of the slot state
    pub(crate) fn slot(&self, id: usize) -> Slot {
        self.table.lock(|table| table.borrow().slots[id])
    }

    /// True if the handle still refers to an opening or active socket
    pub(crate) fn is_live(&self, socket: &Socket) -> bool {
        let slot = self.slot(socket.id);
        slot.generation == socket.generation && slot.is_live()
    }

    /// True if the socket was closed or the handle outlived its slot
    pub(crate) fn is_closed(&self, socket: &Socket) -> bool {
        self.slot(socket.id).generation != socket.generation
            || self.conditions[socket.id].bits().contains(Condition::CLOSED)
    }

    /// Marks the slot as active if it is still opening
    pub(crate) fn activate(&self, id: usize) {
        self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[id];
            if slot.state == SlotState::Opening {
                slot.state = SlotState::Active;
            }
        });
    }

    /// Stores the result code of a failed open
    pub(crate) fn latch_error(&self, socket: &Socket, code: u16) {
        self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[socket.id];
            if slot.generation == socket.generation {
                slot.latched_error = Some(code);
            }
        });
    }

    /// Sends a command without socket relation
    pub(crate) async fn send_command<Cmd: AtatCmd>(&self, command: &Cmd) -> Result<Cmd::Response, Error> {
        let mut client = self.client.lock().await;
        Self::exchange(&mut client, command).await
    }

    /// Sends a command on behalf of the given socket. Fails immediately without touching the modem, if the
    /// socket is already known to be closed.
    pub(crate) async fn guarded<Cmd: AtatCmd>(&self, socket: &Socket, command: &Cmd) -> Result<Cmd::Response, Error> {
        let mut client = self.lock_live(socket).await?;
        Self::exchange(&mut client, command).await
    }

    /// Sends the payload, either to the connected remote or to the given one (UDP service).
    /// Prompt and payload are sent within the same exclusive section.
    pub(crate) async fn transmit(&self, socket: &Socket, remote: Option<SocketAddr>, data: &[u8]) -> Result<(), Error> {
        let mut client = self.lock_live(socket).await?;

        match remote {
            Some(remote) => {
                Self::exchange(&mut client, &TransmissionPrepareToCommand::new(socket.id, data.len(), remote)).await?
            }
            None => Self::exchange(&mut client, &TransmissionPrepareCommand::new(socket.id, data.len())).await?,
        };

        Self::exchange(&mut client, &TransmissionCommand::new(data)).await?;
        Ok(())
    }

    /// Waits until data is available and reads it into the given buffer. Returns None if the socket got closed.
    ///
    /// The timeout just limits waiting for the data notification. Once the read command is sent, its response
    /// is awaited in any case, as the modem already dropped the data from its buffer.
    pub(crate) async fn receive(
        &self,
        socket: &Socket,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Option<ReadData>, Error> {
        // Handle outlived its slot, which was closed in the meantime
        if self.slot(socket.id).generation != socket.generation {
            return Ok(None);
        }

        let condition = &self.conditions[socket.id];

        loop {
            let bits = match timeout {
                Some(timeout) => with_timeout(timeout, condition.wait(Condition::READ_READY))
                    .await
                    .map_err(|_| Error::Timeout)?,
                None => condition.wait(Condition::READ_READY).await,
            };

            if bits.contains(Condition::CLOSED) {
                if self.modem.is_power_saving() {
                    log::error!("[{}] Modem entered power saving mode while connection was active", socket.id);
                    return Err(Error::PowerSaving);
                }

                return Ok(None);
            }

            let length = buffer.len().min(MAX_READ_LENGTH);
            let response = self.guarded(socket, &ReceiveDataCommand::new(socket.id, length)).await?;

            // Buffered data was already consumed by a previous read
            if response.data.is_empty() {
                condition.clear(Condition::READ_READY);
                continue;
            }

            if response.data.len() > buffer.len() {
                return Err(Error::InvalidResponse);
            }

            buffer[..response.data.len()].copy_from_slice(&response.data);
            return Ok(Some(response));
        }
    }

    /// Closes the socket on request of the application
    ///
    /// Sockets already closed by the modem are released by the deferred cleanup, so nothing is done in this case.
    /// The socket id is released in any case, even if one of the close commands failed.
    pub(crate) async fn close_socket(&self, socket: &Socket) -> Result<(), Error> {
        let closing = self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[socket.id];
            if slot.generation != socket.generation || !slot.is_live() {
                return false;
            }

            slot.state = SlotState::Closing;
            true
        });

        if !closing {
            return Ok(());
        }

        self.conditions[socket.id].set(Condition::CLOSED);

        let result = self.release(socket.id).await;
        self.free(socket.id);
        result
    }

    /// Closes the socket on behalf of an URC message
    ///
    /// Blocked readers are woken up immediately and the id is detached from public use. The close command is sent
    /// after the grace period by [Adapter::cleanup_expired], as the modem may still be settling its state.
    pub(crate) fn close_wait(&self, id: usize) {
        let deadline = Instant::now() + self.config.close_grace_period;

        let detached = self.table.lock(|table| {
            let slot = &mut table.borrow_mut().slots[id];
            if !slot.is_live() {
                return false;
            }

            slot.state = SlotState::RemoteClosing(deadline);
            true
        });

        if detached {
            self.cleanup_scheduled.signal(());
        } else {
            log::debug!("[{}] Socket is already closing", id);
        }

        self.conditions[id].set(Condition::CLOSED);
    }

    /// Returns the earliest deadline of pending remote close cleanups
    pub(crate) fn next_cleanup_deadline(&self) -> Option<Instant> {
        self.table.lock(|table| {
            table
                .borrow()
                .slots
                .iter()
                .filter_map(|slot| match slot.state {
                    SlotState::RemoteClosing(deadline) => Some(deadline),
                    _ => None,
                })
                .min()
        })
    }

    /// Sends the close command for all remotely closed sockets whose grace period has elapsed and releases them
    pub(crate) async fn cleanup_expired(&self) {
        let now = Instant::now();

        for id in 0..MAX_SOCKETS {
            let slot = self.slot(id);
            let SlotState::RemoteClosing(deadline) = slot.state else {
                continue;
            };

            if deadline > now {
                continue;
            }

            if let Err(error) = self.release(id).await {
                log::debug!("[{}] Ignoring close error after remote close: {:?}", id, error);
            }

            self.free(id);
        }
    }

    /// Deactivates the PDP context if requested and closes the socket on modem side.
    /// Returns the result of the close command, errors of the context deactivation are just logged.
    async fn release(&self, id: usize) -> Result<(), Error> {
        if !self.modem.is_session_open() {
            log::debug!("[{}] AT session is down, skipping close command", id);
            return Ok(());
        }

        self.deactivate_context(id).await;

        self.send_command(&CloseCommand::new(id)).await?;
        Ok(())
    }

    /// Deactivates the PDP context once per network side deactivation
    ///
    /// Decision and command share the exclusive section, so a context activation of a concurrent open is
    /// never followed by a stale deactivation.
    async fn deactivate_context(&self, id: usize) {
        let mut client = self.client.lock().await;

        let requested = self.table.lock(|table| {
            let table = table.borrow();
            table.context_active && table.slots[id].pdp_deactivation
        });

        if !requested {
            return;
        }

        match Self::exchange(&mut client, &DeactivateContextCommand::new(self.config.context_id)).await {
            Ok(_) => self.table.lock(|table| {
                let mut table = table.borrow_mut();
                table.context_active = false;
                table.slots.iter_mut().for_each(|slot| slot.pdp_deactivation = false);
            }),
            Err(error) => log::warn!("[{}] PDP context deactivation failed: {:?}", id, error),
        }
    }

    /// Acquires the AT channel if the socket is still usable
    async fn lock_live(&self, socket: &Socket) -> Result<MutexGuard<'_, CriticalSectionRawMutex, A>, Error> {
        let client = self.client.lock().await;

        if !self.is_live(socket) {
            return Err(Error::Unavailable(ModemError::socket_closed()));
        }

        Ok(client)
    }

    /// Executes a single command and classifies a failure
    pub(crate) async fn exchange<Cmd: AtatCmd>(client: &mut A, command: &Cmd) -> Result<Cmd::Response, Error> {
        match client.send(command).await {
            Ok(response) => Ok(response),
            Err(error) => Err(Self::classify(client, error).await),
        }
    }

    /// Queries the result code of the failed command and maps it to either a transient or fatal error
    async fn classify(client: &mut A, error: AtError) -> Error {
        let report = match client.send(&ErrorQueryCommand).await {
            Ok(report) => report,
            Err(query_error) => {
                log::warn!("Querying command error failed: {:?}", query_error);
                return Error::Protocol(error);
            }
        };

        let modem_error = ModemError::new(report.code, report.message);
        match modem_error.code {
            NO_ERROR | MEMORY_NOT_ENOUGH | OPERATION_BUSY | OPERATION_NOT_ALLOWED => {
                log::debug!("Command failed temporarily: {:?}", modem_error);
                Error::Unavailable(modem_error)
            }
            _ => {
                log::warn!("Command failed: {:?}", modem_error);
                Error::Unknown(modem_error)
            }
        }
    }
}
