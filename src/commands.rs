use crate::responses::{ErrorReport, NoResponse, ReadData, SocketStateReport, MAX_READ_LENGTH};
use crate::tcp::MTU;
use atat::atat_derive::AtatCmd;
use atat::heapless::String;
use atat::{AtatCmd, Error as AtError, InternalError};
use core::fmt::Write;
use core::net::{IpAddr, SocketAddr};

/// Service type of TCP client sockets
const SERVICE_TCP: &str = "TCP";

/// Service type of UDP sockets able to send to and receive from any remote
const SERVICE_UDP: &str = "UDP SERVICE";

/// Access mode in which the modem buffers received data until read by QIRD
const BUFFER_ACCESS_MODE: u8 = 0;

/// Opens a socket. Result is confirmed asynchronously by `+QIOPEN` URC.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIOPEN", NoResponse, timeout_ms = 5_000, attempts = 1)]
pub struct OpenCommand {
    /// PDP context ID
    #[at_arg(position = 0)]
    context_id: u8,

    /// Socket ID
    #[at_arg(position = 1)]
    connect_id: usize,

    /// Service type, e.g. TCP or UDP SERVICE
    #[at_arg(position = 2)]
    service_type: String<16>,

    /// Remote IPv4 or IPv6 address
    #[at_arg(position = 3)]
    remote_host: String<39>,

    /// Remote port, 0 for UDP service
    #[at_arg(position = 4)]
    remote_port: u16,

    /// Local port, 0 => assigned by modem
    #[at_arg(position = 5)]
    local_port: u16,

    /// Data access mode
    #[at_arg(position = 6)]
    access_mode: u8,
}

impl OpenCommand {
    /// Opens a TCP client connection
    pub fn tcp(context_id: u8, connect_id: usize, remote: SocketAddr) -> Self {
        Self {
            context_id,
            connect_id,
            service_type: service(SERVICE_TCP),
            remote_host: ip_string(remote.ip()),
            remote_port: remote.port(),
            local_port: 0,
            access_mode: BUFFER_ACCESS_MODE,
        }
    }

    /// Opens a UDP service socket bound to the given local port
    pub fn udp_service(context_id: u8, connect_id: usize, local_port: u16) -> Self {
        Self {
            context_id,
            connect_id,
            service_type: service(SERVICE_UDP),
            remote_host: ip_string(IpAddr::from([127, 0, 0, 1])),
            remote_port: 0,
            local_port,
            access_mode: BUFFER_ACCESS_MODE,
        }
    }
}

/// Closes the given socket
#[derive(Clone, AtatCmd)]
#[at_cmd("+QICLOSE", NoResponse, timeout_ms = 10_000, attempts = 1)]
pub struct CloseCommand {
    #[at_arg(position = 0)]
    connect_id: usize,
}

impl CloseCommand {
    pub fn new(connect_id: usize) -> Self {
        Self { connect_id }
    }
}

/// Activates the PDP context
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIACT", NoResponse, timeout_ms = 150_000, attempts = 1)]
pub struct ActivateContextCommand {
    #[at_arg(position = 0)]
    context_id: u8,
}

impl ActivateContextCommand {
    pub fn new(context_id: u8) -> Self {
        Self { context_id }
    }
}

/// Deactivates the PDP context
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDEACT", NoResponse, timeout_ms = 40_000, attempts = 1)]
pub struct DeactivateContextCommand {
    #[at_arg(position = 0)]
    context_id: u8,
}

impl DeactivateContextCommand {
    pub fn new(context_id: u8) -> Self {
        Self { context_id }
    }
}

/// Starts a DNS query. Result is reported by `+QIURC: "dnsgip"` URC messages.
#[derive(Clone, AtatCmd)]
#[at_cmd("+QIDNSGIP", NoResponse, timeout_ms = 1_000, attempts = 1)]
pub struct DnsQueryCommand {
    #[at_arg(position = 0)]
    context_id: u8,

    #[at_arg(position = 1)]
    hostname: String<255>,
}

impl DnsQueryCommand {
    pub fn new(context_id: u8, hostname: String<255>) -> Self {
        Self { context_id, hostname }
    }
}

/// Announces data transmission on a connected socket
#[derive(Clone, AtatCmd)]
#[at_cmd("+QISEND", NoResponse, timeout_ms = 1_000, attempts = 1)]
pub struct TransmissionPrepareCommand {
    #[at_arg(position = 0)]
    connect_id: usize,

    #[at_arg(position = 1)]
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(connect_id: usize, length: usize) -> Self {
        Self { connect_id, length }
    }
}

/// Announces data transmission to the given remote on a UDP service socket
#[derive(Clone, AtatCmd)]
#[at_cmd("+QISEND", NoResponse, timeout_ms = 1_000, attempts = 1)]
pub struct TransmissionPrepareToCommand {
    #[at_arg(position = 0)]
    connect_id: usize,

    #[at_arg(position = 1)]
    length: usize,

    #[at_arg(position = 2)]
    remote_host: String<39>,

    #[at_arg(position = 3)]
    remote_port: u16,
}

impl TransmissionPrepareToCommand {
    pub fn new(connect_id: usize, length: usize, remote: SocketAddr) -> Self {
        Self {
            connect_id,
            length,
            remote_host: ip_string(remote.ip()),
            remote_port: remote.port(),
        }
    }
}

/// Raw payload following the QISEND prompt
#[derive(Clone)]
pub struct TransmissionCommand<'a> {
    data: &'a [u8],
}

impl<'a> TransmissionCommand<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl AtatCmd for TransmissionCommand<'_> {
    type Response = NoResponse;
    const MAX_LEN: usize = MTU;
    const MAX_TIMEOUT_MS: u32 = 5_000;

    fn write(&self, buf: &mut [u8]) -> usize {
        buf[..self.data.len()].copy_from_slice(self.data);
        self.data.len()
    }

    fn parse(&self, resp: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        match resp {
            // Send buffer of the modem is full
            Ok(response) if response.windows(9).any(|window| window == b"SEND FAIL") => Err(AtError::Error),
            Ok(_) => Ok(NoResponse),
            Err(error) => Err(error.into()),
        }
    }
}

/// Reads buffered data of the given socket
#[derive(Clone)]
pub struct ReceiveDataCommand {
    connect_id: usize,
    length: usize,
}

impl ReceiveDataCommand {
    pub fn new(connect_id: usize, length: usize) -> Self {
        Self {
            connect_id,
            length: length.min(MAX_READ_LENGTH),
        }
    }
}

impl AtatCmd for ReceiveDataCommand {
    type Response = ReadData;
    const MAX_LEN: usize = 24;
    const MAX_TIMEOUT_MS: u32 = 1_000;

    fn write(&self, buf: &mut [u8]) -> usize {
        write_command::<{ ReceiveDataCommand::MAX_LEN }>(
            buf,
            format_args!("AT+QIRD={},{}\r\n", self.connect_id, self.length),
        )
    }

    fn parse(&self, resp: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        ReadData::parse(resp?).ok_or(AtError::Parse)
    }
}

/// Queries the result code of the last failed TCP/IP command
#[derive(Clone, Default)]
pub struct ErrorQueryCommand;

impl AtatCmd for ErrorQueryCommand {
    type Response = ErrorReport;
    const MAX_LEN: usize = 16;
    const MAX_TIMEOUT_MS: u32 = 300;

    fn write(&self, buf: &mut [u8]) -> usize {
        write_command::<{ ErrorQueryCommand::MAX_LEN }>(buf, format_args!("AT+QIGETERROR\r\n"))
    }

    fn parse(&self, resp: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        ErrorReport::parse(resp?).ok_or(AtError::Parse)
    }
}

/// Queries the state of the given socket
#[derive(Clone)]
pub struct SocketStateCommand {
    connect_id: usize,
}

impl SocketStateCommand {
    pub fn new(connect_id: usize) -> Self {
        Self { connect_id }
    }
}

impl AtatCmd for SocketStateCommand {
    type Response = SocketStateReport;
    const MAX_LEN: usize = 20;
    const MAX_TIMEOUT_MS: u32 = 300;

    fn write(&self, buf: &mut [u8]) -> usize {
        write_command::<{ SocketStateCommand::MAX_LEN }>(
            buf,
            format_args!("AT+QISTATE=1,{}\r\n", self.connect_id),
        )
    }

    fn parse(&self, resp: Result<&[u8], InternalError>) -> Result<Self::Response, AtError> {
        SocketStateReport::parse(resp?).ok_or(AtError::Parse)
    }
}

/// Formats the command into the given buffer and returns the written length. `N` is the max. command length.
pub(crate) fn write_command<const N: usize>(buf: &mut [u8], args: core::fmt::Arguments) -> usize {
    let mut command: String<N> = String::new();
    let result = command.write_fmt(args);
    debug_assert!(result.is_ok(), "AT command exceeds {} bytes", N);

    buf[..command.len()].copy_from_slice(command.as_bytes());
    command.len()
}

fn ip_string(address: IpAddr) -> String<39> {
    let mut string = String::new();
    let _ = write!(string, "{}", address);
    string
}

fn service(name: &str) -> String<16> {
    let mut string = String::new();
    let _ = string.push_str(name);
    string
}
