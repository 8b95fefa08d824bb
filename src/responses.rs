use atat::atat_derive::AtatResp;
use atat::heapless::{String, Vec};
use atat::AtatResp;
use core::net::{IpAddr, SocketAddr};
use core::str::FromStr;

/// Max. payload length requested by a single QIRD command
pub const MAX_READ_LENGTH: usize = 1500;

/// Commands which gets just responded by OK
#[derive(Clone, AtatResp)]
pub struct NoResponse;

/// Response of QIGETERROR command, e.g. `+QIGETERROR: 553,memory not enough`
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReport {
    /// Numeric result code of the last TCP/IP command
    pub code: u16,

    /// Description as reported by the modem
    pub message: String<64>,
}

impl AtatResp for ErrorReport {}

impl ErrorReport {
    pub(crate) fn parse(response: &[u8]) -> Option<Self> {
        let line = core::str::from_utf8(response).ok()?.trim();
        let (code, description) = line.strip_prefix("+QIGETERROR:")?.split_once(',')?;

        let mut message = String::new();
        for character in description.trim().chars() {
            if message.push(character).is_err() {
                break;
            }
        }

        Some(Self {
            code: code.trim().parse().ok()?,
            message,
        })
    }
}

/// Response of QIRD command
///
/// TCP: `+QIRD: <len>\r\n<data>`
/// UDP service: `+QIRD: <len>,"<remote_ip>",<remote_port>\r\n<data>`
#[derive(Clone, Debug, PartialEq)]
pub struct ReadData {
    /// Sender of the datagram. Just set for UDP service sockets.
    pub remote: Option<SocketAddr>,

    /// Received payload
    pub data: Vec<u8, MAX_READ_LENGTH>,
}

impl AtatResp for ReadData {}

impl ReadData {
    pub(crate) fn parse(response: &[u8]) -> Option<Self> {
        let start = response.windows(6).position(|window| window == b"+QIRD:")?;
        let response = &response[start + 6..];

        let (header, payload) = match response.windows(2).position(|window| window == b"\r\n") {
            Some(end) => (&response[..end], &response[end + 2..]),
            None => (response, &response[response.len()..]),
        };

        let header = core::str::from_utf8(header).ok()?;
        let mut fields = header.split(',');
        let length: usize = fields.next()?.trim().parse().ok()?;

        let remote = match fields.next() {
            Some(address) => {
                let address = IpAddr::from_str(address.trim().trim_matches('"')).ok()?;
                let port = fields.next()?.trim().parse().ok()?;
                Some(SocketAddr::new(address, port))
            }
            None => None,
        };

        if payload.len() < length || length > MAX_READ_LENGTH {
            return None;
        }

        Some(Self {
            remote,
            data: Vec::from_slice(&payload[..length]).ok()?,
        })
    }
}

/// Relevant parts of a QISTATE response
///
/// `+QISTATE: <id>,"<service_type>","<remote_ip>",<remote_port>,<local_port>,<state>,<context_id>,...`
#[derive(Clone, Debug, PartialEq)]
pub struct SocketStateReport {
    /// Socket id
    pub connect_id: usize,

    /// Local port assigned by the modem
    pub local_port: u16,

    /// Socket state, 2 => connected
    pub state: u8,
}

impl AtatResp for SocketStateReport {}

impl SocketStateReport {
    pub(crate) fn parse(response: &[u8]) -> Option<Self> {
        let line = core::str::from_utf8(response).ok()?.trim();
        let mut fields = line.strip_prefix("+QISTATE:")?.split(',').map(str::trim);

        let connect_id = fields.next()?.parse().ok()?;
        let mut fields = fields.skip(3);
        let local_port = fields.next()?.parse().ok()?;
        let state = fields.next()?.parse().ok()?;

        Some(Self {
            connect_id,
            local_port,
            state,
        })
    }
}
