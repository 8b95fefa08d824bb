use atat::digest::ParseError;
use atat::{AtatUrc, Parser};
use core::net::IpAddr;
use core::str::FromStr;

/// Prefix of socket open confirmations
const OPEN_PREFIX: &str = "+QIOPEN:";

/// Prefix of multiplexed TCP/IP notifications
const NOTIFICATION_PREFIX: &str = "+QIURC:";

/// URC definitions, needs to passed as generic of [AtDigester](atat::digest::AtDigester): `AtDigester<Urc>`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Urc {
    /// Result of a QIOPEN command: socket id and result code (0 => success)
    Opened(usize, u16),
    /// Multiplexed `+QIURC` notification
    Notification(Notification),
    /// Unknown URC message
    Unknown,
}

/// Sub-types of `+QIURC` notifications
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Modem buffers data for the given socket
    DataAvailable(usize),
    /// Socket was closed by the remote or the modem
    Closed(usize),
    /// The given PDP context was deactivated by the network
    PdpDeactivated(u8),
    /// First line of a DNS result
    DnsResult {
        /// Result code, 0 => success
        error: u16,
        /// Number of following address lines
        count: usize,
    },
    /// A resolved address. Follows a successful [Notification::DnsResult].
    DnsAddress(IpAddr),
    /// Unknown notification
    Unknown,
}

impl AtatUrc for Urc {
    type Response = Self;

    fn parse(resp: &[u8]) -> Option<Self::Response> {
        let line = core::str::from_utf8(resp).ok()?.trim();

        if let Some(arguments) = line.strip_prefix(OPEN_PREFIX) {
            let (connect_id, result) = arguments.split_once(',')?;
            return Some(Self::Opened(
                connect_id.trim().parse().ok()?,
                result.trim().parse().ok()?,
            ));
        }

        if let Some(notification) = line.strip_prefix(NOTIFICATION_PREFIX) {
            return Some(Self::Notification(Notification::parse(notification.trim())?));
        }

        Some(Self::Unknown)
    }
}

impl Notification {
    /// Parses the part following the `+QIURC:` prefix, e.g. `"closed",3`
    fn parse(notification: &str) -> Option<Self> {
        let (tag, arguments) = notification.split_once(',').unwrap_or((notification, ""));
        let mut arguments = arguments.split(',').map(str::trim);

        match tag.trim().trim_matches('"') {
            "recv" => Some(Self::DataAvailable(arguments.next()?.parse().ok()?)),
            "closed" => Some(Self::Closed(arguments.next()?.parse().ok()?)),
            "pdpdeact" => Some(Self::PdpDeactivated(arguments.next()?.parse().ok()?)),
            "dnsgip" => {
                let first = arguments.next()?;

                if first.starts_with('"') {
                    return Some(Self::DnsAddress(IpAddr::from_str(first.trim_matches('"')).ok()?));
                }

                let error = first.parse().ok()?;
                let count = match arguments.next() {
                    Some(count) if !count.is_empty() => count.parse().ok()?,
                    _ => 0,
                };

                Some(Self::DnsResult { error, count })
            }
            _ => Some(Self::Unknown),
        }
    }
}

impl Parser for Urc {
    fn parse(buf: &[u8]) -> Result<(&[u8], usize), ParseError> {
        let start = buf
            .iter()
            .position(|byte| *byte != b'\r' && *byte != b'\n')
            .ok_or(ParseError::Incomplete)?;
        let line = &buf[start..];

        let matches_prefix = |prefix: &str| {
            let prefix = prefix.as_bytes();
            if line.len() < prefix.len() {
                return prefix.starts_with(line);
            }

            line.starts_with(prefix)
        };

        if !matches_prefix(OPEN_PREFIX) && !matches_prefix(NOTIFICATION_PREFIX) {
            return Err(ParseError::NoMatch);
        }

        // Line does not end with CRLF yet
        let end = line
            .windows(2)
            .position(|window| window == b"\r\n")
            .ok_or(ParseError::Incomplete)?;

        let end = start + end + 2;
        Ok((&buf[start..end], end))
    }
}
