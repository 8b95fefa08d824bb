//! # UDP sockets
//!
//! UDP sockets are opened in service mode, so the same socket may exchange datagrams with any remote.
//! [UdpSocket::connect] just stores a default destination used by [UdpSocket::send].
use crate::adapter::Adapter;
use crate::modem::ModemState;
use crate::stack::{Error, Socket};
use crate::tcp::MTU;
use atat::asynch::AtatClient;
use core::net::SocketAddr;

/// UDP socket bound to a local port
pub struct UdpSocket<'a, A: AtatClient, M: ModemState> {
    socket: Socket,
    adapter: &'a Adapter<A, M>,
    local_port: u16,

    /// Default destination
    remote: Option<SocketAddr>,
}

impl<'a, A: AtatClient, M: ModemState> UdpSocket<'a, A, M> {
    pub(crate) fn new(adapter: &'a Adapter<A, M>, socket: Socket, local_port: u16) -> Self {
        Self {
            socket,
            adapter,
            local_port,
            remote: None,
        }
    }

    /// Sets the default destination. No data is exchanged with the remote.
    pub fn connect(&mut self, remote: SocketAddr) {
        self.remote = Some(remote);
    }

    /// Sends a datagram to the default destination and returns the number of bytes sent
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        let remote = self.remote.ok_or(Error::NotConnected)?;
        self.send_to(remote, data).await
    }

    /// Sends a datagram to the given remote. Datagrams are never fragmented.
    pub async fn send_to(&mut self, remote: SocketAddr, data: &[u8]) -> Result<usize, Error> {
        if data.len() > MTU {
            return Err(Error::PayloadTooLarge);
        }

        if self.adapter.is_closed(&self.socket) {
            return Err(Error::SocketClosed);
        }

        self.adapter.transmit(&self.socket, Some(remote), data).await?;
        Ok(data.len())
    }

    /// Waits for the next datagram and returns its length and sender
    ///
    /// Returns `None` if the socket was closed. Datagrams exceeding the buffer are truncated.
    /// Fails with [Error::Timeout] if the configured read timeout elapsed without any datagram.
    pub async fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, Error> {
        let timeout = self.adapter.config.read_timeout;
        let Some(received) = self.adapter.receive(&self.socket, buffer, timeout).await? else {
            return Ok(None);
        };

        let remote = received.remote.ok_or(Error::InvalidResponse)?;
        Ok(Some((received.data.len(), remote)))
    }

    /// Broadcasting is not offered by the modem
    pub fn set_broadcast(&mut self, _enabled: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    pub fn broadcast(&self) -> bool {
        false
    }

    /// Max. payload length of a single datagram
    pub fn mtu(&self) -> usize {
        MTU
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Default destination set by [UdpSocket::connect]
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Closes the socket and releases the socket id
    pub async fn close(self) -> Result<(), Error> {
        self.adapter.close_socket(&self.socket).await
    }

    /// Socket id used by the modem
    pub fn id(&self) -> usize {
        self.socket.id
    }
}
