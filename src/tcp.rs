//! # TCP client connections
//!
//! [TcpSocket] is created by [Adapter::connect_tcp](crate::Adapter::connect_tcp) and implements the
//! [embedded_io_async] traits, so it may be used by any protocol crate built on top of them.
//!
//! Data gets buffered by the modem and is fetched on demand by `AT+QIRD`. A read blocks until data
//! is available or the socket is closed, in which case zero bytes (EOF) are returned.
use crate::adapter::Adapter;
use crate::commands::SocketStateCommand;
use crate::condition::Condition;
use crate::modem::ModemState;
use crate::stack::{Error, Socket};
use atat::asynch::AtatClient;
use core::net::SocketAddr;
use embassy_futures::yield_now;
use embassy_time::Timer;

/// Max. payload length of a single transmission
pub const MTU: usize = 1460;

/// TCP connection
pub struct TcpSocket<'a, A: AtatClient, M: ModemState> {
    pub(crate) socket: Socket,
    adapter: &'a Adapter<A, M>,
    remote: SocketAddr,
}

impl<'a, A: AtatClient, M: ModemState> TcpSocket<'a, A, M> {
    pub(crate) fn new(adapter: &'a Adapter<A, M>, socket: Socket, remote: SocketAddr) -> Self {
        Self {
            socket,
            adapter,
            remote,
        }
    }

    /// Reads available data into the buffer. Returns zero if the connection was closed.
    ///
    /// Blocks until data arrives, unless a read timeout is configured.
    pub async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let received = self
            .adapter
            .receive(&self.socket, buffer, self.adapter.config.read_timeout)
            .await?;

        Ok(received.map(|data| data.data.len()).unwrap_or(0))
    }

    /// Sends up to [MTU] bytes and returns the number of bytes accepted by the modem
    ///
    /// Returns zero if the send buffer of the modem is full, after pausing for the configured backoff.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let data = &data[..data.len().min(MTU)];

        if data.is_empty() {
            return Ok(0);
        }

        if self.adapter.is_closed(&self.socket) {
            return Err(Error::SocketClosed);
        }

        // Gives the URC dispatcher a chance to process pending close notifications
        yield_now().await;

        match self.adapter.transmit(&self.socket, None, data).await {
            Ok(_) => Ok(data.len()),
            Err(Error::Unavailable(error)) => {
                log::debug!("[{}] Modem rejected data: {:?}", self.socket.id, error);
                Timer::after(self.adapter.config.write_backoff).await;
                Ok(0)
            }
            Err(error) => Err(error),
        }
    }

    /// Closes the connection and releases the socket id
    pub async fn close(mut self) -> Result<(), Error> {
        self.close_ref().await
    }

    pub(crate) async fn close_ref(&mut self) -> Result<(), Error> {
        self.adapter.close_socket(&self.socket).await
    }

    /// Half close is not offered by the modem
    pub fn close_write(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    /// Returns true if the connection was closed locally or by the modem
    pub fn is_closed(&self) -> bool {
        self.adapter.is_closed(&self.socket)
    }

    /// Returns true if the modem signaled buffered data
    pub fn is_data_available(&self) -> bool {
        self.adapter.conditions[self.socket.id]
            .bits()
            .contains(Condition::READ_READY)
    }

    /// Max. payload length of a single write
    pub fn mtu(&self) -> usize {
        MTU
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Queries the local port assigned by the modem
    pub async fn local_port(&self) -> Result<u16, Error> {
        let report = self
            .adapter
            .guarded(&self.socket, &SocketStateCommand::new(self.socket.id))
            .await?;

        if report.connect_id != self.socket.id {
            return Err(Error::InvalidResponse);
        }

        Ok(report.local_port)
    }

    /// Socket id used by the modem
    pub fn id(&self) -> usize {
        self.socket.id
    }
}

impl<A: AtatClient, M: ModemState> embedded_io::ErrorType for TcpSocket<'_, A, M> {
    type Error = Error;
}

impl<A: AtatClient, M: ModemState> embedded_io_async::Read for TcpSocket<'_, A, M> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        TcpSocket::read(self, buf).await
    }
}

impl<A: AtatClient, M: ModemState> embedded_io_async::Write for TcpSocket<'_, A, M> {
    /// Retries while the modem rejects data, as zero length writes signal EOF to generic callers
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        loop {
            let length = TcpSocket::write(self, buf).await?;

            if length > 0 || buf.is_empty() {
                return Ok(length);
            }
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
