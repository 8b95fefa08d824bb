//! # DNS resolution
//!
//! The modem reports DNS results asynchronously by URC messages, which carry no reference to the query.
//! Queries are therefore serialized: only one query is outstanding at any time and URC messages arriving
//! without an armed query are dropped.
//!
//! ````
//! # use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! # use embassy_sync::pubsub::PubSubChannel;
//! # use quectel_at_nal::example::{ExampleAtClient, ExampleModem};
//! # use quectel_at_nal::{Adapter, Config, Urc};
//! # use core::net::{IpAddr, Ipv4Addr};
//! #
//! # embassy_futures::block_on(async {
//! # let channel: PubSubChannel<CriticalSectionRawMutex, Urc, 8, 1, 1> = PubSubChannel::new();
//! # let adapter = Adapter::new(ExampleAtClient::init(&channel), ExampleModem::default(), Config::default());
//! // IP literals are returned without querying the modem
//! let address = adapter.resolve("10.0.0.1").await.unwrap();
//! assert_eq!(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), address);
//! # });
//! ````
use crate::adapter::Adapter;
use crate::commands::DnsQueryCommand;
use crate::modem::ModemState;
use crate::stack::Error;
use atat::asynch::AtatClient;
use core::cell::Cell;
use core::net::IpAddr;
use core::str::FromStr;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::with_timeout;
use embedded_nal_async::{AddrType, Dns};
use heapless::String;

/// Max. hostname length accepted by the modem
const MAX_HOSTNAME_LENGTH: usize = 255;

/// Progress of the outstanding DNS query
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DnsState {
    /// No query outstanding, URC messages get dropped
    Idle,
    /// Query sent, waiting for the result line
    Pending,
    /// Result line received, waiting for the first address line
    Receiving,
    /// Result was delivered, further address lines get dropped
    Resolved,
}

/// One-shot result slot of the outstanding DNS query
pub(crate) struct DnsLatch {
    state: Mutex<CriticalSectionRawMutex, Cell<DnsState>>,
    result: Signal<CriticalSectionRawMutex, Result<IpAddr, Error>>,
}

impl DnsLatch {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(DnsState::Idle)),
            result: Signal::new(),
        }
    }

    /// Prepares the latch for a new query
    pub(crate) fn arm(&self) {
        self.result.reset();
        self.state.lock(|state| state.set(DnsState::Pending));
    }

    /// Drops any late results of the finished query
    pub(crate) fn disarm(&self) {
        self.state.lock(|state| state.set(DnsState::Idle));
        self.result.reset();
    }

    /// Handles the `+QIURC: "dnsgip",<err>,<count>,<ttl>` line
    pub(crate) fn handle_result(&self, error: u16, count: usize) {
        let result = self.state.lock(|state| {
            if state.get() != DnsState::Pending {
                return None;
            }

            if error != 0 {
                state.set(DnsState::Resolved);
                return Some(Err(Error::DnsFailed(error)));
            }

            // Query succeeded, but the modem found no address
            if count == 0 {
                state.set(DnsState::Resolved);
                return Some(Err(Error::DnsFailed(0)));
            }

            state.set(DnsState::Receiving);
            None
        });

        if let Some(result) = result {
            self.result.signal(result);
        }
    }

    /// Handles the `+QIURC: "dnsgip","<ip>"` line. Just the first address is used.
    pub(crate) fn handle_address(&self, address: IpAddr) {
        let first = self.state.lock(|state| {
            if state.get() != DnsState::Receiving {
                return false;
            }

            state.set(DnsState::Resolved);
            true
        });

        if first {
            self.result.signal(Ok(address));
        } else {
            log::debug!("Dropping unexpected DNS address {}", address);
        }
    }

    async fn wait(&self) -> Result<IpAddr, Error> {
        self.result.wait().await
    }
}

impl<A: AtatClient, M: ModemState> Adapter<A, M> {
    /// Resolves the hostname to an IP address. IP literals are returned without querying the modem.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, Error> {
        if let Ok(address) = IpAddr::from_str(host) {
            return Ok(address);
        }

        if host.is_empty() || host.len() > MAX_HOSTNAME_LENGTH {
            return Err(Error::InvalidHostname);
        }

        let mut hostname = String::new();
        hostname.push_str(host).map_err(|_| Error::InvalidHostname)?;

        let _guard = self.dns_lock.lock().await;
        self.dns.arm();

        let result = self.query(hostname).await;
        self.dns.disarm();

        match &result {
            Ok(address) => log::debug!("Resolved {} to {}", host, address),
            Err(error) => log::warn!("Resolving {} failed: {:?}", host, error),
        }

        result
    }

    async fn query(&self, hostname: String<MAX_HOSTNAME_LENGTH>) -> Result<IpAddr, Error> {
        self.send_command(&DnsQueryCommand::new(self.config.context_id, hostname)).await?;

        with_timeout(self.config.dns_timeout, self.dns.wait())
            .await
            .map_err(|_| Error::Timeout)?
    }
}

impl<A: AtatClient, M: ModemState> Dns for Adapter<A, M> {
    type Error = Error;

    async fn get_host_by_name(&self, host: &str, addr_type: AddrType) -> Result<IpAddr, Self::Error> {
        let address = self.resolve(host).await?;

        match (addr_type, address) {
            (AddrType::Either, _) | (AddrType::IPv4, IpAddr::V4(_)) | (AddrType::IPv6, IpAddr::V6(_)) => Ok(address),
            _ => Err(Error::Unsupported),
        }
    }

    async fn get_host_by_address(&self, _addr: IpAddr, _result: &mut [u8]) -> Result<usize, Self::Error> {
        Err(Error::Unsupported)
    }
}
