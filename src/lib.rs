#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod adapter;
pub(crate) mod commands;
pub(crate) mod condition;
pub mod config;
pub mod dns;
#[cfg(feature = "examples")]
pub mod example;
pub mod modem;
pub(crate) mod responses;
pub mod stack;
pub mod tcp;
pub mod udp;
pub mod urc;

pub use adapter::{Adapter, Runner};
pub use config::Config;
pub use modem::ModemState;
pub use stack::{Error, ModemError};
pub use tcp::TcpSocket;
pub use udp::UdpSocket;
pub use urc::Urc;

#[cfg(test)]
mod tests;
