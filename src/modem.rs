//! Interface towards the modem driver owning the AT session
//!
//! Lifecycle handling (power up, network registration, PSM configuration, APN) is not part of this
//! crate. The adapter only needs to know whether the AT session is usable and whether the modem
//! dropped into power saving mode.

/// Modem state provided by the driver owning the AT session
#[cfg_attr(test, mockall::automock)]
pub trait ModemState {
    /// Returns true while the AT session is usable. Close commands are skipped otherwise.
    fn is_session_open(&self) -> bool;

    /// Returns true if the modem entered power saving mode, which drops all active connections
    fn is_power_saving(&self) -> bool;
}
