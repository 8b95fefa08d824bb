use embassy_time::Duration;

/// Adapter configuration
///
/// ````
/// use embassy_time::Duration;
/// use quectel_at_nal::Config;
///
/// let config = Config::default()
///     .context_id(2)
///     .dns_timeout(Duration::from_secs(20));
///
/// assert_eq!(2, config.context_id);
/// ````
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// PDP context used by all sockets
    pub context_id: u8,

    /// Max. duration waiting for the open confirmation of a TCP connection
    pub open_timeout: Duration,

    /// Max. duration waiting for a DNS result
    pub dns_timeout: Duration,

    /// Max. duration a TCP read or UDP receive waits for data. None => Blocks until data arrives or socket closes.
    pub read_timeout: Option<Duration>,

    /// Delay between a remote close notification and releasing the socket id
    pub close_grace_period: Duration,

    /// Pause after the modem rejected data due to a full send buffer
    pub write_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_id: 1,
            open_timeout: Duration::from_secs(150),
            dns_timeout: Duration::from_secs(60),
            read_timeout: None,
            close_grace_period: Duration::from_secs(30),
            write_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Sets the PDP context id
    pub fn context_id(mut self, context_id: u8) -> Self {
        self.context_id = context_id;
        self
    }

    /// Sets the timeout for TCP open confirmation
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Sets the timeout for DNS queries
    pub fn dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    /// Sets the read timeout
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the grace period after remote close
    pub fn close_grace_period(mut self, period: Duration) -> Self {
        self.close_grace_period = period;
        self
    }

    /// Sets the backoff applied when the send buffer of the modem is full
    pub fn write_backoff(mut self, backoff: Duration) -> Self {
        self.write_backoff = backoff;
        self
    }
}
