//! Mocks for doc examples
use crate::modem::ModemState;
use crate::urc::Urc;
use atat::asynch::AtatClient;
use atat::{AtatCmd, AtatUrc, Error};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher};

/// ATAT client mock
pub struct ExampleAtClient<'a> {
    /// URC publisher used for statically mocking URC messages
    urc_publisher: Publisher<'a, CriticalSectionRawMutex, Urc, 8, 1, 1>,
}

impl<'a> ExampleAtClient<'a> {
    pub fn urc_channel() -> PubSubChannel<CriticalSectionRawMutex, Urc, 8, 1, 1> {
        PubSubChannel::new()
    }

    pub fn init(channel: &'a PubSubChannel<CriticalSectionRawMutex, Urc, 8, 1, 1>) -> Self {
        Self {
            urc_publisher: channel.publisher().unwrap(),
        }
    }

    fn publish_urc(&self, message: &[u8]) {
        let message = <Urc as AtatUrc>::parse(message).unwrap();
        self.urc_publisher.try_publish(message).unwrap();
    }
}

impl AtatClient for ExampleAtClient<'_> {
    async fn send<Cmd: AtatCmd>(&mut self, cmd: &Cmd) -> Result<Cmd::Response, Error> {
        let mut buffer = [0x0; 1600];
        let length = cmd.write(&mut buffer);

        match &buffer[..length] {
            b"AT+QIDNSGIP=1,\"example.org\"\r\n" => {
                self.publish_urc(b"+QIURC: \"dnsgip\",0,1,600\r\n");
                self.publish_urc(b"+QIURC: \"dnsgip\",\"93.184.216.34\"\r\n");
            }
            b"AT+QIOPEN=1,0,\"TCP\",\"93.184.216.34\",80,0,0\r\n" => self.publish_urc(b"+QIOPEN: 0,0\r\n"),
            b"GET / HTTP/1.0\r\n\r\n" => self.publish_urc(b"+QIURC: \"recv\",0\r\n"),
            b"AT+QIRD=0,64\r\n" => return cmd.parse(Ok(b"+QIRD: 15\r\nHTTP/1.0 200 OK")),
            &_ => {}
        }

        cmd.parse(Ok(b""))
    }
}

/// Modem driver mock with an open AT session
#[derive(Default)]
pub struct ExampleModem {}

impl ModemState for ExampleModem {
    fn is_session_open(&self) -> bool {
        true
    }

    fn is_power_saving(&self) -> bool {
        false
    }
}
