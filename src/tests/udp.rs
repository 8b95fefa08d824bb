use crate::adapter::Adapter;
use crate::stack::{Error, SlotState};
use crate::tests::mock::{assert_all_cmds_sent, commands, config, modem, run, MockAtatClient, MockedCommand, UrcChannel};
use crate::urc::{Notification, Urc};
use core::net::SocketAddr;
use core::str::FromStr;
use embassy_time::Duration;

fn dns_server() -> SocketAddr {
    SocketAddr::from_str("1.2.3.4:53").unwrap()
}

#[test]
fn test_send_and_receive() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    client.add_response(MockedCommand::ok(b"AT+QISEND=0,10,\"1.2.3.4\",53\r\n"));
    client.add_response(MockedCommand::ok(b"0123456789"));
    client.add_response(MockedCommand::response(
        b"AT+QIRD=0,32\r\n",
        b"+QIRD: 10,\"1.2.3.4\",53\r\nabcdefghij\r\n",
    ));
    let adapter = Adapter::new(client, modem(), config());

    run(&adapter, &channel, async {
        let mut socket = adapter.open_udp(None).await.unwrap();
        assert_eq!(0, socket.id());
        assert_eq!(49152, socket.local_port());

        assert_eq!(10, socket.send_to(dns_server(), b"0123456789").await.unwrap());

        adapter.handle_urc(Urc::Notification(Notification::DataAvailable(0)));

        let mut buffer = [0x0; 32];
        let (length, remote) = socket.receive(&mut buffer).await.unwrap().unwrap();
        assert_eq!(b"abcdefghij", &buffer[..length]);
        assert_eq!(dns_server(), remote);
    });

    assert_eq!(SlotState::Active, adapter.slot(0).state);
    assert_all_cmds_sent(&adapter);
}

#[test]
fn test_open_explicit_port() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,5353,0\r\n",
    ));
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,1,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    let adapter = Adapter::new(client, modem(), config());

    run(&adapter, &channel, async {
        let first = adapter.open_udp(Some(5353)).await.unwrap();
        let second = adapter.open_udp(None).await.unwrap();

        assert_eq!(5353, first.local_port());
        assert_eq!(49152, second.local_port());
    });

    assert_all_cmds_sent(&adapter);
}

#[test]
fn test_open_failed() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_failure(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
        b"+QIGETERROR: 572,operation not allowed\r\n",
    );
    let adapter = Adapter::new(client, modem(), config());

    let result = run(&adapter, &channel, adapter.open_udp(None));

    assert!(matches!(result, Err(Error::Unavailable(_))));
    assert_eq!(SlotState::Free, adapter.slot(0).state);
}

#[test]
fn test_send_connected() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    client.add_response(MockedCommand::ok(b"AT+QISEND=0,4,\"1.2.3.4\",53\r\n"));
    client.add_response(MockedCommand::ok(b"ping"));
    let adapter = Adapter::new(client, modem(), config());

    run(&adapter, &channel, async {
        let mut socket = adapter.open_udp(None).await.unwrap();
        assert_eq!(Err(Error::NotConnected), socket.send(b"ping").await);

        socket.connect(dns_server());
        assert_eq!(Some(dns_server()), socket.remote_address());
        assert_eq!(Ok(4), socket.send(b"ping").await);
    });

    assert_all_cmds_sent(&adapter);
}

#[test]
fn test_send_payload_too_large() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    let adapter = Adapter::new(client, modem(), config());

    let result = run(&adapter, &channel, async {
        let mut socket = adapter.open_udp(None).await.unwrap();
        socket.send_to(dns_server(), &[0x0; 1461]).await
    });

    assert_eq!(Err(Error::PayloadTooLarge), result);
    assert_eq!(1, commands(&adapter).len());
}

#[test]
fn test_broadcast_unsupported() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    let adapter = Adapter::new(client, modem(), config());

    let mut socket = run(&adapter, &channel, adapter.open_udp(None)).unwrap();

    assert_eq!(Err(Error::Unsupported), socket.set_broadcast(true));
    assert!(!socket.broadcast());
    assert_eq!(1460, socket.mtu());
}

#[test]
fn test_receive_after_close() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    let adapter = Adapter::new(client, modem(), config());

    run(&adapter, &channel, async {
        let mut socket = adapter.open_udp(None).await.unwrap();
        adapter.handle_urc(Urc::Notification(Notification::Closed(0)));

        let mut buffer = [0x0; 32];
        assert_eq!(Ok(None), socket.receive(&mut buffer).await);
        assert_eq!(Err(Error::SocketClosed), socket.send_to(dns_server(), b"ping").await);
    });

    assert_eq!(1, commands(&adapter).len());
}

#[test]
fn test_receive_timeout() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    client.add_response(
        MockedCommand::response(b"AT+QIRD=0,32\r\n", b"+QIRD: 4,\"1.2.3.4\",53\r\npong\r\n")
            .with_delay(Duration::from_millis(50)),
    );
    let config = config().read_timeout(Some(Duration::from_millis(20)));
    let adapter = Adapter::new(client, modem(), config);

    run(&adapter, &channel, async {
        let mut socket = adapter.open_udp(None).await.unwrap();

        let mut buffer = [0x0; 32];
        assert_eq!(Err(Error::Timeout), socket.receive(&mut buffer).await);

        // Timeout just limits waiting for the datagram, not reading it
        adapter.handle_urc(Urc::Notification(Notification::DataAvailable(0)));
        let (length, remote) = socket.receive(&mut buffer).await.unwrap().unwrap();
        assert_eq!(b"pong", &buffer[..length]);
        assert_eq!(dns_server(), remote);
    });

    assert_all_cmds_sent(&adapter);
}

#[test]
fn test_close() {
    let channel = UrcChannel::new();
    let mut client = MockAtatClient::new(&channel);
    client.add_response(MockedCommand::ok(
        b"AT+QIOPEN=1,0,\"UDP SERVICE\",\"127.0.0.1\",0,49152,0\r\n",
    ));
    client.add_response(MockedCommand::ok(b"AT+QICLOSE=0\r\n"));
    let adapter = Adapter::new(client, modem(), config());

    run(&adapter, &channel, async {
        let socket = adapter.open_udp(None).await.unwrap();
        socket.close().await.unwrap();
    });

    assert_eq!(SlotState::Free, adapter.slot(0).state);
    assert_all_cmds_sent(&adapter);
}
