use crate::responses::{ErrorReport, ReadData, SocketStateReport};
use core::net::SocketAddr;
use core::str::FromStr;

#[test]
fn test_error_report() {
    let report = ErrorReport::parse(b"+QIGETERROR: 553,memory not enough\r\n").unwrap();
    assert_eq!(553, report.code);
    assert_eq!("memory not enough", report.message.as_str());
}

#[test]
fn test_error_report_truncates_message() {
    let mut response = b"+QIGETERROR: 550,".to_vec();
    response.extend_from_slice(&[b'x'; 100]);

    let report = ErrorReport::parse(&response).unwrap();
    assert_eq!(550, report.code);
    assert_eq!(64, report.message.len());
}

#[test]
fn test_error_report_invalid() {
    assert_eq!(None, ErrorReport::parse(b"+QIGETERROR: 553"));
    assert_eq!(None, ErrorReport::parse(b"+QIGETERROR: x,unknown"));
    assert_eq!(None, ErrorReport::parse(b"+CME ERROR: 3"));
}

#[test]
fn test_read_data_tcp() {
    let data = ReadData::parse(b"+QIRD: 4\r\ntest\r\n").unwrap();
    assert_eq!(None, data.remote);
    assert_eq!(b"test", data.data.as_slice());
}

#[test]
fn test_read_data_binary_payload() {
    let data = ReadData::parse(b"+QIRD: 6\r\nab\r\ncd").unwrap();
    assert_eq!(b"ab\r\ncd", data.data.as_slice());
}

#[test]
fn test_read_data_empty() {
    let data = ReadData::parse(b"+QIRD: 0\r\n").unwrap();
    assert!(data.data.is_empty());

    let data = ReadData::parse(b"+QIRD: 0").unwrap();
    assert!(data.data.is_empty());
}

#[test]
fn test_read_data_udp() {
    let data = ReadData::parse(b"+QIRD: 3,\"1.2.3.4\",53\r\nabc").unwrap();
    assert_eq!(Some(SocketAddr::from_str("1.2.3.4:53").unwrap()), data.remote);
    assert_eq!(b"abc", data.data.as_slice());
}

#[test]
fn test_read_data_payload_too_short() {
    assert_eq!(None, ReadData::parse(b"+QIRD: 10\r\nabc"));
}

#[test]
fn test_read_data_invalid_header() {
    assert_eq!(None, ReadData::parse(b"+QIRD: x\r\nabc"));
    assert_eq!(None, ReadData::parse(b"+QIRD: 3,\"1.2.3\",53\r\nabc"));
    assert_eq!(None, ReadData::parse(b"+QIRD: 3,\"1.2.3.4\"\r\nabc"));
    assert_eq!(None, ReadData::parse(b"abc"));
}

#[test]
fn test_socket_state_report() {
    let report =
        SocketStateReport::parse(b"+QISTATE: 0,\"TCP\",\"220.180.239.212\",8705,65514,2,1,0,0,\"usbmodem\"\r\n")
            .unwrap();

    assert_eq!(0, report.connect_id);
    assert_eq!(65514, report.local_port);
    assert_eq!(2, report.state);
}

#[test]
fn test_socket_state_report_invalid() {
    assert_eq!(None, SocketStateReport::parse(b"+QISTATE: 0,\"TCP\""));
    assert_eq!(None, SocketStateReport::parse(b""));
}
