//! one shot UDP client for querying a DNS server

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use derive_more::Display;
use rand::random;
use tracing::debug;

use crate::dns::protocol::{DnsPacket, DnsQuestion, QueryType, WireError};
use crate::dns::server::MAX_UDP_SIZE;

#[derive(Debug, Display)]
pub enum ClientError {
    #[display(fmt = "{}", _0)]
    Io(std::io::Error),
    #[display(fmt = "invalid response: {}", _0)]
    Wire(WireError),
    #[display(fmt = "response id {} does not match query id {}", got, expected)]
    IdMismatch { expected: u16, got: u16 },
    #[display(fmt = "timed out waiting for a response")]
    TimeOut,
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => ClientError::TimeOut,
            _ => ClientError::Io(err),
        }
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        ClientError::Wire(err)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct DnsUdpClient {
    timeout: Duration,
}

impl DnsUdpClient {
    pub fn new(timeout: Duration) -> DnsUdpClient {
        DnsUdpClient { timeout }
    }

    pub fn send_query(
        &self,
        qname: &str,
        qtype: QueryType,
        server: SocketAddr,
    ) -> Result<DnsPacket> {
        let mut packet = DnsPacket::new();
        packet.header.id = random::<u16>();
        packet.header.flags.set_recursion_desired(true);
        packet.questions.push(DnsQuestion::new(qname, qtype));

        let req = packet.to_bytes(MAX_UDP_SIZE)?;

        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.send_to(&req, server)?;

        let mut buf = [0u8; MAX_UDP_SIZE];
        let (len, _) = socket.recv_from(&mut buf)?;

        let response = DnsPacket::from_bytes(&buf[..len])?;
        debug!(header = %response.header, "received response");

        if response.header.id != packet.header.id {
            return Err(ClientError::IdMismatch {
                expected: packet.header.id,
                got: response.header.id,
            });
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_timeout() {
        // a socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let client = DnsUdpClient::new(Duration::from_millis(100));
        let res = client.send_query("example.com", QueryType::A, addr);

        assert!(matches!(res, Err(ClientError::TimeOut)));
    }

    #[test]
    fn test_invalid_name() {
        let client = DnsUdpClient::new(Duration::from_millis(100));
        let addr = SocketAddr::from(([127, 0, 0, 1], 9));
        let res = client.send_query("a..b", QueryType::A, addr);

        assert!(matches!(res, Err(ClientError::Wire(WireError::MalformedName))));
    }
}
