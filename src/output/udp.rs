//! UDP datagram sink

use super::messages::line_payload;
use super::SinkError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Sends each BPM as a single datagram. The local socket is bound on first use.
#[derive(Debug)]
pub struct UdpSink {
    target: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpSink {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            socket: None,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    async fn socket(&mut self) -> Result<&UdpSocket, SinkError> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => UdpSocket::bind(bind_addr(self.target))
                .await
                .map_err(|source| SinkError::Io {
                    target: self.target.to_string(),
                    source,
                })?,
        };
        Ok(self.socket.insert(socket))
    }

    pub async fn publish(&mut self, bpm: u32) -> Result<(), SinkError> {
        let target = self.target;
        let payload = line_payload(bpm);
        let socket = self.socket().await?;

        socket
            .send_to(payload.as_bytes(), target)
            .await
            .map_err(|source| SinkError::Io {
                target: target.to_string(),
                source,
            })?;
        Ok(())
    }
}

/// Wildcard local address in the target's family, so any reachable target works
fn bind_addr(target: SocketAddr) -> SocketAddr {
    if target.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_sends_line_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut sink = UdpSink::new(receiver.local_addr().unwrap());

        sink.publish(126).await.unwrap();
        sink.publish(127).await.unwrap();

        let mut buf = [0u8; 32];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"126\n");
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"127\n");
    }

    #[test]
    fn local_socket_is_not_limited_to_loopback() {
        let lan: SocketAddr = "192.168.1.20:9955".parse().unwrap();
        assert_eq!(bind_addr(lan), "0.0.0.0:0".parse::<SocketAddr>().unwrap());

        let lan_v6: SocketAddr = "[fd00::20]:9955".parse().unwrap();
        assert_eq!(bind_addr(lan_v6), "[::]:0".parse::<SocketAddr>().unwrap());
    }
}
