use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use tracing::warn;

use crate::NonBlockingSocket;

const RECV_BUFFER_SIZE: usize = 4096;
/// A packet larger than this may be fragmented, so ideally we wouldn't send
/// packets larger than this.
/// Source: <https://stackoverflow.com/a/35697810/775982>
const IDEAL_MAX_UDP_PACKET_SIZE: usize = 508;

/// A simple non-blocking UDP socket for peer connections. Listens on the
/// unspecified address of the requested port.
///
/// The receive buffer is reused across `recv_from` calls, so the steady-state
/// receive path only allocates for the datagrams it actually returns.
#[derive(Debug)]
pub struct UdpNonBlockingSocket {
    socket: UdpSocket,
    recv_buffer: [u8; RECV_BUFFER_SIZE],
}

impl UdpNonBlockingSocket {
    /// Binds a UDP socket to 0.0.0.0:port and sets it to non-blocking mode.
    pub fn bind_to_port(port: u16) -> Result<Self, std::io::Error> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
    }

    /// Binds to [::]:port for IPv6 peers.
    pub fn bind_to_port_v6(port: u16) -> Result<Self, std::io::Error> {
        Self::bind(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
    }

    fn bind(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            recv_buffer: [0; RECV_BUFFER_SIZE],
        })
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }
}

impl NonBlockingSocket<SocketAddr> for UdpNonBlockingSocket {
    fn send_to(&mut self, buf: &[u8], addr: &SocketAddr) {
        // Overly large packets risk fragmentation: losing any fragment loses
        // the whole packet. A datagram this size almost always means the
        // host's input payload is too big, which is worth telling them about.
        if buf.len() > IDEAL_MAX_UDP_PACKET_SIZE {
            warn!(
                "sending UDP packet of size {} bytes, larger than ideal ({})",
                buf.len(),
                IDEAL_MAX_UDP_PACKET_SIZE
            );
        }

        // UDP is best-effort, so a failed send is just a dropped packet.
        if let Err(err) = self.socket.send_to(buf, addr) {
            warn!("failed to send UDP packet to {addr}: {err}");
        }
    }

    fn receive_all(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        // Pre-allocate for the typical case of a handful of packets per poll.
        let mut received = Vec::with_capacity(4);
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((number_of_bytes, src_addr)) => {
                    if let Some(payload) = self.recv_buffer.get(..number_of_bytes) {
                        received.push((src_addr, payload.to_vec()));
                    }
                }
                // there are no more packets
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return received,
                // datagram sockets sometimes surface this as an echo of a failed send_to
                Err(ref err) if err.kind() == ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    warn!("unexpected socket error: {:?}: {err}", err.kind());
                    return received;
                }
            }
        }
    }
}

// #########
// # TESTS #
// #########
