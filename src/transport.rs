//! Raw ICMP socket access.

use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::AsRawFd;
use std::ptr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::error::{TraceError, TraceResult};

/// SO_RCVTIMEO has microsecond resolution and treats zero as "no timeout"
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// Room for IP_PKTINFO and IP_TTL control messages
const CONTROL_BUFFER_WORDS: usize = 16;

/// Ancillary data the kernel attached to an inbound datagram.
///
/// Every field is optional: the options may be unsupported on the platform,
/// and scripted transports leave them unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlInfo {
    /// Index of the interface the datagram arrived on
    pub interface: Option<u32>,
    /// Destination address from the datagram's IP header
    pub destination: Option<Ipv4Addr>,
    /// TTL the datagram arrived with
    pub ttl: Option<u8>,
}

/// A datagram read from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Bytes written to the caller's buffer
    pub len: usize,
    /// Address the datagram came from
    pub peer: Ipv4Addr,
    pub control: ControlInfo,
}

/// What the probe loop needs from a socket.
///
/// Inbound datagrams are whole IPv4 datagrams (header included), as a raw
/// IPv4 socket delivers them.
pub trait Transport {
    /// Set the TTL used for subsequent sends.
    fn set_ttl(&mut self, ttl: u8) -> TraceResult<()>;

    /// Send one ICMP message to `destination`.
    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> TraceResult<()>;

    /// Wait up to `timeout` for the next inbound datagram.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Callers must not
    /// assume the full timeout elapsed: an interrupted wait also yields `None`.
    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> TraceResult<Option<Received>>;
}

/// Raw IPv4 ICMP socket. Closed on drop.
#[derive(Debug)]
pub struct RawSocket {
    socket: Socket,
    ttl: u8,
}

impl RawSocket {
    /// Open the socket. Fails with `Privilege` without root or CAP_NET_RAW.
    pub fn open() -> TraceResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(TraceError::Privilege)?;
        socket.set_nonblocking(false).map_err(TraceError::Privilege)?;

        // Best-effort: without these, replies simply carry no control info
        if let Err(e) = set_flag(&socket, libc::IP_RECVTTL) {
            debug!(error = %e, "Could not enable IP_RECVTTL");
        }
        #[cfg(target_os = "linux")]
        if let Err(e) = set_flag(&socket, libc::IP_PKTINFO) {
            debug!(error = %e, "Could not enable IP_PKTINFO");
        }

        debug!("Opened raw ICMP socket");
        Ok(Self { socket, ttl: 0 })
    }

    /// recvmsg(2) into `buf`, collecting the control messages enabled in `open`.
    fn recv_with_control(&self, buf: &mut [u8]) -> io::Result<Received> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // u64 words keep the buffer aligned for cmsghdr
        let mut control = [0u64; CONTROL_BUFFER_WORDS];
        // SAFETY: sockaddr_in and msghdr are plain C structs; all-zero is valid.
        let mut name: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = ptr::addr_of_mut!(name).cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = mem::size_of_val(&control) as _;

        // SAFETY: every pointer in `msg` refers to a live local buffer of the
        // length recorded next to it.
        let len = unsafe { libc::recvmsg(self.socket.as_raw_fd(), &mut msg, 0) };
        if len < 0 {
            return Err(io::Error::last_os_error());
        }
        if name.sin_family as libc::c_int != libc::AF_INET {
            return Err(io::Error::other("Received datagram from non-IPv4 peer"));
        }

        Ok(Received {
            len: len as usize,
            peer: Ipv4Addr::from(u32::from_be(name.sin_addr.s_addr)),
            // SAFETY: `msg` was just filled in by a successful recvmsg.
            control: unsafe { parse_control(&msg) },
        })
    }
}

impl Transport for RawSocket {
    fn set_ttl(&mut self, ttl: u8) -> TraceResult<()> {
        self.socket
            .set_ttl(ttl as u32)
            .map_err(|source| TraceError::SetTtl { ttl, source })?;
        self.ttl = ttl;
        Ok(())
    }

    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> TraceResult<()> {
        let dest = SockAddr::from(SocketAddr::new(IpAddr::V4(destination), 0));
        self.socket
            .send_to(packet, &dest)
            .map_err(|source| TraceError::Send {
                ttl: self.ttl,
                source,
            })?;
        Ok(())
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> TraceResult<Option<Received>> {
        let Some(timeout) = read_timeout(timeout) else {
            return Ok(None);
        };
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(TraceError::SetTimeout)?;

        match self.recv_with_control(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(TraceError::Receive(e)),
        }
    }
}

/// The read timeout to arm, or `None` if `timeout` has already run out.
///
/// Anything under a microsecond would truncate to a zero timeval, which the
/// kernel reads as "block forever".
fn read_timeout(timeout: Duration) -> Option<Duration> {
    (timeout >= MIN_READ_TIMEOUT).then_some(timeout)
}

fn set_flag(socket: &Socket, option: libc::c_int) -> io::Result<()> {
    let enabled: libc::c_int = 1;
    // SAFETY: the option value is a live c_int of the size passed.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            option,
            ptr::addr_of!(enabled).cast(),
            mem::size_of_val(&enabled) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Walk the control messages of a received `msghdr`.
///
/// # Safety
///
/// `msg` must have been filled in by a successful `recvmsg`, with its control
/// buffer still alive.
unsafe fn parse_control(msg: &libc::msghdr) -> ControlInfo {
    let mut info = ControlInfo::default();

    // SAFETY: guaranteed by the caller; CMSG_* stay within msg_controllen.
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(msg) };
    while !cmsg.is_null() {
        let header = unsafe { &*cmsg };
        let data = unsafe { libc::CMSG_DATA(cmsg) };

        match (header.cmsg_level, header.cmsg_type) {
            #[cfg(target_os = "linux")]
            (libc::IPPROTO_IP, libc::IP_PKTINFO) => {
                let pktinfo = unsafe { ptr::read_unaligned(data.cast::<libc::in_pktinfo>()) };
                info.interface = u32::try_from(pktinfo.ipi_ifindex).ok();
                info.destination = Some(Ipv4Addr::from(u32::from_be(pktinfo.ipi_addr.s_addr)));
            }
            (libc::IPPROTO_IP, libc::IP_TTL) => {
                let ttl = unsafe { ptr::read_unaligned(data.cast::<libc::c_int>()) };
                info.ttl = u8::try_from(ttl).ok();
            }
            _ => {}
        }

        cmsg = unsafe { libc::CMSG_NXTHDR(msg, cmsg) };
    }

    info
}
