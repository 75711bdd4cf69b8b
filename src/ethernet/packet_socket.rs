use std::fs;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, trace};

use crate::config::LinkConfig;

use super::inventory::{AdapterBackend, AdapterInfo};
use super::link::{RawLink, RxError, TxError};

const PACKET_MR_PROMISC: libc::c_ushort = 1;

const BPF_LDH_ABS: u16 = 0x28;
const BPF_JEQ_K: u16 = 0x15;
const BPF_RET_K: u16 = 0x06;
/// Accept the whole frame.
const BPF_ACCEPT: u32 = 0x0004_0000;

#[repr(C)]
struct PacketMreq {
    mr_ifindex: libc::c_int,
    mr_type: libc::c_ushort,
    mr_alen: libc::c_ushort,
    mr_address: [libc::c_uchar; 8],
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Classic BPF program passing `ethertype` frames, untagged or behind one
/// 802.1Q tag.
fn ethertype_program(ethertype: u16) -> [libc::sock_filter; 7] {
    let op = |code, jt, jf, k| libc::sock_filter { code, jt, jf, k };

    [
        op(BPF_LDH_ABS, 0, 0, 12),
        op(BPF_JEQ_K, 3, 0, ethertype as u32),
        op(BPF_JEQ_K, 0, 3, profinet_probe_lib::ETHERTYPE_VLAN as u32),
        op(BPF_LDH_ABS, 0, 0, 16),
        op(BPF_JEQ_K, 0, 1, ethertype as u32),
        op(BPF_RET_K, 0, 0, BPF_ACCEPT),
        op(BPF_RET_K, 0, 0, 0),
    ]
}

/// AF_PACKET raw socket bound to one interface.
pub struct PacketSocket {
    fd: OwnedFd,
    interface: String,
    ifindex: libc::c_int,
}

impl PacketSocket {
    pub fn open(interface: &str, promiscuous: bool) -> io::Result<Self> {
        let ifindex = if_nametoindex(interface).map_err(io::Error::from)? as libc::c_int;
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                protocol as libc::c_int,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex;

        check(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        })?;

        let socket = Self {
            fd,
            interface: interface.to_owned(),
            ifindex,
        };

        if promiscuous {
            let mreq = PacketMreq {
                mr_ifindex: ifindex,
                mr_type: PACKET_MR_PROMISC,
                mr_alen: 0,
                mr_address: [0; 8],
            };
            socket.setsockopt(libc::SOL_PACKET, libc::PACKET_ADD_MEMBERSHIP, &mreq)?;
        }

        debug!(interface, ifindex, promiscuous, "packet socket opened");
        Ok(socket)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    fn setsockopt<T>(&self, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
        check(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                level,
                name,
                value as *const T as *const libc::c_void,
                mem::size_of::<T>() as libc::socklen_t,
            )
        })
    }
}

impl RawLink for PacketSocket {
    fn send(&mut self, frame: &[u8]) -> Result<(), TxError> {
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };

        if sent < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::ENOBUFS) => Err(TxError::WouldBlock),
                Some(libc::ENETDOWN) | Some(libc::ENXIO) => Err(TxError::Closed),
                _ => Err(TxError::Io(err)),
            };
        }

        if sent as usize != frame.len() {
            return Err(TxError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write of {} of {} bytes", sent, frame.len()),
            )));
        }

        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, RxError> {
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let mut fds = [PollFd::new(self.fd.as_raw_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, timeout_ms) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => return Ok(None),
            Err(err) => return Err(RxError::Io(err.into())),
        }

        let received = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_DONTWAIT | libc::MSG_TRUNC,
            )
        };

        if received < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(None),
                Some(libc::ENETDOWN) => Err(RxError::Closed),
                _ => Err(RxError::Io(err)),
            };
        }

        let received = received as usize;
        if received > buf.len() {
            return Err(RxError::Truncated(received));
        }

        trace!(interface = %self.interface, len = received, "frame received");
        Ok(Some(received))
    }

    fn set_ethertype_filter(&mut self, ethertype: u16) -> io::Result<()> {
        let mut program = ethertype_program(ethertype);
        let fprog = libc::sock_fprog {
            len: program.len() as libc::c_ushort,
            filter: program.as_mut_ptr(),
        };

        self.setsockopt(libc::SOL_SOCKET, libc::SO_ATTACH_FILTER, &fprog)
    }
}

/// Host interfaces through AF_PACKET sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketSocketBackend;

impl AdapterBackend for PacketSocketBackend {
    fn list_adapters(&self) -> io::Result<Vec<AdapterInfo>> {
        let mut adapters: Vec<AdapterInfo> = Vec::new();

        for ifaddr in getifaddrs().map_err(io::Error::from)? {
            if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
                continue;
            }
            if adapters.iter().any(|a| a.id == ifaddr.interface_name) {
                continue;
            }

            let description = fs::read_to_string(format!(
                "/sys/class/net/{}/ifalias",
                ifaddr.interface_name
            ))
            .ok()
            .map(|alias| alias.trim().to_owned())
            .filter(|alias| !alias.is_empty())
            .unwrap_or_else(|| ifaddr.interface_name.clone());

            adapters.push(AdapterInfo {
                id: ifaddr.interface_name,
                description,
            });
        }

        Ok(adapters)
    }

    fn open_link(&self, adapter_id: &str, config: &LinkConfig) -> io::Result<Box<dyn RawLink>> {
        Ok(Box::new(PacketSocket::open(adapter_id, config.promiscuous)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs the program the way the kernel does for the few opcodes it uses.
    fn run(program: &[libc::sock_filter], frame: &[u8]) -> u32 {
        let mut acc = 0u32;
        let mut pc = 0usize;

        loop {
            let insn = program[pc];
            pc += 1;
            match insn.code {
                BPF_LDH_ABS => {
                    let k = insn.k as usize;
                    if frame.len() < k + 2 {
                        return 0;
                    }
                    acc = u16::from_be_bytes([frame[k], frame[k + 1]]) as u32;
                }
                BPF_JEQ_K => {
                    let offset = if acc == insn.k { insn.jt } else { insn.jf };
                    pc += offset as usize;
                }
                BPF_RET_K => return insn.k,
                other => panic!("unexpected opcode {other:#x}"),
            }
        }
    }

    fn frame(ethertypes: &[u16]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        for ethertype in ethertypes {
            frame.extend_from_slice(&ethertype.to_be_bytes());
            frame.extend_from_slice(&[0, 0]);
        }
        frame.resize(60, 0);
        frame
    }

    #[test]
    fn test_ethertype_program() {
        let program = ethertype_program(0x8892);

        assert_eq!(run(&program, &frame(&[0x8892])), BPF_ACCEPT);
        assert_eq!(run(&program, &frame(&[0x8100, 0x8892])), BPF_ACCEPT);
        assert_eq!(run(&program, &frame(&[0x0800])), 0);
        assert_eq!(run(&program, &frame(&[0x8100, 0x0800])), 0);
    }
}
