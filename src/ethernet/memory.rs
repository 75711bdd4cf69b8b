//! In-memory links for tests, built with `cfg(test)` or the `testing`
//! feature.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, NetworkEndian};
use profinet_probe_lib::ETHERTYPE_VLAN;

use crate::config::LinkConfig;

use super::inventory::{AdapterBackend, AdapterInfo};
use super::link::{RawLink, RxError, TxError};

/// Longest an empty in-memory receive sleeps.
const IDLE_WAIT: Duration = Duration::from_millis(2);

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct Shared {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    fail_sends: bool,
    /// Sends left before every send fails.
    sends_left: Option<usize>,
    filter: Option<u16>,
    reject_filters: bool,
    closed: bool,
}

fn ethertype_of(frame: &[u8]) -> Option<u16> {
    let outer = NetworkEndian::read_u16(frame.get(12..14)?);
    if outer == ETHERTYPE_VLAN {
        frame.get(16..18).map(NetworkEndian::read_u16)
    } else {
        Some(outer)
    }
}

/// Link backed by in-process queues, paired with a [`MemoryLinkHandle`].
#[derive(Clone)]
pub struct MemoryLink {
    shared: Arc<Mutex<Shared>>,
}

/// Test side of a [`MemoryLink`]: feeds inbound frames and inspects sends.
#[derive(Clone)]
pub struct MemoryLinkHandle {
    shared: Arc<Mutex<Shared>>,
}

pub fn memory_link() -> (MemoryLink, MemoryLinkHandle) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    (
        MemoryLink {
            shared: shared.clone(),
        },
        MemoryLinkHandle { shared },
    )
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RawLink for MemoryLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), TxError> {
        let mut guard = lock(&self.shared);
        let shared = &mut *guard;

        if shared.closed {
            return Err(TxError::Closed);
        }
        if let Some(left) = shared.sends_left.as_mut() {
            if *left == 0 {
                shared.fail_sends = true;
            } else {
                *left -= 1;
            }
        }
        if shared.fail_sends {
            return Err(TxError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected send failure",
            )));
        }

        shared.sent.push(frame.to_vec());

        if let Some(mut responder) = shared.responder.take() {
            let replies = responder(frame);
            shared.inbound.extend(replies);
            shared.responder = Some(responder);
        }

        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, RxError> {
        {
            let mut shared = lock(&self.shared);
            if shared.closed {
                return Err(RxError::Closed);
            }

            while let Some(frame) = shared.inbound.pop_front() {
                if let Some(filter) = shared.filter {
                    if ethertype_of(&frame) != Some(filter) {
                        continue;
                    }
                }
                if frame.len() > buf.len() {
                    return Err(RxError::Truncated(frame.len()));
                }
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(Some(frame.len()));
            }
        }

        thread::sleep(timeout.min(IDLE_WAIT));
        Ok(None)
    }

    fn set_ethertype_filter(&mut self, ethertype: u16) -> io::Result<()> {
        let mut shared = lock(&self.shared);
        if shared.reject_filters {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "injected filter failure",
            ));
        }

        shared.filter = Some(ethertype);
        Ok(())
    }
}

impl MemoryLinkHandle {
    pub fn push_inbound(&self, frame: impl Into<Vec<u8>>) {
        lock(&self.shared).inbound.push_back(frame.into());
    }

    /// Calls `responder` with every frame sent; the frames it returns are
    /// queued for reception.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        lock(&self.shared).responder = Some(Box::new(responder));
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent.clone()
    }

    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.shared).sent.len()
    }

    pub fn fail_sends(&self, fail: bool) {
        let mut shared = lock(&self.shared);
        shared.fail_sends = fail;
        shared.sends_left = None;
    }

    /// Lets `count` more sends through, then fails every send.
    pub fn fail_after(&self, count: usize) {
        lock(&self.shared).sends_left = Some(count);
    }

    pub fn filter(&self) -> Option<u16> {
        lock(&self.shared).filter
    }

    /// Makes the link refuse receive filters, as a kernel without socket
    /// filter support does.
    pub fn reject_filters(&self, reject: bool) {
        lock(&self.shared).reject_filters = reject;
    }

    /// Takes the link down, as if the adapter disappeared.
    pub fn close(&self) {
        lock(&self.shared).closed = true;
    }
}

/// Fixed set of in-memory adapters.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    adapters: Vec<(AdapterInfo, MemoryLink)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter and returns the handle to its link.
    pub fn add_adapter(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> MemoryLinkHandle {
        let (link, handle) = memory_link();
        let info = AdapterInfo {
            id: id.into(),
            description: description.into(),
        };
        self.adapters.push((info, link));
        handle
    }
}

impl AdapterBackend for MemoryBackend {
    fn list_adapters(&self) -> io::Result<Vec<AdapterInfo>> {
        Ok(self.adapters.iter().map(|(info, _)| info.clone()).collect())
    }

    fn open_link(&self, adapter_id: &str, _config: &LinkConfig) -> io::Result<Box<dyn RawLink>> {
        self.adapters
            .iter()
            .find(|(info, _)| info.matches(adapter_id))
            .map(|(_, link)| Box::new(link.clone()) as Box<dyn RawLink>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such adapter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ethertype: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 60];
        NetworkEndian::write_u16(&mut frame[12..14], ethertype);
        frame
    }

    #[test]
    fn test_responder_and_filter() {
        let (mut link, handle) = memory_link();
        handle.set_responder(|sent| vec![sent.to_vec(), frame(0x0800)]);
        link.set_ethertype_filter(0x8892).unwrap();

        link.send(&frame(0x8892)).unwrap();
        assert_eq!(handle.sent_count(), 1);

        let mut buf = [0u8; 128];
        assert_eq!(link.recv(&mut buf, Duration::ZERO).unwrap(), Some(60));
        assert_eq!(link.recv(&mut buf, Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_fail_after() {
        let (mut link, handle) = memory_link();
        handle.fail_after(1);

        assert!(link.send(&frame(0x8892)).is_ok());
        assert!(link.send(&frame(0x8892)).is_err());
        assert!(link.send(&frame(0x8892)).is_err());
        assert_eq!(handle.sent_count(), 1);

        handle.fail_sends(false);
        assert!(link.send(&frame(0x8892)).is_ok());
    }

    #[test]
    fn test_rejected_filter_keeps_capturing() {
        let (mut link, handle) = memory_link();
        handle.reject_filters(true);

        assert!(link.set_ethertype_filter(0x8892).is_err());
        assert_eq!(handle.filter(), None);

        handle.push_inbound(frame(0x0800));
        let mut buf = [0u8; 64];
        assert_eq!(link.recv(&mut buf, Duration::ZERO).unwrap(), Some(60));
    }

    #[test]
    fn test_closed_link() {
        let (mut link, handle) = memory_link();
        handle.close();

        assert!(matches!(link.send(&frame(0x8892)), Err(TxError::Closed)));
        let mut buf = [0u8; 64];
        assert!(matches!(link.recv(&mut buf, Duration::ZERO), Err(RxError::Closed)));
    }
}
