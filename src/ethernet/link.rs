use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RxError {
    /// The received frame did not fit the receive buffer
    #[error("received frame of {0} bytes was truncated")]
    Truncated(usize),
    /// The link was closed underneath the reader
    #[error("link is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum TxError {
    /// Transmit queue is full
    #[error("transmit queue is full")]
    WouldBlock,
    #[error("link is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Raw frame access to a single adapter.
pub trait RawLink: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), TxError>;

    /// Waits at most `timeout` for one frame and copies it into `buf`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, RxError>;

    /// Restricts reception to frames carrying `ethertype`, directly or behind
    /// one 802.1Q tag.
    fn set_ethertype_filter(&mut self, _ethertype: u16) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "link does not support receive filters",
        ))
    }
}

impl<L: RawLink + ?Sized> RawLink for Box<L> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TxError> {
        (**self).send(frame)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, RxError> {
        (**self).recv(buf, timeout)
    }

    fn set_ethertype_filter(&mut self, ethertype: u16) -> io::Result<()> {
        (**self).set_ethertype_filter(ethertype)
    }
}
