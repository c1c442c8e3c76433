//! Thin façade over in-process or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable**; the transport calls `.wait()` on every
//! handle it posted before it returns, even on error.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

/// Non-blocking communication interface.
///
/// Sends must not block on the matching receive being posted: the
/// transport posts all sends of a stage before any receive.
pub trait Communicator: 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the calling process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// `buf.len()` is the expected message length.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Tags of the two transport stages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExchangeTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl ExchangeTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Single-process communicator: rank 0 of 1, every message a no-op.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- LocalComm: several ranks inside one process, one thread each ---

type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = Arc<DashMap<Key, VecDeque<Bytes>>>;

/// In-process communicator. Ranks created by [`LocalComm::world`] share a
/// mailbox; messages between one (src, dst, tag) triple arrive in order.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Mailbox,
}

impl LocalComm {
    /// One communicator per rank of an `n`-rank world.
    pub fn world(n: usize) -> Vec<LocalComm> {
        let mailbox: Mailbox = Arc::new(DashMap::new());
        (0..n)
            .map(|rank| LocalComm {
                rank,
                size: n,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

/// Receive handle of [`LocalComm`]; `wait` spins until the message lands.
pub struct LocalHandle {
    key: Key,
    mailbox: Mailbox,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination, Source};

    /// MPI communicator over `MPI_COMM_WORLD`.
    ///
    /// Sends are buffered (`MPI_Bsend`), so the attached buffer must hold
    /// every message of one transport stage.
    pub struct MpiComm {
        _universe: Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI and attach a send buffer of `buffer_bytes`.
        ///
        /// Returns `None` if MPI was already initialized.
        pub fn new(buffer_bytes: usize) -> Option<Self> {
            let mut universe = mpi::initialize()?;
            universe.set_buffer_size(buffer_bytes);
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Completed receive.
    pub struct MpiRecv(Vec<u8>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            Some(self.0)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .buffered_send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            MpiRecv(data)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
