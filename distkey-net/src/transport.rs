use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The other end of the link is gone.
    Closed,
    /// Nothing arrived before the deadline.
    Timeout,
}

/// One direction pair of a transport connection to a single peer. The
/// protocol stack owns channels and framing; implementations only move
/// opaque frames. Sending must not block.
pub trait Link: Send {
    fn send(&self, frame: Vec<u8>) -> Result<(), LinkError>;
    fn recv_deadline(&self, deadline: Instant) -> Result<Vec<u8>, LinkError>;
}

/// In-process transport over unbounded mpsc queues, used by the tests and
/// by single-machine simulations.
pub struct MemoryLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl Link for MemoryLink {
    fn send(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        self.tx.send(frame).map_err(|_| LinkError::Closed)
    }

    fn recv_deadline(&self, deadline: Instant) -> Result<Vec<u8>, LinkError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => LinkError::Timeout,
            RecvTimeoutError::Disconnected => LinkError::Closed,
        })
    }
}

/// Connected pair of links: what one end sends, the other receives.
pub fn memory_pair() -> (MemoryLink, MemoryLink) {
    let (tx_ab, rx_ab) = mpsc::channel();
    let (tx_ba, rx_ba) = mpsc::channel();
    (
        MemoryLink { tx: tx_ab, rx: rx_ba },
        MemoryLink { tx: tx_ba, rx: rx_ab },
    )
}

/// Full mesh of in-memory links for `n` parties. `mesh[i][j]` is party
/// `i`'s link to party `j`; the diagonal is empty.
pub fn memory_mesh(n: usize) -> Vec<Vec<Option<MemoryLink>>> {
    let mut mesh: Vec<Vec<Option<MemoryLink>>> = (0..n)
        .map(|_| (0..n).map(|_| None).collect())
        .collect();
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = memory_pair();
            mesh[i][j] = Some(a);
            mesh[j][i] = Some(b);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pair_delivers_in_order() {
        let (a, b) = memory_pair();
        a.send(vec![1]).unwrap();
        a.send(vec![2]).unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(b.recv_deadline(deadline).unwrap(), vec![1]);
        assert_eq!(b.recv_deadline(deadline).unwrap(), vec![2]);
    }

    #[test]
    fn recv_times_out() {
        let (_a, b) = memory_pair();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(b.recv_deadline(deadline), Err(LinkError::Timeout));
    }

    #[test]
    fn closed_end_reports() {
        let (a, b) = memory_pair();
        drop(b);
        assert_eq!(a.send(vec![1]), Err(LinkError::Closed));
    }

    #[test]
    fn mesh_connects_all_pairs() {
        let mesh = memory_mesh(3);
        for (i, row) in mesh.iter().enumerate() {
            for (j, link) in row.iter().enumerate() {
                assert_eq!(link.is_some(), i != j);
            }
        }
    }
}
