use crate::transport::{Link, LinkError};
use distkey_codec::{Codec, ReadError};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{NewCipher, StreamCipher};
use aes::Aes128Ctr;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, Instant};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const KDF_SALT: &[u8] = b"distkey/aiou/v1";
const MAC_LEN: usize = 32;
const MAX_PAYLOAD: usize = 1 << 24;
// granularity of the polling loop when watching several peers
const POLL_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer's channel collapsed earlier and was removed.
    #[error("peer {0} is unreachable")]
    Unreachable(usize),
    /// No message was delivered before the timeout; the peer stays
    /// connected.
    #[error("receive timed out")]
    Timeout,
    /// A frame failed the authenticity check.
    #[error("authentication of a frame from peer {0} failed")]
    Authentication(usize),
    #[error("malformed frame: {0}")]
    Frame(#[from] ReadError),
}

/// Receive scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    /// Consume only from the given peer.
    Direct(usize),
    /// Try peers starting after the last delivered one.
    RoundRobin,
    /// Deliver from any peer with a pending message.
    Any,
}

/// Caller-selected timeout ladder. The exact values are deployment
/// tuning, not part of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Short,
    Middle,
    Long,
    VeryLong,
    ExtremelyLong,
}

impl Timeout {
    pub fn duration(self) -> Duration {
        match self {
            Timeout::Short => Duration::from_secs(5),
            Timeout::Middle => Duration::from_secs(30),
            Timeout::Long => Duration::from_secs(120),
            Timeout::VeryLong => Duration::from_secs(600),
            Timeout::ExtremelyLong => Duration::from_secs(3600),
        }
    }
}

/// Channel observability counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelStats {
    pub num_read: u64,
    pub num_write: u64,
    pub num_encrypted: u64,
    pub num_decrypted: u64,
    pub num_authenticated: u64,
}

struct DirectionKeys {
    enc: [u8; 16],
    mac: [u8; 32],
}

/// Authenticated, encrypted unicast channels to every peer, with per-pair
/// message counters.
///
/// Outbound frames carry a monotonically increasing sequence number per
/// direction; inbound frames that replay or skip a number are dropped
/// without disturbing the channel. Pairwise keys are derived from a
/// caller-supplied key string, so all participants must agree on it.
pub struct PointToPoint {
    n: usize,
    me: usize,
    links: Vec<Option<Box<dyn Link>>>,
    send_keys: Vec<Option<DirectionKeys>>,
    recv_keys: Vec<Option<DirectionKeys>>,
    send_seq: Vec<u64>,
    recv_seq: Vec<u64>,
    authenticated: bool,
    encrypted: bool,
    next_poll: usize,
    stats: ChannelStats,
}

impl PointToPoint {
    /// `links[j]` connects to peer `j`; the own slot must be empty.
    pub fn new(
        me: usize,
        links: Vec<Option<Box<dyn Link>>>,
        key: &str,
        authenticated: bool,
        encrypted: bool,
    ) -> Self {
        let n = links.len();
        assert!(me < n);
        let kdf = Hkdf::<Sha256>::new(Some(KDF_SALT), key.as_bytes());
        let mut send_keys = Vec::with_capacity(n);
        let mut recv_keys = Vec::with_capacity(n);
        for j in 0..n {
            if j == me {
                send_keys.push(None);
                recv_keys.push(None);
            } else {
                send_keys.push(Some(derive_direction(&kdf, me, j)));
                recv_keys.push(Some(derive_direction(&kdf, j, me)));
            }
        }
        PointToPoint {
            n,
            me,
            links,
            send_keys,
            recv_keys,
            send_seq: vec![0; n],
            recv_seq: vec![0; n],
            authenticated,
            encrypted,
            next_poll: 0,
            stats: ChannelStats::default(),
        }
    }

    pub fn parties(&self) -> usize {
        self.n
    }

    pub fn own_index(&self) -> usize {
        self.me
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn is_reachable(&self, j: usize) -> bool {
        j < self.n && self.links[j].is_some()
    }

    /// Drop the in/out descriptors of a collapsed peer. Subsequent sends
    /// fail with `Unreachable`, subsequent receives time out.
    pub fn remove_peer(&mut self, j: usize) {
        if j < self.n {
            self.links[j] = None;
        }
    }

    pub fn send(&mut self, to: usize, payload: &[u8]) -> Result<(), ChannelError> {
        if to >= self.n || to == self.me {
            return Err(ChannelError::Unreachable(to));
        }
        let seq = self.send_seq[to];
        let mut body = payload.to_vec();
        if self.encrypted {
            let keys = self.send_keys[to].as_ref().expect("peer keys exist");
            apply_ctr(&keys.enc, seq, &mut body);
            self.stats.num_encrypted += 1;
        }

        let mut frame = Vec::with_capacity(body.len() + 16 + MAC_LEN);
        {
            let mut codec = Codec::new(&mut frame);
            let _ = codec.put_u64(seq);
            let _ = codec.put_var_bytes(&body);
        }
        if self.authenticated {
            let keys = self.send_keys[to].as_ref().expect("peer keys exist");
            let tag = compute_mac(&keys.mac, &frame);
            frame.extend_from_slice(&tag);
            self.stats.num_authenticated += 1;
        }

        let link = self.links[to]
            .as_ref()
            .ok_or(ChannelError::Unreachable(to))?;
        match link.send(frame) {
            Ok(()) => {
                self.send_seq[to] = seq + 1;
                self.stats.num_write += 1;
                Ok(())
            }
            Err(_) => {
                self.remove_peer(to);
                Err(ChannelError::Unreachable(to))
            }
        }
    }

    /// Receive the next message according to the scheduling policy. A
    /// timeout leaves every channel intact; the caller decides whether to
    /// retry.
    pub fn receive(
        &mut self,
        scheduler: Scheduler,
        timeout: Duration,
    ) -> Result<(usize, Vec<u8>), ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            let candidates: Vec<usize> = match scheduler {
                Scheduler::Direct(j) => vec![j],
                Scheduler::Any => (0..self.n).filter(|&j| j != self.me).collect(),
                Scheduler::RoundRobin => (0..self.n)
                    .map(|off| (self.next_poll + off) % self.n)
                    .filter(|&j| j != self.me)
                    .collect(),
            };
            for j in candidates {
                if j >= self.n || self.links[j].is_none() {
                    continue;
                }
                let slice_end = match scheduler {
                    Scheduler::Direct(_) => deadline,
                    _ => Instant::now() + POLL_SLICE,
                };
                let frame = {
                    let link = self.links[j].as_ref().expect("checked above");
                    link.recv_deadline(slice_end.min(deadline))
                };
                match frame {
                    Ok(frame) => match self.decode_frame(j, &frame) {
                        Ok(Some(payload)) => {
                            self.next_poll = (j + 1) % self.n;
                            self.stats.num_read += 1;
                            return Ok((j, payload));
                        }
                        // replay or out-of-order: dropped, keep polling
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(peer = j, error = %e, "dropping bad frame");
                            continue;
                        }
                    },
                    Err(LinkError::Timeout) => continue,
                    Err(LinkError::Closed) => {
                        tracing::warn!(peer = j, "channel collapsed, removing peer");
                        self.remove_peer(j);
                        continue;
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Timeout);
            }
        }
    }

    fn decode_frame(&mut self, from: usize, frame: &[u8]) -> Result<Option<Vec<u8>>, ChannelError> {
        let keys = self.recv_keys[from]
            .as_ref()
            .ok_or(ChannelError::Unreachable(from))?;

        let body_end = if self.authenticated {
            if frame.len() < MAC_LEN {
                return Err(ChannelError::Authentication(from));
            }
            let (content, tag) = frame.split_at(frame.len() - MAC_LEN);
            if !verify_mac(&keys.mac, content, tag) {
                return Err(ChannelError::Authentication(from));
            }
            self.stats.num_authenticated += 1;
            content.len()
        } else {
            frame.len()
        };

        let mut codec = Codec::new(&frame[..body_end]);
        let seq = codec.get_u64()?;
        let mut body = codec.get_var_bytes(MAX_PAYLOAD)?;

        if seq != self.recv_seq[from] {
            // replayed or out-of-order frame
            tracing::debug!(
                peer = from,
                got = seq,
                expected = self.recv_seq[from],
                "dropping out-of-sequence frame"
            );
            return Ok(None);
        }
        if self.encrypted {
            apply_ctr(&keys.enc, seq, &mut body);
            self.stats.num_decrypted += 1;
        }
        self.recv_seq[from] = seq + 1;
        Ok(Some(body))
    }
}

fn derive_direction(kdf: &Hkdf<Sha256>, from: usize, to: usize) -> DirectionKeys {
    let mut info = Vec::with_capacity(20);
    info.extend_from_slice(b"dir");
    info.extend_from_slice(&(from as u64).to_be_bytes());
    info.extend_from_slice(&(to as u64).to_be_bytes());
    let mut okm = [0u8; 48];
    kdf.expand(&info, &mut okm)
        .expect("48 bytes is a valid hkdf output length");
    let mut enc = [0u8; 16];
    let mut mac = [0u8; 32];
    enc.copy_from_slice(&okm[..16]);
    mac.copy_from_slice(&okm[16..]);
    DirectionKeys { enc, mac }
}

fn apply_ctr(key: &[u8; 16], seq: u64, body: &mut [u8]) {
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(&seq.to_be_bytes());
    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&nonce),
    );
    cipher.apply_keystream(body);
}

fn compute_mac(key: &[u8; 32], content: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(content);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn verify_mac(key: &[u8; 32], content: &[u8], tag: &[u8]) -> bool {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(content);
    mac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory_mesh;

    fn channels(n: usize, key: &str) -> Vec<PointToPoint> {
        let mut mesh = memory_mesh(n);
        (0..n)
            .map(|i| {
                let links = std::mem::take(&mut mesh[i])
                    .into_iter()
                    .map(|l| l.map(|l| Box::new(l) as Box<dyn Link>))
                    .collect();
                PointToPoint::new(i, links, key, true, true)
            })
            .collect()
    }

    #[test]
    fn send_receive_direct() {
        let mut parties = channels(3, "test key");
        parties[0].send(1, b"hello").unwrap();
        let (from, msg) = parties[1]
            .receive(Scheduler::Direct(0), Duration::from_millis(200))
            .unwrap();
        assert_eq!((from, msg.as_slice()), (0usize, &b"hello"[..]));
    }

    #[test]
    fn round_robin_covers_all_peers() {
        let mut parties = channels(3, "test key");
        parties[0].send(2, b"from zero").unwrap();
        parties[1].send(2, b"from one").unwrap();
        let mut seen = Vec::new();
        for _ in 0..2 {
            let (from, _) = parties[2]
                .receive(Scheduler::RoundRobin, Duration::from_millis(200))
                .unwrap();
            seen.push(from);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn timeout_returns_no_message() {
        let mut parties = channels(2, "test key");
        let r = parties[0].receive(Scheduler::Any, Duration::from_millis(20));
        assert!(matches!(r, Err(ChannelError::Timeout)));
        // the channel is still usable afterwards
        parties[1].send(0, b"late").unwrap();
        assert!(parties[0]
            .receive(Scheduler::Any, Duration::from_millis(200))
            .is_ok());
    }

    #[test]
    fn mismatched_keys_drop_frames() {
        let n = 2;
        let mut mesh = memory_mesh(n);
        let links0 = std::mem::take(&mut mesh[0])
            .into_iter()
            .map(|l| l.map(|l| Box::new(l) as Box<dyn Link>))
            .collect();
        let links1 = std::mem::take(&mut mesh[1])
            .into_iter()
            .map(|l| l.map(|l| Box::new(l) as Box<dyn Link>))
            .collect();
        let mut a = PointToPoint::new(0, links0, "key A", true, true);
        let mut b = PointToPoint::new(1, links1, "key B", true, true);
        a.send(1, b"sealed").unwrap();
        let r = b.receive(Scheduler::Direct(0), Duration::from_millis(50));
        assert!(matches!(r, Err(ChannelError::Timeout)));
    }

    #[test]
    fn unreachable_after_removal() {
        let mut parties = channels(2, "test key");
        parties[0].remove_peer(1);
        assert!(matches!(
            parties[0].send(1, b"x"),
            Err(ChannelError::Unreachable(1))
        ));
    }

    #[test]
    fn counters_track_traffic() {
        let mut parties = channels(2, "test key");
        parties[0].send(1, b"one").unwrap();
        parties[0].send(1, b"two").unwrap();
        parties[1]
            .receive(Scheduler::Direct(0), Duration::from_millis(200))
            .unwrap();
        parties[1]
            .receive(Scheduler::Direct(0), Duration::from_millis(200))
            .unwrap();
        assert_eq!(parties[0].stats().num_write, 2);
        assert_eq!(parties[0].stats().num_encrypted, 2);
        assert_eq!(parties[1].stats().num_read, 2);
        assert_eq!(parties[1].stats().num_decrypted, 2);
    }
}
