use crate::channel::{ChannelError, PointToPoint, Scheduler, Timeout};
use distkey_codec::{Codec, ReadError};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

const TAG_SEND: u8 = 1;
const TAG_ECHO: u8 = 2;
const TAG_READY: u8 = 3;
const TAG_SYNC: u8 = 4;

const DIGEST_LEN: usize = 32;
const MAX_SESSION_ID: usize = 1 << 10;
const MAX_PAYLOAD: usize = 1 << 24;
// granularity of the delivery wait loop
const POLL_SLICE: Duration = Duration::from_millis(2);

#[derive(Debug, Error)]
pub enum RbcError {
    #[error("bad broadcast parameter: {0}")]
    BadParameter(&'static str),
    /// Nothing was delivered before the timeout. No partial state is
    /// lost; the message may still be delivered by a later call.
    #[error("delivery timed out")]
    Timeout,
    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),
    #[error("malformed broadcast frame: {0}")]
    Frame(#[from] ReadError),
}

/// Per-message voting state.
#[derive(Default)]
struct Slot {
    payload: Option<Vec<u8>>,
    digest: Option<[u8; DIGEST_LEN]>,
    echoes: HashMap<[u8; DIGEST_LEN], HashSet<usize>>,
    readys: HashMap<[u8; DIGEST_LEN], HashSet<usize>>,
    sent_echo: bool,
    sent_ready: bool,
    delivered: bool,
}

type SessionId = Vec<u8>;

/// Reliable broadcast (Bracha echo/ready, as used by the asynchronous
/// protocol suite of Cachin, Kursawe, Petzold and Shoup).
///
/// Guarantees for `t <= (n-1)/3` Byzantine parties: *agreement* (all
/// honest parties deliver the same message per `(session, sender,
/// sequence)`), *integrity* (a delivered message of an honest sender was
/// sent by it), and *totality* (once one honest party delivers, all
/// eventually do).
///
/// Within one `(session, sender)` pair, delivery follows the sender's
/// sequence numbers strictly; messages of other senders are never held
/// back by a slow one.
pub struct ReliableBroadcast {
    n: usize,
    t: usize,
    me: usize,
    aiou: PointToPoint,
    sid_stack: Vec<Vec<u8>>,
    own_seq: HashMap<SessionId, u64>,
    slots: HashMap<(SessionId, usize, u64), Slot>,
    next_deliver: HashMap<(SessionId, usize), u64>,
    deliverable: HashMap<(SessionId, usize), BTreeMap<u64, Vec<u8>>>,
    sync_seen: HashMap<(SessionId, Vec<u8>), HashSet<usize>>,
}

impl ReliableBroadcast {
    /// Takes ownership of a dedicated unicast instance; broadcast traffic
    /// must not share channels with direct protocol messages, or the
    /// per-pair counters of the two layers would interleave.
    pub fn new(t: usize, aiou: PointToPoint) -> Result<Self, RbcError> {
        let n = aiou.parties();
        if n == 0 {
            return Err(RbcError::BadParameter("no parties"));
        }
        if n > 1 && 3 * t >= n {
            return Err(RbcError::BadParameter("requires 3t < n"));
        }
        let me = aiou.own_index();
        Ok(ReliableBroadcast {
            n,
            t,
            me,
            aiou,
            sid_stack: Vec::new(),
            own_seq: HashMap::new(),
            slots: HashMap::new(),
            next_deliver: HashMap::new(),
            deliverable: HashMap::new(),
            sync_seen: HashMap::new(),
        })
    }

    pub fn parties(&self) -> usize {
        self.n
    }

    pub fn tolerance(&self) -> usize {
        self.t
    }

    pub fn own_index(&self) -> usize {
        self.me
    }

    /// Enter a nested subsession. Messages broadcast inside are invisible
    /// to the enclosing session.
    pub fn set_id(&mut self, id: &[u8]) {
        self.sid_stack.push(id.to_vec());
    }

    /// Leave the innermost subsession.
    pub fn unset_id(&mut self) {
        self.sid_stack.pop();
    }

    /// Namespace of the current (possibly nested) session. Protocol layers
    /// use it to tag their direct unicast traffic with the same scope.
    pub fn session_id(&self) -> Vec<u8> {
        self.current_sid()
    }

    fn current_sid(&self) -> SessionId {
        let mut sid = Vec::new();
        for part in &self.sid_stack {
            sid.extend_from_slice(&(part.len() as u32).to_be_bytes());
            sid.extend_from_slice(part);
        }
        sid
    }

    fn echo_threshold(&self) -> usize {
        // ceil((n + t + 1) / 2)
        (self.n + self.t + 2) / 2
    }

    /// Broadcast a message in the current session. Returns the sequence
    /// number assigned to it.
    pub fn broadcast(&mut self, payload: &[u8]) -> Result<u64, RbcError> {
        let sid = self.current_sid();
        let seq = {
            let counter = self.own_seq.entry(sid.clone()).or_insert(0);
            let seq = *counter;
            *counter += 1;
            seq
        };
        let frame = encode_frame(TAG_SEND, &sid, self.me as u16, seq, payload)?;
        self.send_to_all(&frame);
        self.handle_frame(self.me, &frame)?;
        Ok(seq)
    }

    /// Deliver the next in-order message of `from` in the current
    /// session, processing incoming broadcast traffic while waiting.
    pub fn deliver_from(&mut self, from: usize, timeout: Timeout) -> Result<Vec<u8>, RbcError> {
        let deadline = Instant::now() + timeout.duration();
        let sid = self.current_sid();
        loop {
            if let Some(payload) = self.pop_deliverable(&sid, from) {
                return Ok(payload);
            }
            if Instant::now() >= deadline {
                return Err(RbcError::Timeout);
            }
            self.pump(deadline)?;
        }
    }

    /// Deliver the next in-order message of any sender in the current
    /// session.
    pub fn deliver(&mut self, timeout: Timeout) -> Result<(usize, Vec<u8>), RbcError> {
        let deadline = Instant::now() + timeout.duration();
        let sid = self.current_sid();
        loop {
            for from in 0..self.n {
                if let Some(payload) = self.pop_deliverable(&sid, from) {
                    return Ok((from, payload));
                }
            }
            if Instant::now() >= deadline {
                return Err(RbcError::Timeout);
            }
            self.pump(deadline)?;
        }
    }

    /// End-of-round barrier: every party announces the label, and the
    /// call succeeds once at least `n - t` distinct parties (including
    /// this one) were observed. A failed sync leaves all broadcast state
    /// intact.
    pub fn sync(&mut self, timeout: Timeout, label: &[u8]) -> bool {
        let deadline = Instant::now() + timeout.duration();
        let sid = self.current_sid();
        let frame = match encode_frame(TAG_SYNC, &sid, self.me as u16, 0, label) {
            Ok(frame) => frame,
            Err(_) => return false,
        };
        self.send_to_all(&frame);
        if self.handle_frame(self.me, &frame).is_err() {
            return false;
        }
        let key = (sid, label.to_vec());
        loop {
            let seen = self.sync_seen.get(&key).map(|s| s.len()).unwrap_or(0);
            if seen >= self.n - self.t {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::debug!(observed = seen, needed = self.n - self.t, "sync timed out");
                return false;
            }
            if self.pump(deadline).is_err() {
                return false;
            }
        }
    }

    /// Pull at most one frame off the wire and feed it into the voting
    /// state machine.
    fn pump(&mut self, deadline: Instant) -> Result<(), RbcError> {
        let budget = deadline
            .saturating_duration_since(Instant::now())
            .min(POLL_SLICE * self.n as u32);
        match self.aiou.receive(Scheduler::RoundRobin, budget) {
            Ok((from, frame)) => self.handle_frame(from, &frame),
            Err(ChannelError::Timeout) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn send_to_all(&mut self, frame: &[u8]) {
        for j in 0..self.n {
            if j == self.me {
                continue;
            }
            if let Err(e) = self.aiou.send(j, frame) {
                tracing::warn!(peer = j, error = %e, "broadcast send failed");
            }
        }
    }

    fn pop_deliverable(&mut self, sid: &[u8], from: usize) -> Option<Vec<u8>> {
        let key = (sid.to_vec(), from);
        let queue = self.deliverable.get_mut(&key)?;
        let next = self.next_deliver.entry(key.clone()).or_insert(0);
        if let Some(payload) = queue.remove(next) {
            *next += 1;
            Some(payload)
        } else {
            None
        }
    }

    fn handle_frame(&mut self, from: usize, frame: &[u8]) -> Result<(), RbcError> {
        let (tag, sid, sender, seq, body) = decode_frame(frame)?;
        let sender = sender as usize;
        if sender >= self.n {
            return Ok(());
        }
        match tag {
            TAG_SEND => {
                // integrity: a SEND only counts when it arrives over the
                // claimed sender's own channel
                if from != sender {
                    tracing::warn!(peer = from, claimed = sender, "forged SEND dropped");
                    return Ok(());
                }
                let digest = hash_payload(&body);
                let key = (sid.clone(), sender, seq);
                let slot = self.slots.entry(key).or_default();
                if slot.payload.is_some() {
                    return Ok(());
                }
                slot.payload = Some(body);
                slot.digest = Some(digest);
                let emit = if !slot.sent_echo {
                    slot.sent_echo = true;
                    true
                } else {
                    false
                };
                if emit {
                    let echo = encode_frame(TAG_ECHO, &sid, sender as u16, seq, &digest)?;
                    self.send_to_all(&echo);
                    self.handle_frame(self.me, &echo)?;
                }
                self.try_deliver(&sid, sender, seq);
            }
            TAG_ECHO | TAG_READY => {
                if body.len() != DIGEST_LEN {
                    return Ok(());
                }
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(&body);
                let echo_threshold = self.echo_threshold();
                let ready_threshold = self.t + 1;
                let key = (sid.clone(), sender, seq);
                let slot = self.slots.entry(key).or_default();
                if tag == TAG_ECHO {
                    slot.echoes.entry(digest).or_default().insert(from);
                } else {
                    slot.readys.entry(digest).or_default().insert(from);
                }
                let echo_count = slot.echoes.get(&digest).map(|s| s.len()).unwrap_or(0);
                let ready_count = slot.readys.get(&digest).map(|s| s.len()).unwrap_or(0);
                let amplify = !slot.sent_ready
                    && (echo_count >= echo_threshold || ready_count >= ready_threshold);
                if amplify {
                    slot.sent_ready = true;
                    let ready = encode_frame(TAG_READY, &sid, sender as u16, seq, &digest)?;
                    self.send_to_all(&ready);
                    self.handle_frame(self.me, &ready)?;
                }
                self.try_deliver(&sid, sender, seq);
            }
            TAG_SYNC => {
                self.sync_seen
                    .entry((sid, body))
                    .or_default()
                    .insert(from);
            }
            other => {
                tracing::warn!(tag = other, "unknown broadcast frame tag");
            }
        }
        Ok(())
    }

    /// Move a message into the delivery queue once its payload arrived
    /// and `2t + 1` matching READY votes accumulated.
    fn try_deliver(&mut self, sid: &[u8], sender: usize, seq: u64) {
        let key = (sid.to_vec(), sender, seq);
        let slot = match self.slots.get_mut(&key) {
            Some(slot) => slot,
            None => return,
        };
        if slot.delivered {
            return;
        }
        let digest = match slot.digest {
            Some(digest) => digest,
            None => return,
        };
        let readys = slot.readys.get(&digest).map(|s| s.len()).unwrap_or(0);
        if readys < 2 * self.t + 1 {
            return;
        }
        slot.delivered = true;
        let payload = slot.payload.take().unwrap_or_default();
        self.deliverable
            .entry((sid.to_vec(), sender))
            .or_default()
            .insert(seq, payload);
    }
}

fn hash_payload(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn encode_frame(
    tag: u8,
    sid: &[u8],
    sender: u16,
    seq: u64,
    body: &[u8],
) -> Result<Vec<u8>, RbcError> {
    let mut frame = Vec::with_capacity(sid.len() + body.len() + 20);
    {
        let mut codec = Codec::new(&mut frame);
        let err = |_| RbcError::BadParameter("frame encoding failed");
        codec.put_u8(tag).map_err(err)?;
        codec.put_var_bytes(sid).map_err(err)?;
        codec.put_u16(sender).map_err(err)?;
        codec.put_u64(seq).map_err(err)?;
        codec.put_var_bytes(body).map_err(err)?;
    }
    Ok(frame)
}

type Frame = (u8, Vec<u8>, u16, u64, Vec<u8>);

fn decode_frame(frame: &[u8]) -> Result<Frame, RbcError> {
    let mut codec = Codec::new(frame);
    let tag = codec.get_u8()?;
    let sid = codec.get_var_bytes(MAX_SESSION_ID)?;
    let sender = codec.get_u16()?;
    let seq = codec.get_u64()?;
    let body = codec.get_var_bytes(MAX_PAYLOAD)?;
    Ok((tag, sid, sender, seq, body))
}
