//! Distributed coin flip (Jarecki-Lysyanskaya style): every party commits
//! to a random scalar, the commit round closes over reliable broadcast,
//! the openings are summed. An adversary controlling `t` parties can
//! neither predict nor bias the outcome beyond aborting the flip.

use crate::error::{ProtocolError, RoundLog};
use crate::wire::{expect_end, get_element, get_scalar};
use distkey_codec::Codec;
use distkey_group::{Commitment, CommitmentKey, Group, Open, Scalar, Validity};
use distkey_net::{RbcError, ReliableBroadcast, Timeout};
use rand_core::RngCore;

/// Distributed coin flip producing a common value in `Z_q`.
pub struct Edcf {
    group: Group,
    ck: CommitmentKey,
    n: usize,
    t: usize,
    me: usize,
}

impl Edcf {
    pub fn new(
        group: Group,
        ck: CommitmentKey,
        n: usize,
        t: usize,
        me: usize,
    ) -> Result<Self, ProtocolError> {
        if n == 0 || me >= n {
            return Err(ProtocolError::BadParameter("party index out of range"));
        }
        if 2 * t >= n {
            return Err(ProtocolError::BadParameter("threshold requires t < n/2"));
        }
        Ok(Edcf { group, ck, n, t, me })
    }

    /// Run one flip under the given session label. A failed flip must be
    /// retried under a fresh label, never the same one.
    pub fn flip<R: RngCore>(
        &self,
        label: &[u8],
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
    ) -> Result<Scalar, ProtocolError> {
        rbc.set_id(label);
        let result = self.run_flip(rbc, rng, timeout, log);
        rbc.unset_id();
        result
    }

    fn run_flip<R: RngCore>(
        &self,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
    ) -> Result<Scalar, ProtocolError> {
        let open = Open {
            m: Scalar::random(&self.group, rng),
            r: Scalar::random(&self.group, rng),
        };
        let commitment = self.ck.commit_with_open(&open);
        rbc.broadcast(&commitment.to_bytes())?;

        let mut commitments: Vec<Option<Commitment>> = vec![None; self.n];
        commitments[self.me] = Some(commitment);
        for j in 0..self.n {
            if j == self.me {
                continue;
            }
            match rbc.deliver_from(j, timeout) {
                Ok(bytes) => {
                    let mut codec = Codec::new(bytes.as_slice());
                    let parsed = get_element(&mut codec, &self.group)
                        .and_then(|e| expect_end(&mut codec).map(|()| Commitment::from(e)));
                    match parsed {
                        Ok(c) => commitments[j] = Some(c),
                        Err(e) => log.note(format!(
                            "P_{}: bad coin commitment from P_{}: {}",
                            self.me, j, e
                        )),
                    }
                }
                Err(RbcError::Timeout) => {
                    log.note(format!("P_{}: no coin commitment from P_{}", self.me, j))
                }
                Err(e) => return Err(e.into()),
            }
        }
        rbc.sync(timeout, b"coin commit");

        // the commit round is closed; open
        let mut opening = open.m.to_bytes();
        opening.extend_from_slice(&open.r.to_bytes());
        rbc.broadcast(&opening)?;

        let mut sum = open.m.clone();
        let mut opened = 1usize;
        for j in 0..self.n {
            if j == self.me {
                continue;
            }
            let bytes = match rbc.deliver_from(j, timeout) {
                Ok(bytes) => bytes,
                Err(RbcError::Timeout) => {
                    log.note(format!("P_{}: no coin opening from P_{}", self.me, j));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let commitment = match &commitments[j] {
                Some(c) => c,
                None => continue,
            };
            let mut codec = Codec::new(bytes.as_slice());
            let parsed = get_scalar(&mut codec, &self.group).and_then(|m| {
                let r = get_scalar(&mut codec, &self.group)?;
                expect_end(&mut codec)?;
                Ok(Open { m, r })
            });
            match parsed {
                Ok(candidate) => {
                    if commitment.verify(&self.ck, &candidate) == Validity::Valid {
                        sum = sum + &candidate.m;
                        opened += 1;
                    } else {
                        log.note(format!(
                            "P_{}: coin opening of P_{} does not match its commitment",
                            self.me, j
                        ));
                    }
                }
                Err(e) => log.note(format!(
                    "P_{}: bad coin opening from P_{}: {}",
                    self.me, j, e
                )),
            }
        }
        rbc.sync(timeout, b"coin open");

        if opened < self.n - self.t {
            return Err(ProtocolError::NotEnoughShares {
                got: opened,
                need: self.n - self.t,
            });
        }
        Ok(sum)
    }
}
