//! Threshold DSS signatures in the style of Canetti, Gennaro, Jarecki,
//! Krawczyk and Rabin, built on the distributed key generation: an
//! ephemeral `k` is shared with a throwaway DKG per signature, inverted
//! with a jointly random blinding value, and the signature shares are
//! combined by Lagrange interpolation over the long-term DKG indices.

use crate::dkg::Dkg;
use crate::error::{ProtocolError, RoundLog};
use crate::math::{interpolate_at_zero, interpolate_at_zero_exponent};
use crate::wire::{expect_end, get_element, get_scalar};
use distkey_codec::Codec;
use distkey_group::{CommitmentKey, Group, GroupElement, Scalar};
use distkey_net::{PointToPoint, RbcError, ReliableBroadcast, Timeout};
use rand_core::RngCore;
use std::collections::BTreeSet;

const MAX_SIGN_ATTEMPTS: usize = 5;

/// Plain DSS signature pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: Scalar,
    pub s: Scalar,
}

/// Threshold DSS key state: the long-term signing key lives as a DKG
/// sharing, the public key `y` is ordinary DSS.
pub struct ThresholdDss {
    dkg: Dkg,
}

impl ThresholdDss {
    pub fn new(
        group: Group,
        ck: CommitmentKey,
        n: usize,
        t: usize,
        me: usize,
    ) -> Result<Self, ProtocolError> {
        Ok(ThresholdDss {
            dkg: Dkg::new(group, ck, n, t, me)?,
        })
    }

    /// Adopt an existing long-term key sharing.
    pub fn from_dkg(dkg: Dkg) -> Result<Self, ProtocolError> {
        if !dkg.is_generated() {
            return Err(ProtocolError::BadParameter("key sharing not generated"));
        }
        Ok(ThresholdDss { dkg })
    }

    pub fn dkg(&self) -> &Dkg {
        &self.dkg
    }

    pub fn public_key(&self) -> &GroupElement {
        self.dkg.public_key()
    }

    /// Generate the long-term key (a plain DKG run).
    pub fn generate<R: RngCore>(
        &mut self,
        aiou: &mut PointToPoint,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<(), ProtocolError> {
        self.dkg
            .generate(aiou, rbc, rng, timeout, log, simulate_faulty_behaviour)
    }

    /// Proactive refresh of the long-term key. The public key and all
    /// previously issued signatures stay valid.
    pub fn refresh<R: RngCore>(
        &mut self,
        aiou: &mut PointToPoint,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<(), ProtocolError> {
        self.dkg
            .refresh(aiou, rbc, rng, timeout, log, simulate_faulty_behaviour)
    }

    /// Sign a message digest with the quorum `signers` (DKG indices). The
    /// supplied channels connect exactly the quorum, position `p` on the
    /// wire being the party with DKG index `signers[p]`; Lagrange
    /// combination happens over the DKG indices.
    #[allow(clippy::too_many_arguments)]
    pub fn sign<R: RngCore>(
        &self,
        digest: &Scalar,
        signers: &[usize],
        aiou: &mut PointToPoint,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<Signature, ProtocolError> {
        let group = self.dkg.group().clone();
        let n = signers.len();
        let t = self.dkg.threshold();
        if n < t + 1 {
            return Err(ProtocolError::NotEnoughShares { got: n, need: t + 1 });
        }
        // the signature shares lie on a degree-2t polynomial
        let quorum = if t == 0 { 1 } else { 2 * t + 1 };
        if n < quorum {
            return Err(ProtocolError::NotEnoughShares { got: n, need: quorum });
        }
        let distinct: BTreeSet<usize> = signers.iter().copied().collect();
        if distinct.len() != n {
            return Err(ProtocolError::BadParameter("duplicate signer index"));
        }
        for &j in signers {
            if !self.dkg.qualified().contains(&j) {
                return Err(ProtocolError::Unqualified {
                    qualified: self.dkg.qualified().len(),
                    required: n,
                });
            }
        }
        let pos = signers
            .iter()
            .position(|&j| j == self.dkg.own_index())
            .ok_or(ProtocolError::BadParameter("own index not in signer set"))?;
        let abscissas: Vec<u64> = signers.iter().map(|&j| self.dkg.abscissa(j)).collect();

        for attempt in 0..MAX_SIGN_ATTEMPTS {
            rbc.set_id(format!("dss-sign-{}", attempt).as_bytes());
            let result = self.sign_attempt(
                digest,
                &group,
                &abscissas,
                pos,
                quorum,
                aiou,
                rbc,
                rng,
                timeout,
                log,
                simulate_faulty_behaviour,
            );
            rbc.unset_id();
            match result {
                Ok(Some(signature)) => return Ok(signature),
                // a zero r or s; start over with a fresh ephemeral key
                Ok(None) => log.note(format!(
                    "P_{}: degenerate ephemeral value, restarting signature",
                    self.dkg.own_index()
                )),
                Err(e) => return Err(e),
            }
        }
        Err(ProtocolError::Abort("signing attempts exhausted"))
    }

    #[allow(clippy::too_many_arguments)]
    fn sign_attempt<R: RngCore>(
        &self,
        digest: &Scalar,
        group: &Group,
        abscissas: &[u64],
        pos: usize,
        quorum: usize,
        aiou: &mut PointToPoint,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<Option<Signature>, ProtocolError> {
        let n = abscissas.len();
        let t = self.dkg.threshold();
        let ck = self.dkg.commitment_key().clone();

        // 1. ephemeral k as a throwaway DKG among the quorum
        let mut eph_k = Dkg::with_abscissas(
            group.clone(),
            ck.clone(),
            n,
            t,
            pos,
            abscissas.to_vec(),
        )?;
        rbc.set_id(b"ephemeral-k");
        let r_k = eph_k.generate(aiou, rbc, rng, timeout, log, false);
        rbc.unset_id();
        r_k?;

        // 2. blinding value a, jointly random the same way
        let mut eph_a = Dkg::with_abscissas(
            group.clone(),
            ck,
            n,
            t,
            pos,
            abscissas.to_vec(),
        )?;
        rbc.set_id(b"ephemeral-a");
        let r_a = eph_a.generate(aiou, rbc, rng, timeout, log, false);
        rbc.unset_id();
        r_a?;

        let k_i = eph_k.share().0.clone();
        let a_i = eph_a.share().0.clone();

        // 3. open mu = k * a; mu leaks nothing about k beyond blinding
        let mu_i = &k_i * &a_i;
        rbc.broadcast(&mu_i.to_bytes())?;
        let mut mu_points = Vec::with_capacity(n);
        for p in 0..n {
            let value = if p == pos {
                Some(mu_i.clone())
            } else {
                self.collect_scalar(rbc, p, timeout, group, log)?
            };
            if let Some(value) = value {
                mu_points.push((abscissas[p], value));
            }
        }
        if mu_points.len() < quorum {
            return Err(ProtocolError::NotEnoughShares {
                got: mu_points.len(),
                need: quorum,
            });
        }
        mu_points.truncate(quorum);
        let mu = match interpolate_at_zero(group, &mu_points) {
            Some(mu) if !mu.is_zero() => mu,
            _ => return Ok(None),
        };
        let mu_inv = match mu.inverse() {
            Some(inv) => inv,
            None => return Ok(None),
        };

        // 4. w_i = a_i * mu^-1 is a degree-t sharing of k^-1; the shares
        // of g^{k^-1} are publicly checkable against the a-DKG keys
        let w_i = &a_i * &mu_inv;
        let w_pub = group.generator().pow(&w_i);
        rbc.broadcast(&w_pub.to_bytes())?;
        let mut w_points = Vec::with_capacity(n);
        for p in 0..n {
            let value = if p == pos {
                Some(w_pub.clone())
            } else {
                self.collect_element(rbc, p, timeout, group, log)?
            };
            if let Some(value) = value {
                let expected = eph_a.verification_key(p).pow(&mu_inv);
                if value == expected {
                    w_points.push((abscissas[p], value));
                } else {
                    log.note(format!(
                        "P_{}: inversion share of position {} rejected",
                        self.dkg.own_index(),
                        p
                    ));
                }
            }
        }
        if w_points.len() < t + 1 {
            return Err(ProtocolError::NotEnoughShares {
                got: w_points.len(),
                need: t + 1,
            });
        }
        w_points.truncate(t + 1);
        let r_element = match interpolate_at_zero_exponent(group, &w_points) {
            Some(e) => e,
            None => return Ok(None),
        };
        let r = Scalar::from_biguint(group, r_element.value() % group.q());
        if r.is_zero() {
            return Ok(None);
        }

        // 5. signature shares s_i = k_i (H(m) + x_i r), degree 2t
        let x_i = self.dkg.share().0;
        let mut s_i = &k_i * (digest + x_i * &r);
        if simulate_faulty_behaviour {
            s_i = s_i + Scalar::one(group);
            log.note(format!(
                "P_{}: broadcasting a corrupted signature share",
                self.dkg.own_index()
            ));
        }
        rbc.broadcast(&s_i.to_bytes())?;
        let mut s_points = Vec::with_capacity(n);
        for p in 0..n {
            let value = if p == pos {
                Some(s_i.clone())
            } else {
                self.collect_scalar(rbc, p, timeout, group, log)?
            };
            if let Some(value) = value {
                s_points.push((abscissas[p], value));
            }
        }
        rbc.sync(timeout, b"signature shares");
        if s_points.len() < quorum {
            return Err(ProtocolError::NotEnoughShares {
                got: s_points.len(),
                need: quorum,
            });
        }

        // 6. combine: corrupted shares carry no marker, so search the
        // quorum-sized subsets until one interpolates to a verifying
        // signature. With at most t corrupted shares an all-honest
        // subset always exists, so exhausting the search (and only
        // that) rules out a valid signature.
        let mut tried = 0usize;
        let mut saw_zero = false;
        for subset in Combinations::new(s_points.len(), quorum) {
            tried += 1;
            let points: Vec<(u64, Scalar)> =
                subset.iter().map(|&i| s_points[i].clone()).collect();
            let s = match interpolate_at_zero(group, &points) {
                Some(s) => s,
                None => continue,
            };
            if s.is_zero() {
                // could be the honest subset hitting s = 0, which calls
                // for a fresh ephemeral key; a corrupted subset may land
                // on zero as well, so keep searching first
                saw_zero = true;
                continue;
            }
            let candidate = Signature {
                r: r.clone(),
                s,
            };
            if ThresholdDss::verify(group, digest, &candidate, self.dkg.public_key()) {
                if tried > 1 {
                    log.note(format!(
                        "P_{}: excluded corrupted signature shares ({} subsets tried)",
                        self.dkg.own_index(),
                        tried
                    ));
                }
                return Ok(Some(candidate));
            }
        }
        if saw_zero {
            return Ok(None);
        }
        Err(ProtocolError::Abort("no verifying share subset found"))
    }

    fn collect_scalar(
        &self,
        rbc: &mut ReliableBroadcast,
        from: usize,
        timeout: Timeout,
        group: &Group,
        log: &mut RoundLog,
    ) -> Result<Option<Scalar>, ProtocolError> {
        match rbc.deliver_from(from, timeout) {
            Ok(bytes) => {
                let mut codec = Codec::new(bytes.as_slice());
                let value = get_scalar(&mut codec, group)
                    .and_then(|v| expect_end(&mut codec).map(|()| v));
                match value {
                    Ok(v) => Ok(Some(v)),
                    Err(e) => {
                        log.note(format!(
                            "P_{}: unparseable value from position {}: {}",
                            self.dkg.own_index(),
                            from,
                            e
                        ));
                        Ok(None)
                    }
                }
            }
            Err(RbcError::Timeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn collect_element(
        &self,
        rbc: &mut ReliableBroadcast,
        from: usize,
        timeout: Timeout,
        group: &Group,
        log: &mut RoundLog,
    ) -> Result<Option<GroupElement>, ProtocolError> {
        match rbc.deliver_from(from, timeout) {
            Ok(bytes) => {
                let mut codec = Codec::new(bytes.as_slice());
                let value = get_element(&mut codec, group)
                    .and_then(|v| expect_end(&mut codec).map(|()| v));
                match value {
                    Ok(v) => Ok(Some(v)),
                    Err(e) => {
                        log.note(format!(
                            "P_{}: unparseable value from position {}: {}",
                            self.dkg.own_index(),
                            from,
                            e
                        ));
                        Ok(None)
                    }
                }
            }
            Err(RbcError::Timeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ordinary DSS verification: `0 < r, s < q`, `w = s^-1`,
    /// `u1 = H(m) w`, `u2 = r w`, accept iff `((g^u1 y^u2) mod p) mod q == r`.
    pub fn verify(group: &Group, digest: &Scalar, signature: &Signature, y: &GroupElement) -> bool {
        if signature.r.is_zero() || signature.s.is_zero() {
            return false;
        }
        let w = match signature.s.inverse() {
            Some(w) => w,
            None => return false,
        };
        let u1 = digest * &w;
        let u2 = &signature.r * &w;
        let v = group.generator().pow(&u1) * y.pow(&u2);
        let v = Scalar::from_biguint(group, v.value() % group.q());
        v == signature.r
    }
}

/// Lexicographic k-subsets of `0..n`.
struct Combinations {
    n: usize,
    k: usize,
    current: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Combinations {
            n,
            k,
            current: (0..k).collect(),
            done: k > n || k == 0,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let result = self.current.clone();
        // advance to the next lexicographic combination
        let mut i = self.k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.current[i] < self.n - self.k + i {
                self.current[i] += 1;
                for j in i + 1..self.k {
                    self.current[j] = self.current[j - 1] + 1;
                }
                break;
            }
        }
        Some(result)
    }
}
