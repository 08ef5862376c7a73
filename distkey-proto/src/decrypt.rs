//! Threshold ElGamal decryption over a DKG-shared key. Each party
//! publishes a decryption share with a Chaum-Pedersen proof that it used
//! its committed key share; `t+1` verified shares combine by Lagrange
//! interpolation into the blinding value, and the plaintext falls out.

use crate::dkg::Dkg;
use crate::error::{ProtocolError, RoundLog};
use crate::math::lagrange_coefficient;
use distkey_group::zkp::DleqZkp;
use distkey_group::{Group, GroupElement, Scalar};
use distkey_net::{RbcError, ReliableBroadcast, Timeout};
use num_bigint::BigUint;
use num_traits::One;
use rand_core::RngCore;

/// ElGamal ciphertext `(g^r, y^r · m)`. The components are kept raw;
/// `ThresholdDecryptor::check_ciphertext` decides whether they are
/// acceptable, and decryption refuses to run before that check passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    gk: BigUint,
    myk: BigUint,
}

impl Ciphertext {
    pub fn new(gk: BigUint, myk: BigUint) -> Self {
        Ciphertext { gk, myk }
    }

    /// Fixed-width encoding; `None` when a component does not fit the
    /// group's element width (such a ciphertext can never be valid).
    pub fn to_bytes(&self, group: &Group) -> Option<Vec<u8>> {
        let width = group.p_bytes();
        let gk = self.gk.to_bytes_be();
        let myk = self.myk.to_bytes_be();
        if gk.len() > width || myk.len() > width {
            return None;
        }
        let mut out = vec![0u8; 2 * width];
        out[width - gk.len()..width].copy_from_slice(&gk);
        out[2 * width - myk.len()..].copy_from_slice(&myk);
        Some(out)
    }

    pub fn from_bytes(group: &Group, bytes: &[u8]) -> Option<Self> {
        let width = group.p_bytes();
        if bytes.len() != 2 * width {
            return None;
        }
        Some(Ciphertext {
            gk: BigUint::from_bytes_be(&bytes[..width]),
            myk: BigUint::from_bytes_be(&bytes[width..]),
        })
    }
}

/// Encrypt a group element under the DKG public key.
pub fn encrypt<R: RngCore>(
    group: &Group,
    y: &GroupElement,
    m: &GroupElement,
    rng: &mut R,
) -> Ciphertext {
    let r = Scalar::random(group, rng);
    let gk = group.generator().pow(&r);
    let myk = y.pow(&r) * m;
    Ciphertext {
        gk: gk.value().clone(),
        myk: myk.value().clone(),
    }
}

/// One party's decryption share `r_i = gk^{x_i}` with the proof
/// `log_g v_i == log_gk r_i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptionShare {
    r_i: GroupElement,
    proof: DleqZkp,
}

impl DecryptionShare {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.r_i.to_bytes();
        out.extend_from_slice(&self.proof.to_bytes());
        out
    }

    pub fn from_bytes(group: &Group, bytes: &[u8]) -> Option<Self> {
        let p_width = group.p_bytes();
        let proof_width = 2 * group.q_bytes();
        if bytes.len() != p_width + proof_width {
            return None;
        }
        Some(DecryptionShare {
            r_i: GroupElement::from_bytes(group, &bytes[..p_width])?,
            proof: DleqZkp::from_bytes(group, &bytes[p_width..])?,
        })
    }
}

/// Threshold decryptor over an established key sharing.
pub struct ThresholdDecryptor {
    dkg: Dkg,
}

impl ThresholdDecryptor {
    pub fn new(dkg: Dkg) -> Result<Self, ProtocolError> {
        if !dkg.is_generated() {
            return Err(ProtocolError::BadParameter("key sharing not generated"));
        }
        Ok(ThresholdDecryptor { dkg })
    }

    pub fn dkg(&self) -> &Dkg {
        &self.dkg
    }

    /// Ciphertext sanity: `1 < gk, myk < p` and `gk^q == 1`. Returns the
    /// validated `gk` as a group element.
    pub fn check_ciphertext(&self, ct: &Ciphertext) -> Result<GroupElement, ProtocolError> {
        let group = self.dkg.group();
        let one = BigUint::one();
        if ct.gk <= one || &ct.gk >= group.p() || ct.myk <= one || &ct.myk >= group.p() {
            return Err(ProtocolError::NotInGroup);
        }
        GroupElement::from_biguint(group, ct.gk.clone()).ok_or(ProtocolError::NotInGroup)
    }

    /// Produce this party's decryption share.
    pub fn decryption_share<R: RngCore>(
        &self,
        ct: &Ciphertext,
        rng: &mut R,
    ) -> Result<DecryptionShare, ProtocolError> {
        let group = self.dkg.group();
        let gk = self.check_ciphertext(ct)?;
        let x_i = self.dkg.share().0;
        let r_i = gk.pow(x_i);
        let proof = DleqZkp::generate(
            &group.generator(),
            &gk,
            self.dkg.verification_key(self.dkg.own_index()),
            &r_i,
            x_i,
            rng,
        );
        Ok(DecryptionShare { r_i, proof })
    }

    /// Check a share of `party` against its DKG verification key.
    pub fn verify_share(&self, ct: &Ciphertext, party: usize, share: &DecryptionShare) -> bool {
        let group = self.dkg.group();
        let gk = match self.check_ciphertext(ct) {
            Ok(gk) => gk,
            Err(_) => return false,
        };
        share.proof.verify(
            &group.generator(),
            &gk,
            self.dkg.verification_key(party),
            &share.r_i,
        )
    }

    /// Combine verified shares: `R = Π r_i^{λ_i}`, `m = myk · R^{-1}`.
    /// Shares failing their proof are dropped; fewer than `t+1` good
    /// shares fail the decryption.
    pub fn combine(
        &self,
        ct: &Ciphertext,
        shares: &[(usize, DecryptionShare)],
        log: &mut RoundLog,
    ) -> Result<GroupElement, ProtocolError> {
        let group = self.dkg.group();
        self.check_ciphertext(ct)?;
        let need = self.dkg.threshold() + 1;

        let mut good: Vec<(u64, &GroupElement)> = Vec::new();
        for (party, share) in shares {
            if self.verify_share(ct, *party, share) {
                good.push((self.dkg.abscissa(*party), &share.r_i));
            } else {
                log.note(format!(
                    "P_{}: decryption share of P_{} rejected",
                    self.dkg.own_index(),
                    party
                ));
            }
        }
        if good.len() < need {
            return Err(ProtocolError::NotEnoughShares {
                got: good.len(),
                need,
            });
        }
        good.truncate(need);

        let xs: Vec<u64> = good.iter().map(|(x, _)| *x).collect();
        let mut blinding = GroupElement::identity(group);
        for (x, r_i) in &good {
            let lambda = lagrange_coefficient(group, &xs, *x)
                .ok_or(ProtocolError::Abort("colliding share abscissas"))?;
            blinding = blinding * r_i.pow(&lambda);
        }
        let m = (&ct.myk * blinding.inverse().value()) % group.p();
        GroupElement::from_biguint(group, m).ok_or(ProtocolError::NotInGroup)
    }

    /// Full decryption round: broadcast the own share, collect the
    /// others, combine. Ciphertext rejection happens before anything is
    /// sent.
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt<R: RngCore>(
        &self,
        ct: &Ciphertext,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<GroupElement, ProtocolError> {
        self.check_ciphertext(ct)?;
        rbc.set_id(b"threshold-decrypt");
        let result = self.run_decrypt(ct, rbc, rng, timeout, log, simulate_faulty_behaviour);
        rbc.unset_id();
        result
    }

    fn run_decrypt<R: RngCore>(
        &self,
        ct: &Ciphertext,
        rbc: &mut ReliableBroadcast,
        rng: &mut R,
        timeout: Timeout,
        log: &mut RoundLog,
        simulate_faulty_behaviour: bool,
    ) -> Result<GroupElement, ProtocolError> {
        let group = self.dkg.group();
        let me = self.dkg.own_index();
        let mut own = self.decryption_share(ct, rng)?;
        if simulate_faulty_behaviour {
            // publish a share for a shifted exponent; the proof cannot cover it
            own.r_i = own.r_i * self.check_ciphertext(ct)?;
            log.note(format!("P_{}: broadcasting a corrupted decryption share", me));
        }
        rbc.broadcast(&own.to_bytes())?;

        let mut shares: Vec<(usize, DecryptionShare)> = vec![(me, own)];
        for j in 0..self.dkg.parties() {
            if j == me {
                continue;
            }
            match rbc.deliver_from(j, timeout) {
                Ok(bytes) => match DecryptionShare::from_bytes(group, &bytes) {
                    Some(share) => shares.push((j, share)),
                    None => log.note(format!("P_{}: unparseable share from P_{}", me, j)),
                },
                Err(RbcError::Timeout) => {
                    log.note(format!("P_{}: no decryption share from P_{}", me, j))
                }
                Err(e) => return Err(e.into()),
            }
        }
        rbc.sync(timeout, b"decrypt shares");
        self.combine(ct, &shares, log)
    }
}
