mod challenge_context;
mod dleq;
mod schnorr;

pub use challenge_context::ChallengeContext;
pub use dleq::DleqZkp;
pub use schnorr::SchnorrZkp;
