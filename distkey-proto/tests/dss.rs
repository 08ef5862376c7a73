//! Threshold DSS scenarios: signing with the full committee, signing
//! from republished state with a minimal quorum, proactive refresh, and
//! corrupted signature shares.

mod common;

use common::{run_committee, test_group};
use distkey_group::{CommitmentKey, Group, Scalar};
use distkey_net::Timeout;
use distkey_proto::{Dkg, RoundLog, ThresholdDss};
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

#[test]
fn sign_and_verify_with_full_committee() {
    assert!(distkey_proto::init(false));
    let n = 7;
    let t = 2;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss full");
    let signers: Vec<usize> = (0..n).collect();

    let results = {
        let group = group.clone();
        run_committee(n, "dss full", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dss = ThresholdDss::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dss.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            let signature = dss
                .sign(
                    &digest,
                    &signers,
                    &mut aiou,
                    &mut rbc,
                    &mut rng,
                    Timeout::Short,
                    &mut log,
                    false,
                )
                .unwrap();
            (dss.public_key().clone(), signature)
        })
    };

    let (y, signature) = &results[0];
    let digest = Scalar::from_u64(&group, 42);
    assert!(ThresholdDss::verify(&group, &digest, signature, y));
    for (other_y, other_sig) in &results {
        assert_eq!(other_y, y);
        assert_eq!(other_sig, signature);
    }
    // a different digest must not verify under the same signature
    let other = Scalar::from_u64(&group, 43);
    assert!(!ThresholdDss::verify(&group, &other, signature, y));
}

#[test]
fn minimal_quorum_signs_from_published_state() {
    assert!(distkey_proto::init(false));
    let n = 7;
    let t = 2;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss quorum");

    // phase 1: the full committee generates and publishes its state
    let records = {
        let group = group.clone();
        run_committee(n, "dss quorum keygen", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dkg = Dkg::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dkg.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            dkg.publish()
        })
    };

    // phase 2: a 2t+1 quorum reconvenes from the published state
    let signers: Vec<usize> = (0..2 * t + 1).collect();
    let quorum_records: Vec<String> = signers.iter().map(|&i| records[i].clone()).collect();
    let results = {
        let signers = signers.clone();
        run_committee(signers.len(), "dss quorum sign", move |p, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let dkg = Dkg::import(&quorum_records[p]).unwrap();
            let dss = ThresholdDss::from_dkg(dkg).unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            dss.sign(
                &digest,
                &signers,
                &mut aiou,
                &mut rbc,
                &mut rng,
                Timeout::Short,
                &mut log,
                false,
            )
            .map(|sig| (dss.public_key().clone(), sig))
            .unwrap()
        })
    };

    let (y, signature) = &results[0];
    let digest = Scalar::from_u64(&group, 42);
    assert!(ThresholdDss::verify(&group, &digest, signature, y));
}

#[test]
fn refresh_keeps_existing_and_new_signatures_valid() {
    assert!(distkey_proto::init(false));
    let n = 5;
    let t = 1;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss refresh");
    let signers: Vec<usize> = (0..n).collect();

    let results = {
        let group = group.clone();
        run_committee(n, "dss refresh", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dss = ThresholdDss::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dss.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            let before = dss
                .sign(&digest, &signers, &mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            dss.refresh(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 43);
            let after = dss
                .sign(&digest, &signers, &mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            (dss.public_key().clone(), before, after)
        })
    };

    let (y, before, after) = &results[0];
    assert!(ThresholdDss::verify(&group, &Scalar::from_u64(&group, 42), before, y));
    assert!(ThresholdDss::verify(&group, &Scalar::from_u64(&group, 43), after, y));
    for (other_y, _, _) in &results {
        assert_eq!(other_y, y);
    }
}

#[test]
fn corrupted_signature_shares_are_excluded() {
    assert!(distkey_proto::init(false));
    let n = 7;
    let t = 2;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss byzantine");
    let signers: Vec<usize> = (0..n).collect();
    // two corrupted signers still leave a 2t+1 honest quorum; corrupting
    // the first two positions forces the combiner off its first pick
    let faulty = [0usize, 1];

    let results = {
        let group = group.clone();
        run_committee(n, "dss byzantine", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dss = ThresholdDss::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dss.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            let signature = dss
                .sign(
                    &digest,
                    &signers,
                    &mut aiou,
                    &mut rbc,
                    &mut rng,
                    Timeout::Short,
                    &mut log,
                    faulty.contains(&i),
                )
                .unwrap();
            (dss.public_key().clone(), signature, log)
        })
    };

    let digest = Scalar::from_u64(&group, 42);
    for (i, (y, signature, _)) in results.iter().enumerate() {
        assert!(
            ThresholdDss::verify(&group, &digest, signature, y),
            "party {} ended with a bad signature",
            i
        );
    }
    // at least one honest party had to skip corrupted shares
    assert!(results
        .iter()
        .enumerate()
        .filter(|(i, _)| !faulty.contains(i))
        .any(|(_, (_, _, log))| log.lines().iter().any(|l| l.contains("subsets tried"))));
}

#[test]
fn maximum_threshold_committee_signs() {
    // t = (n-1)/2 is the largest tolerated threshold; the signing quorum
    // is then the whole committee and the Lagrange combination runs over
    // the single existing subset
    assert!(distkey_proto::init(false));
    let n = 5;
    let t = 2;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss max threshold");
    let signers: Vec<usize> = (0..n).collect();

    let results = {
        let group = group.clone();
        run_committee(n, "dss max threshold", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dss = ThresholdDss::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dss.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            let signature = dss
                .sign(
                    &digest,
                    &signers,
                    &mut aiou,
                    &mut rbc,
                    &mut rng,
                    Timeout::Short,
                    &mut log,
                    false,
                )
                .unwrap();
            (dss.public_key().clone(), signature)
        })
    };

    let (y, signature) = &results[0];
    let digest = Scalar::from_u64(&group, 42);
    assert!(ThresholdDss::verify(&group, &digest, signature, y));
    for (other_y, other_sig) in &results {
        assert_eq!(other_y, y);
        assert_eq!(other_sig, signature);
    }
}

#[test]
fn combination_search_covers_large_committees() {
    // n = 13, t = 4: the quorum is 2t+1 = 9 and there are C(13,9) = 715
    // candidate subsets. The t corrupted signers occupy the lowest
    // positions, so every subset before the lexicographically last one
    // contains a corrupted share and the combiner must walk the full
    // space. A 64-bit group order keeps a corrupted subset from passing
    // verification by accident along the way.
    assert!(distkey_proto::init(false));
    let n = 13;
    let t = 4;
    let group = Group::generate(128, 64, &mut ChaCha20Rng::from_seed([40u8; 32]));
    let ck = CommitmentKey::generate_from_seed(&group, b"dss wide committee");
    let signers: Vec<usize> = (0..n).collect();
    let faulty: Vec<usize> = (0..t).collect();

    let results = {
        let group = group.clone();
        let faulty = faulty.clone();
        run_committee(n, "dss wide committee", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dss = ThresholdDss::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dss.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            let digest = Scalar::from_u64(dss.dkg().group(), 42);
            let signature = dss
                .sign(
                    &digest,
                    &signers,
                    &mut aiou,
                    &mut rbc,
                    &mut rng,
                    Timeout::Short,
                    &mut log,
                    faulty.contains(&i),
                )
                .unwrap();
            (dss.public_key().clone(), signature, log)
        })
    };

    let digest = Scalar::from_u64(&group, 42);
    for (i, (y, signature, _)) in results.iter().enumerate() {
        assert!(
            ThresholdDss::verify(&group, &digest, signature, y),
            "party {} ended with a bad signature",
            i
        );
    }
    // the honest subset was the last one out, far past any small cap
    let tried = results
        .iter()
        .filter(|(_, _, log)| !log.is_empty())
        .filter_map(|(_, _, log)| {
            log.lines()
                .iter()
                .find(|l| l.contains("subsets tried"))
                .and_then(|l| l.split('(').nth(1))
                .and_then(|tail| tail.split(' ').next())
                .and_then(|digits| digits.parse::<usize>().ok())
        })
        .max()
        .expect("no party reported a subset search");
    assert!(tried > 256, "search stopped after {} subsets", tried);
}

#[test]
fn undersized_signer_set_is_rejected() {
    assert!(distkey_proto::init(false));
    let n = 3;
    let t = 1;
    let group = test_group();
    let ck = CommitmentKey::generate_from_seed(&group, b"dss undersized");

    let records = {
        let group = group.clone();
        run_committee(n, "dss undersized", move |i, mut aiou, mut rbc| {
            let mut rng = OsRng;
            let mut log = RoundLog::new();
            let mut dkg = Dkg::new(group.clone(), ck.clone(), n, t, i).unwrap();
            dkg.generate(&mut aiou, &mut rbc, &mut rng, Timeout::Short, &mut log, false)
                .unwrap();
            dkg.publish()
        })
    };

    let dss = ThresholdDss::from_dkg(Dkg::import(&records[0]).unwrap()).unwrap();
    let digest = Scalar::from_u64(&group, 42);
    let mut log = RoundLog::new();
    let mut rng = OsRng;

    // fewer than t+1 signers cannot possibly sign; the call must fail
    // before any channel is touched, so dummy channels suffice
    let mut mesh = distkey_net::memory_mesh(1);
    let links = common::boxed_links(std::mem::take(&mut mesh[0]));
    let mut aiou = distkey_net::PointToPoint::new(0, links, "unused", true, true);
    let mut bmesh = distkey_net::memory_mesh(1);
    let blinks = common::boxed_links(std::mem::take(&mut bmesh[0]));
    let rbc_aiou = distkey_net::PointToPoint::new(0, blinks, "unused", true, true);
    let mut rbc = distkey_net::ReliableBroadcast::new(0, rbc_aiou).unwrap();

    let result = dss.sign(
        &digest,
        &[0],
        &mut aiou,
        &mut rbc,
        &mut rng,
        Timeout::Short,
        &mut log,
        false,
    );
    assert!(matches!(
        result,
        Err(distkey_proto::ProtocolError::NotEnoughShares { .. })
    ));
}
