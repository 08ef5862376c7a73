//! Shared harness: one OS thread per party, wired with in-memory meshes
//! for direct traffic and broadcast traffic.

use distkey_group::Group;
use distkey_net::{memory_mesh, Link, MemoryLink, PointToPoint, ReliableBroadcast};
use num_bigint::BigUint;
use std::sync::Arc;
use std::thread;

pub fn test_group() -> Group {
    // p = 2039 = 2*1019 + 1, g = 4 generates the order-1019 subgroup
    Group::from_parts(
        BigUint::from(2039u32),
        BigUint::from(1019u32),
        BigUint::from(4u32),
        BigUint::from(2u32),
        false,
    )
    .unwrap()
}

pub fn boxed_links(row: Vec<Option<MemoryLink>>) -> Vec<Option<Box<dyn Link>>> {
    row.into_iter()
        .map(|l| l.map(|l| Box::new(l) as Box<dyn Link>))
        .collect()
}

/// Spawn `n` party threads, each holding its own unicast channels plus a
/// reliable broadcast instance with tolerance `(n-1)/3`, and collect the
/// per-party results in index order.
pub fn run_committee<T, F>(n: usize, key: &str, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, PointToPoint, ReliableBroadcast) -> T + Send + Sync + 'static,
{
    let t_rbc = (n - 1) / 3;
    let mut direct = memory_mesh(n);
    let mut bcast = memory_mesh(n);
    let f = Arc::new(f);
    let mut handles = Vec::new();
    for i in 0..n {
        let links = boxed_links(std::mem::take(&mut direct[i]));
        let blinks = boxed_links(std::mem::take(&mut bcast[i]));
        let key = key.to_string();
        let f = Arc::clone(&f);
        handles.push(thread::spawn(move || {
            let aiou = PointToPoint::new(i, links, &key, true, true);
            let rbc_aiou = PointToPoint::new(i, blinks, &key, true, true);
            let rbc = ReliableBroadcast::new(t_rbc, rbc_aiou).expect("rbc parameters");
            f(i, aiou, rbc)
        }));
    }
    handles
        .into_iter()
        .map(|h| h.join().expect("party thread panicked"))
        .collect()
}
