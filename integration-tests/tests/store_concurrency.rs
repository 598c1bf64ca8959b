// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Races between independent store handles sharing one pool directory.

use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Barrier},
    thread,
};

use integration_tests::{reopen, test_pool};
use test_log::test;
use tracing::info;

const CONTENDERS: usize = 16;

#[test]
fn should_let_exactly_one_contender_win_an_address() {
    let pool = test_pool().unwrap();
    let addr: IpAddr = "10.0.0.2".parse().unwrap();
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let store = reopen(&pool).unwrap();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let owner = format!("contender-{i}");
            barrier.wait();
            // Reserve needs no pool lock; the create-exclusive step decides
            // the race on its own.
            let won = store.reserve(&owner, addr).expect("reserve must not error");
            (owner, won)
        }));
    }

    let results: Vec<(String, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<&String> = results
        .iter()
        .filter(|(_, won)| *won)
        .map(|(owner, _)| owner)
        .collect();
    assert_eq!(winners.len(), 1, "exactly one contender may win, got {winners:?}");
    info!(winner = %winners[0], "race decided");

    // Exactly one record exists and it belongs to the winner.
    let record = std::fs::read_to_string(pool.store.data_dir().join("10.0.0.2")).unwrap();
    assert_eq!(&record, winners[0]);
    assert_eq!(
        pool.store.find_by_owner(winners[0]).unwrap(),
        Some(addr),
        "winner's reservation must be visible to every handle"
    );
}

#[test]
fn should_hand_out_distinct_addresses_under_the_pool_lock() {
    let pool = test_pool().unwrap();
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    // Each worker walks the pool under the lock until it wins an address,
    // the way a sequential allocation policy drives the store.
    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let store = reopen(&pool).unwrap();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let owner = format!("worker-{i}");
            barrier.wait();
            for octet in 2..=254u8 {
                let candidate = IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet));
                let guard = store.lock().unwrap();
                let won = store.reserve(&owner, candidate).unwrap();
                drop(guard);
                if won {
                    return (owner, candidate);
                }
            }
            panic!("pool exhausted before every worker got an address");
        }));
    }

    let mut assigned: Vec<(String, IpAddr)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    assigned.sort();
    let mut addresses: Vec<IpAddr> = assigned.iter().map(|(_, addr)| *addr).collect();
    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), CONTENDERS, "every worker must get its own address");

    // Every worker can find its own reservation afterwards.
    for (owner, addr) in &assigned {
        assert_eq!(pool.store.find_by_owner(owner).unwrap(), Some(*addr));
    }

    // The pointer names an address that was actually handed out.
    let last = pool.store.last_reserved_ip().unwrap();
    assert!(addresses.contains(&last));
}

#[test]
fn should_reclaim_concurrently_released_owners() {
    let pool = test_pool().unwrap();

    for i in 0..CONTENDERS {
        let owner = format!("worker-{i}");
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 1, i as u8));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 2, i as u8));
        assert!(pool.store.reserve(&owner, a).unwrap());
        assert!(pool.store.reserve(&owner, b).unwrap());
    }

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let store = reopen(&pool).unwrap();
        handles.push(thread::spawn(move || {
            let owner = format!("worker-{i}");
            let guard = store.lock().unwrap();
            store.release_all_by_owner(&owner).unwrap();
            drop(guard);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..CONTENDERS {
        let owner = format!("worker-{i}");
        assert_eq!(pool.store.find_by_owner(&owner).unwrap(), None);
    }
}
