//! Property tests for archive and filter invariants.

use std::sync::Arc;

use proptest::prelude::*;
use txwatch::prelude::*;

const ADDRESSES: [&str; 4] = ["0xa1", "0xb2", "0xc3", "0xd4"];

fn arb_block() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..ADDRESSES.len(), 0..ADDRESSES.len()), 0..6)
}

fn chain(blocks: &[Vec<(usize, usize)>]) -> MockReader {
    let mut reader = MockReader::new(blocks.len().saturating_sub(1) as u64);
    for (n, txs) in blocks.iter().enumerate() {
        let txs = txs
            .iter()
            .enumerate()
            .map(|(i, &(from, to))| {
                Transaction::new(
                    ADDRESSES[from],
                    ADDRESSES[to],
                    format!("0x{:x}{:02x}", n, i),
                    (n * 10 + i) as u64,
                    n as u64,
                )
                .with_index(i as u64)
            })
            .collect();
        reader = reader.with_block(n as u64, txs);
    }
    reader
}

fn engine(reader: MockReader) -> Engine {
    Engine::new(
        EngineConfig::default(),
        Arc::new(reader),
        Arc::new(SubscriptionRegistry::new()),
        Arc::new(InMemoryTransactionStore::new()),
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_rescan_is_idempotent(
        blocks in prop::collection::vec(arb_block(), 1..8),
        watched in prop::sample::subsequence(ADDRESSES.to_vec(), 0..=ADDRESSES.len()),
    ) {
        runtime().block_on(async {
            let last = (blocks.len() - 1) as u64;
            let engine = engine(chain(&blocks));
            for address in &watched {
                engine.registry().add(address).unwrap();
            }

            engine.index_range(0, last).await;
            let first: Vec<_> = ADDRESSES
                .iter()
                .map(|a| engine.transactions(a).unwrap())
                .collect();

            engine.index_range(0, last).await;
            let second: Vec<_> = ADDRESSES
                .iter()
                .map(|a| engine.transactions(a).unwrap())
                .collect();

            prop_assert_eq!(first, second);
            Ok(())
        })?;
    }

    #[test]
    fn prop_archived_entries_involve_a_watched_address(
        blocks in prop::collection::vec(arb_block(), 1..8),
        watched in prop::sample::subsequence(ADDRESSES.to_vec(), 1..=ADDRESSES.len()),
    ) {
        runtime().block_on(async {
            let last = (blocks.len() - 1) as u64;
            let engine = engine(chain(&blocks));
            for address in &watched {
                engine.registry().add(address).unwrap();
            }
            engine.index_range(0, last).await;

            for address in ADDRESSES {
                let entries = engine.store().transactions(address).unwrap();
                for tx in &entries {
                    prop_assert!(tx.involves(address));
                    prop_assert!(watched.contains(&tx.from.as_str()) || watched.contains(&tx.to.as_str()));
                }
            }

            // Every qualifying transaction is archived under both parties
            let qualifying = blocks
                .iter()
                .flatten()
                .filter(|(f, t)| watched.contains(&ADDRESSES[*f]) || watched.contains(&ADDRESSES[*t]))
                .count();
            prop_assert_eq!(engine.store().transaction_count().unwrap(), qualifying);
            Ok(())
        })?;
    }

    #[test]
    fn prop_unwatched_address_reads_empty(
        blocks in prop::collection::vec(arb_block(), 1..8),
        pick in 0..ADDRESSES.len(),
    ) {
        runtime().block_on(async {
            let last = (blocks.len() - 1) as u64;
            let engine = engine(chain(&blocks));
            for address in ADDRESSES {
                engine.registry().add(address).unwrap();
            }
            engine.index_range(0, last).await;

            engine.unsubscribe(ADDRESSES[pick]).unwrap();
            prop_assert!(engine.transactions(ADDRESSES[pick]).unwrap().is_empty());
            Ok(())
        })?;
    }

    #[test]
    fn prop_cursor_never_regresses(
        ranges in prop::collection::vec((0u64..50, 0u64..50), 1..10),
    ) {
        runtime().block_on(async {
            let engine = engine(MockReader::new(100));
            let mut highest = 0;
            for (a, b) in ranges {
                let (start, end) = (a.min(b), a.max(b));
                engine.index_range(start, end).await;
                highest = highest.max(end);
                prop_assert_eq!(engine.current_block(), highest);
            }
            Ok(())
        })?;
    }
}
