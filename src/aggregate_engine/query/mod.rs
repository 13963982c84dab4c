//! Read-only tree walks: range aggregates, ranks, order statistics, and pagination.

mod aggregate;
mod paginate;

pub use aggregate::*;
pub use paginate::*;

#[cfg(test)]
mod query_tests {
    use super::*;
    use crate::{
        aggregate_engine::directory::{must_get_tree, Namespace, TreeRecord},
        aggregate_engine::mutation::{insert, Entry},
        aggregate_engine::node_store::Item,
        aggregate_engine::position::{bound_to_position, Bounds, KeyBound, Position, Side, Value},
        config::TreeConfig,
        error::{Error, Result},
        storage_engine::key_value_storage::KvMemory,
        storage_engine::mvcc_storage::{Mode, Transaction, MVCC},
    };
    use pretty_assertions::assert_eq;

    /// Builds a committed tree from `(key, id)` pairs, each summing to its key.
    fn build(entries: &[(i64, &str)], max_node_size: usize, lazy: bool) -> Result<MVCC> {
        let mvcc = MVCC::new(Box::new(KvMemory::new()));
        let mut txn = mvcc.begin()?;
        let config = TreeConfig::new().with_max_node_size(max_node_size).with_root_lazy(lazy);
        for (key, id) in entries {
            let entry = Entry::new(*key, *id).with_summand(*key as f64);
            insert(&mut txn, &Namespace::GLOBAL, entry, &config)?;
        }
        txn.commit()?;
        Ok(mvcc)
    }

    fn read(mvcc: &MVCC) -> Result<(Transaction, TreeRecord)> {
        let txn = mvcc.begin_with_mode(Mode::ReadOnly)?;
        let tree = must_get_tree(&txn, &Namespace::GLOBAL)?;
        Ok((txn, tree))
    }

    fn keys(items: &[Item]) -> Vec<Value> {
        items.iter().map(|item| item.position.key()).collect()
    }

    /// Keys 0..40, with a second id at every multiple of 5.
    fn mixed() -> Vec<(i64, &'static str)> {
        let mut entries: Vec<_> = (0..40).map(|k| (k, "a")).collect();
        entries.extend((0..40).step_by(5).map(|k| (k, "b")));
        entries.reverse();
        entries
    }

    fn sample_bounds() -> Vec<Bounds> {
        vec![
            Bounds::all(),
            Bounds::lower(KeyBound::inclusive(10i64)),
            Bounds::lower(KeyBound::exclusive(10i64)),
            Bounds::upper(KeyBound::inclusive(25i64)),
            Bounds::upper(KeyBound::exclusive(25i64)),
            Bounds::between(KeyBound::inclusive(5i64), KeyBound::exclusive(35i64)),
            Bounds::between(KeyBound::exclusive(5i64), KeyBound::inclusive(35i64)),
            Bounds::between(KeyBound::inclusive(15i64).with_id("b"), KeyBound::inclusive(20i64)),
            Bounds::between(KeyBound::inclusive(30i64), KeyBound::inclusive(10i64)),
            Bounds::lower(KeyBound::inclusive(100i64)),
        ]
    }

    /// The positions within bounds, in order, computed without the tree.
    fn expected(entries: &[(i64, &str)], bounds: &Bounds) -> Vec<Position> {
        let (lower, upper) = bounds.to_positions();
        let mut positions: Vec<_> = entries
            .iter()
            .map(|(k, id)| Position::new(Value::Int(*k), *id))
            .filter(|p| lower.as_ref().map_or(true, |l| l <= p))
            .filter(|p| upper.as_ref().map_or(true, |u| p < u))
            .collect();
        positions.sort();
        positions
    }

    #[test]
    fn one_to_hundred() -> Result<()> {
        let entries: Vec<_> = (1..=100).map(|k| (k, "x")).collect();
        for lazy in [true, false] {
            let mvcc = build(&entries, 4, lazy)?;
            let (txn, tree) = read(&mvcc)?;
            let tally = aggregate_between(&txn, &tree, None, None)?;
            assert_eq!(100, tally.count);
            assert_eq!(Some(5050.0), tally.sum.as_single());
            assert_eq!(Value::Int(1), at_offset(&txn, &tree, 0, None, None)?.position.key());
            let last = at_negative_offset(&txn, &tree, 0, None, None)?;
            assert_eq!(Value::Int(100), last.position.key());
            let fifty = bound_to_position(Side::Lower, &KeyBound::inclusive(50i64));
            assert_eq!(49, offset_of(&txn, &tree, &fifty, None)?);
            let fifty = bound_to_position(Side::Upper, &KeyBound::inclusive(50i64));
            assert_eq!(50, offset_until(&txn, &tree, &fifty, None)?);
            txn.commit()?;
        }
        Ok(())
    }

    #[test]
    fn bounded_aggregates() -> Result<()> {
        let entries = mixed();
        let mvcc = build(&entries, 2, true)?;
        let (txn, tree) = read(&mvcc)?;
        for bounds in sample_bounds() {
            let expected = expected(&entries, &bounds);
            let (lower, upper) = bounds.to_positions();
            let tally = aggregate_between(&txn, &tree, lower.as_ref(), upper.as_ref())?;
            assert_eq!(expected.len() as u64, tally.count, "{:?}", bounds);
            let sum: i64 = expected.iter().map(|p| match p.key() {
                Value::Int(k) => k,
                _ => 0,
            }).sum();
            assert_eq!(Some(sum as f64), tally.sum.as_single(), "{:?}", bounds);
        }
        txn.commit()
    }

    #[test]
    fn ranks_agree_with_counts() -> Result<()> {
        let entries = mixed();
        let mvcc = build(&entries, 3, false)?;
        let (txn, tree) = read(&mvcc)?;
        for bounds in sample_bounds() {
            let (lower, upper) = bounds.to_positions();
            let (lo, hi) = (lower.as_ref(), upper.as_ref());
            let count = aggregate_between(&txn, &tree, lo, hi)?.count;
            if let (Some(lower), Some(upper)) = (&lower, &upper) {
                if lower <= upper {
                    let ranks = offset_of(&txn, &tree, upper, None)?
                        - offset_of(&txn, &tree, lower, None)?;
                    assert_eq!(count, ranks, "{:?}", bounds);
                }
            }

            // Every offset selects the item of that rank, and the rank of each item is its offset.
            let expected = expected(&entries, &bounds);
            for (offset, position) in expected.iter().enumerate() {
                let item = at_offset(&txn, &tree, offset as u64, lo, hi)?;
                assert_eq!(position, &item.position);
                assert_eq!(offset as u64, offset_of(&txn, &tree, position, lo)?);
                let back = at_negative_offset(&txn, &tree, offset as u64, lo, hi)?;
                assert_eq!(&expected[expected.len() - 1 - offset], &back.position);
            }
            assert_eq!(
                Err(Error::RangeError { offset: count as i64, count }),
                at_offset(&txn, &tree, count, lo, hi)
            );
            assert_eq!(
                Err(Error::RangeError { offset: -(count as i64) - 1, count }),
                at_negative_offset(&txn, &tree, count, lo, hi)
            );
        }
        txn.commit()
    }

    #[test]
    fn pages_cover_the_range() -> Result<()> {
        let entries = mixed();
        let mvcc = build(&entries, 2, true)?;
        let (txn, tree) = read(&mvcc)?;
        for bounds in sample_bounds() {
            let (lower, upper) = bounds.to_positions();
            let (lo, hi) = (lower.as_ref(), upper.as_ref());
            for order in [Order::Asc, Order::Desc] {
                let mut expected = expected(&entries, &bounds);
                if order == Order::Desc {
                    expected.reverse();
                }
                for limit in [1, 3, 7, 100] {
                    let mut seen = Vec::new();
                    let mut cursor = None;
                    loop {
                        let page = paginate(&txn, &tree, lo, hi, order, cursor.as_ref(), limit)?;
                        assert!(page.items.len() <= limit);
                        seen.extend(page.items.into_iter().map(|item| item.position));
                        cursor = page.cursor;
                        if page.is_done {
                            break;
                        }
                    }
                    assert_eq!(expected, seen, "{:?} {:?} {}", bounds, order, limit);

                    let after = paginate(&txn, &tree, lo, hi, order, cursor.as_ref(), limit)?;
                    assert_eq!(Page::done(cursor.clone()), after);
                }
            }
        }
        txn.commit()
    }

    #[test]
    fn exact_page_fill_is_done() -> Result<()> {
        let entries: Vec<_> = (0..6).map(|k| (k, "x")).collect();
        let mvcc = build(&entries, 2, true)?;
        let (txn, tree) = read(&mvcc)?;
        let page = paginate(&txn, &tree, None, None, Order::Asc, None, 6)?;
        assert!(page.is_done);
        assert_eq!((0..6).map(Value::Int).collect::<Vec<_>>(), keys(&page.items));

        let page = paginate(&txn, &tree, None, None, Order::Desc, None, 4)?;
        assert!(!page.is_done);
        assert_eq!((2..6).rev().map(Value::Int).collect::<Vec<_>>(), keys(&page.items));
        txn.commit()
    }

    #[test]
    fn point_lookup() -> Result<()> {
        let entries = mixed();
        let mvcc = build(&entries, 2, false)?;
        let (txn, tree) = read(&mvcc)?;
        let item = get(&txn, &tree, &Position::new(Value::Int(15), "b"))?;
        assert_eq!(Some(Value::String("b".into())), item.map(|item| item.value));
        assert_eq!(None, get(&txn, &tree, &Position::new(Value::Int(16), "b"))?);
        assert_eq!(None, get(&txn, &tree, &Position::new(Value::Int(100), "a"))?);
        txn.commit()
    }
}
