//! The public face of the crate: a forest of aggregate trees over a transactional store.

use crate::{
    aggregate_engine::directory::{get_tree, scan_trees, Namespace, TreeId, TreeRecord},
    aggregate_engine::mutation::{self, Entry},
    aggregate_engine::node_store::{Item, SumMode, Summand, Tally},
    aggregate_engine::position::{bound_to_position, Bounds, KeyBound, Position, Side, Value},
    aggregate_engine::query::{self, Order, Page},
    aggregate_engine::validate,
    config::ForestConfig,
    error::{Error, Result},
    storage_engine::key_value_storage::{KvMemory, KvStore},
    storage_engine::mvcc_storage::{Mode, Status, Transaction, MVCC},
};
use log::debug;
use rand::Rng;

/// Page size used by the iterators when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A count or sum query against one namespace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RangeQuery {
    pub namespace: Namespace,
    pub bounds: Bounds,
}

/// An order statistic query. Negative offsets count back from the end, -1 being the last item.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AtQuery {
    pub namespace: Namespace,
    pub offset: i64,
    pub bounds: Bounds,
}

/// Options of `Forest::index_of`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexOptions {
    /// Restricts the key to a single id.
    pub id: Option<String>,
    pub bounds: Bounds,
    pub order: Order,
}

/// A `Forest::paginate` request.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRequest {
    pub bounds: Bounds,
    pub order: Order,
    pub cursor: Option<Position>,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            bounds: Bounds::all(),
            order: Order::Asc,
            cursor: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Parameters of `Forest::clear`. Unset fields keep their previous values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClearOptions {
    pub max_node_size: Option<usize>,
    pub root_lazy: Option<bool>,
}

/// A page of namespaces, in tree id order.
#[derive(Clone, Debug, PartialEq)]
pub struct NamespacePage {
    pub namespaces: Vec<Namespace>,
    pub cursor: Option<TreeId>,
    pub is_done: bool,
}

/// A forest of order-statistics trees, one per namespace.
///
/// Every operation runs in its own transaction. Writes that hit a serialization conflict are
/// retried from scratch up to `ForestConfig::max_retries` times; reads use read-only snapshots and
/// never conflict. Namespaces without a tree read as empty.
#[derive(Clone)]
pub struct Forest {
    mvcc: MVCC,
    config: ForestConfig,
}

impl Forest {
    /// Creates a forest held in memory.
    pub fn new(config: ForestConfig) -> Result<Self> {
        Self::with_store(Box::new(KvMemory::new()), config)
    }

    /// Creates a forest on top of the given store.
    pub fn with_store(store: Box<dyn KvStore>, config: ForestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { mvcc: MVCC::new(store), config })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Returns the status of the underlying store.
    pub fn status(&self) -> Result<Status> {
        self.mvcc.status()
    }

    /// Runs a read-only closure in a snapshot transaction.
    fn read<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let txn = self.mvcc.begin_with_mode(Mode::ReadOnly)?;
        let result = f(&txn);
        txn.commit()?;
        result
    }

    /// Runs a closure in a read-write transaction, committing on success and rolling back on
    /// error. Conflicts are retried with a fresh transaction.
    fn write<T>(&self, mut f: impl FnMut(&mut Transaction) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let mut txn = self.mvcc.begin()?;
            let id = txn.id();
            let result = match f(&mut txn) {
                Ok(value) => txn.commit().map(|()| value),
                Err(err) => txn.rollback().and(Err(err)),
            };
            match result {
                Err(Error::Serialization) if attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!("Txn {} conflicted, retrying (attempt {})", id, attempt);
                }
                result => return result,
            }
        }
    }

    /// Runs a query against a namespace's tree, or returns `empty` if there is none.
    fn with_tree<T>(
        txn: &Transaction,
        namespace: &Namespace,
        empty: impl FnOnce() -> Result<T>,
        f: impl FnOnce(&TreeRecord) -> Result<T>,
    ) -> Result<T> {
        match get_tree(txn, namespace)? {
            Some(tree) => f(&tree),
            None => empty(),
        }
    }

    fn aggregate_in(txn: &Transaction, namespace: &Namespace, bounds: &Bounds) -> Result<Tally> {
        let (lower, upper) = bounds.to_positions();
        Self::with_tree(
            txn,
            namespace,
            || Ok(Tally::empty(SumMode::Single)),
            |tree| query::aggregate_between(txn, tree, lower.as_ref(), upper.as_ref()),
        )
    }

    fn at_in(
        txn: &Transaction,
        namespace: &Namespace,
        offset: i64,
        bounds: &Bounds,
    ) -> Result<Item> {
        let (lower, upper) = bounds.to_positions();
        Self::with_tree(
            txn,
            namespace,
            || Err(Error::RangeError { offset, count: 0 }),
            |tree| match offset {
                offset if offset >= 0 => {
                    query::at_offset(txn, tree, offset as u64, lower.as_ref(), upper.as_ref())
                }
                offset => query::at_negative_offset(
                    txn,
                    tree,
                    offset.unsigned_abs() - 1,
                    lower.as_ref(),
                    upper.as_ref(),
                ),
            },
        )
    }

    /// Counts and sums the items within bounds.
    pub fn aggregate(&self, namespace: &Namespace, bounds: &Bounds) -> Result<Tally> {
        self.read(|txn| Self::aggregate_in(txn, namespace, bounds))
    }

    /// Counts the items within bounds.
    pub fn count(&self, namespace: &Namespace, bounds: &Bounds) -> Result<u64> {
        Ok(self.aggregate(namespace, bounds)?.count)
    }

    /// Sums the summands of the items within bounds.
    pub fn sum(&self, namespace: &Namespace, bounds: &Bounds) -> Result<Summand> {
        Ok(self.aggregate(namespace, bounds)?.sum)
    }

    /// Runs several count queries against a single snapshot.
    pub fn count_batch(&self, queries: &[RangeQuery]) -> Result<Vec<u64>> {
        self.read(|txn| {
            queries
                .iter()
                .map(|q| Ok(Self::aggregate_in(txn, &q.namespace, &q.bounds)?.count))
                .collect()
        })
    }

    /// Runs several sum queries against a single snapshot.
    pub fn sum_batch(&self, queries: &[RangeQuery]) -> Result<Vec<Summand>> {
        self.read(|txn| {
            queries
                .iter()
                .map(|q| Ok(Self::aggregate_in(txn, &q.namespace, &q.bounds)?.sum))
                .collect()
        })
    }

    /// Returns the item at an offset within bounds. Negative offsets count from the end.
    pub fn at(&self, namespace: &Namespace, offset: i64, bounds: &Bounds) -> Result<Item> {
        self.read(|txn| Self::at_in(txn, namespace, offset, bounds))
    }

    /// Runs several order statistic queries against a single snapshot.
    pub fn at_batch(&self, queries: &[AtQuery]) -> Result<Vec<Item>> {
        self.read(|txn| {
            queries.iter().map(|q| Self::at_in(txn, &q.namespace, q.offset, &q.bounds)).collect()
        })
    }

    /// Returns the index of a key within bounds: in ascending order, the number of items before
    /// the first item at or after the key; in descending order, the number of items after the
    /// last item at or before it.
    pub fn index_of(
        &self,
        namespace: &Namespace,
        key: impl Into<Value>,
        options: &IndexOptions,
    ) -> Result<u64> {
        let bound = KeyBound { key: key.into(), id: options.id.clone(), inclusive: true };
        let (lower, upper) = options.bounds.to_positions();
        self.read(|txn| {
            Self::with_tree(txn, namespace, || Ok(0), |tree| match options.order {
                Order::Asc => {
                    let position = bound_to_position(Side::Lower, &bound);
                    query::offset_of(txn, tree, &position, lower.as_ref())
                }
                Order::Desc => {
                    let position = bound_to_position(Side::Upper, &bound);
                    query::offset_until(txn, tree, &position, upper.as_ref())
                }
            })
        })
    }

    /// Returns the smallest item within bounds.
    pub fn min(&self, namespace: &Namespace, bounds: &Bounds) -> Result<Option<Item>> {
        self.first(namespace, bounds, Order::Asc)
    }

    /// Returns the largest item within bounds.
    pub fn max(&self, namespace: &Namespace, bounds: &Bounds) -> Result<Option<Item>> {
        self.first(namespace, bounds, Order::Desc)
    }

    fn first(&self, namespace: &Namespace, bounds: &Bounds, order: Order) -> Result<Option<Item>> {
        let request = PageRequest { bounds: bounds.clone(), order, cursor: None, page_size: 1 };
        Ok(self.paginate(namespace, &request)?.items.pop())
    }

    /// Returns an item within bounds chosen uniformly at random, or `None` if there are none.
    pub fn random(&self, namespace: &Namespace, bounds: &Bounds) -> Result<Option<Item>> {
        self.read(|txn| {
            let count = Self::aggregate_in(txn, namespace, bounds)?.count;
            if count == 0 {
                return Ok(None);
            }
            let offset = rand::thread_rng().gen_range(0..count);
            Self::at_in(txn, namespace, offset as i64, bounds).map(Some)
        })
    }

    /// Returns a page of items within bounds, continuing after the request's cursor.
    pub fn paginate(&self, namespace: &Namespace, request: &PageRequest) -> Result<Page> {
        let (lower, upper) = request.bounds.to_positions();
        self.read(|txn| {
            Self::with_tree(
                txn,
                namespace,
                || Ok(Page::done(request.cursor.clone())),
                |tree| {
                    query::paginate(
                        txn,
                        tree,
                        lower.as_ref(),
                        upper.as_ref(),
                        request.order,
                        request.cursor.as_ref(),
                        request.page_size,
                    )
                },
            )
        })
    }

    /// Iterates over all items within bounds, fetching one page per transaction.
    pub fn iter(&self, namespace: &Namespace, bounds: Bounds, order: Order) -> Iter<'_> {
        Iter {
            forest: self,
            namespace: namespace.clone(),
            request: PageRequest { bounds, order, ..Default::default() },
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Looks up the item at an exact key and id.
    pub fn get(
        &self,
        namespace: &Namespace,
        key: impl Into<Value>,
        id: &str,
    ) -> Result<Option<Item>> {
        let position = Position::new(key.into(), id);
        self.read(|txn| {
            Self::with_tree(txn, namespace, || Ok(None), |tree| query::get(txn, tree, &position))
        })
    }

    /// Inserts an entry, failing with `DuplicateKey` if its key and id are taken.
    pub fn insert(&self, namespace: &Namespace, entry: Entry) -> Result<()> {
        self.write(|txn| mutation::insert(txn, namespace, entry.clone(), &self.config.tree))
    }

    /// Inserts an entry unless its key and id are taken. Returns whether it was inserted.
    pub fn insert_if_does_not_exist(&self, namespace: &Namespace, entry: Entry) -> Result<bool> {
        self.write(|txn| {
            mutation::insert_if_absent(txn, namespace, entry.clone(), &self.config.tree)
        })
    }

    /// Deletes the item at a key and id, failing with `NotFound` if there is none.
    pub fn delete(&self, namespace: &Namespace, key: impl Into<Value>, id: &str) -> Result<Item> {
        let position = Position::new(key.into(), id);
        self.write(|txn| mutation::delete(txn, namespace, &position))
    }

    /// Deletes the item at a key and id if there is one.
    pub fn delete_if_exists(
        &self,
        namespace: &Namespace,
        key: impl Into<Value>,
        id: &str,
    ) -> Result<Option<Item>> {
        let position = Position::new(key.into(), id);
        self.write(|txn| mutation::delete_if_exists(txn, namespace, &position))
    }

    /// Atomically moves the item at a key and id to a new entry, possibly in another namespace.
    pub fn replace(
        &self,
        namespace: &Namespace,
        key: impl Into<Value>,
        id: &str,
        new_namespace: &Namespace,
        entry: Entry,
    ) -> Result<()> {
        let position = Position::new(key.into(), id);
        self.write(|txn| {
            let entry = entry.clone();
            mutation::replace(txn, namespace, &position, new_namespace, entry, &self.config.tree)
        })
    }

    /// Like `replace`, but tolerates a missing source and overwrites an existing target.
    pub fn replace_or_insert(
        &self,
        namespace: &Namespace,
        key: impl Into<Value>,
        id: &str,
        new_namespace: &Namespace,
        entry: Entry,
    ) -> Result<()> {
        let position = Position::new(key.into(), id);
        self.write(|txn| {
            mutation::replace_or_insert(
                txn,
                namespace,
                &position,
                new_namespace,
                entry.clone(),
                &self.config.tree,
            )
        })
    }

    /// Removes all items of a namespace, optionally changing its tree parameters.
    pub fn clear(&self, namespace: &Namespace, options: &ClearOptions) -> Result<()> {
        self.write(|txn| {
            let ClearOptions { max_node_size, root_lazy } = *options;
            mutation::clear(txn, namespace, max_node_size, root_lazy, &self.config.tree)?;
            Ok(())
        })
    }

    /// Stops maintaining the root aggregate on writes, so that writers to different subtrees
    /// stop contending on the root.
    pub fn make_root_lazy(&self, namespace: &Namespace) -> Result<()> {
        self.set_root_lazy(namespace, true)
    }

    /// Switches the root aggregate between lazy and eager maintenance.
    pub fn set_root_lazy(&self, namespace: &Namespace, lazy: bool) -> Result<()> {
        self.write(|txn| mutation::set_root_lazy(txn, namespace, lazy, &self.config.tree))
    }

    /// Returns a page of namespaces that have a tree.
    pub fn paginate_namespaces(
        &self,
        cursor: Option<TreeId>,
        page_size: usize,
    ) -> Result<NamespacePage> {
        self.read(|txn| {
            let (trees, is_done) = scan_trees(txn, cursor, page_size.max(1))?;
            Ok(NamespacePage {
                cursor: trees.last().map(|tree| tree.id).or(cursor),
                namespaces: trees.into_iter().map(|tree| tree.namespace).collect(),
                is_done,
            })
        })
    }

    /// Iterates over all namespaces that have a tree.
    pub fn iter_namespaces(&self, page_size: usize) -> NamespaceIter<'_> {
        NamespaceIter {
            forest: self,
            page_size,
            cursor: None,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Clears every namespace, one transaction each.
    pub fn clear_all(&self, options: &ClearOptions) -> Result<()> {
        for namespace in self.all_namespaces()? {
            self.clear(&namespace, options)?;
        }
        Ok(())
    }

    /// Makes the root of every namespace lazy, one transaction each.
    pub fn make_all_roots_lazy(&self) -> Result<()> {
        for namespace in self.all_namespaces()? {
            self.make_root_lazy(&namespace)?;
        }
        Ok(())
    }

    fn all_namespaces(&self) -> Result<Vec<Namespace>> {
        self.iter_namespaces(DEFAULT_PAGE_SIZE).collect()
    }

    /// Checks every structural invariant of a namespace's tree. A missing tree is valid.
    pub fn validate(&self, namespace: &Namespace) -> Result<()> {
        self.read(|txn| match get_tree(txn, namespace)? {
            Some(tree) => validate::validate(txn, &tree).map(|_| ()),
            None => Ok(()),
        })
    }
}

/// Iterator over the items of a namespace, fetching a page at a time.
pub struct Iter<'a> {
    forest: &'a Forest,
    namespace: Namespace,
    request: PageRequest,
    buffer: std::vec::IntoIter<Item>,
    done: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            match self.forest.paginate(&self.namespace, &self.request) {
                Ok(page) => {
                    self.done = page.is_done;
                    self.request.cursor = page.cursor;
                    self.buffer = page.items.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Iterator over namespaces, fetching a page at a time.
pub struct NamespaceIter<'a> {
    forest: &'a Forest,
    page_size: usize,
    cursor: Option<TreeId>,
    buffer: std::vec::IntoIter<Namespace>,
    done: bool,
}

impl<'a> Iterator for NamespaceIter<'a> {
    type Item = Result<Namespace>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(namespace) = self.buffer.next() {
                return Some(Ok(namespace));
            }
            if self.done {
                return None;
            }
            match self.forest.paginate_namespaces(self.cursor, self.page_size) {
                Ok(page) => {
                    self.done = page.is_done;
                    self.cursor = page.cursor;
                    self.buffer = page.namespaces.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate_engine::position::RawBounds,
        config::TreeConfig,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    fn forest(max_node_size: usize, root_lazy: bool) -> Result<Forest> {
        let tree = TreeConfig::new().with_max_node_size(max_node_size).with_root_lazy(root_lazy);
        Forest::new(ForestConfig::new().with_tree(tree))
    }

    fn scored(key: i64) -> Entry {
        Entry::new(key, format!("{}", key)).with_summand(key as f64)
    }

    fn key_of(item: &Item) -> Value {
        item.position.key()
    }

    #[test]
    fn one_to_hundred() -> Result<()> {
        let forest = forest(4, true)?;
        let ns = Namespace::GLOBAL;
        for key in 1..=100 {
            forest.insert(&ns, scored(key))?;
        }
        let all = Bounds::all();
        assert_eq!(Some(5050.0), forest.sum(&ns, &all)?.as_single());
        assert_eq!(100, forest.count(&ns, &all)?);
        assert_eq!(Value::Int(1), key_of(&forest.at(&ns, 0, &all)?));
        assert_eq!(Value::Int(100), key_of(&forest.at(&ns, -1, &all)?));
        assert_eq!(Value::Int(98), key_of(&forest.at(&ns, -3, &all)?));
        assert_eq!(49, forest.index_of(&ns, 50i64, &IndexOptions::default())?);
        let desc = IndexOptions { order: Order::Desc, ..Default::default() };
        assert_eq!(50, forest.index_of(&ns, 50i64, &desc)?);
        assert_eq!(
            Err(Error::RangeError { offset: 100, count: 100 }),
            forest.at(&ns, 100, &all)
        );
        assert_eq!(
            Err(Error::RangeError { offset: -101, count: 100 }),
            forest.at(&ns, -101, &all)
        );
        forest.validate(&ns)
    }

    #[test]
    fn multi_metric_sums() -> Result<()> {
        let forest = forest(16, true)?;
        let ns = Namespace::new("papers");
        let metrics = |c: f64, m: f64| -> Summand {
            [("citations", c), ("mentions", m)].into_iter().collect()
        };
        forest.insert(&ns, Entry::new(1i64, "a").with_summand(metrics(2.0, 1.0)))?;
        forest.insert(&ns, Entry::new(2i64, "b").with_summand(metrics(3.0, 0.0)))?;
        assert_eq!(metrics(5.0, 1.0), forest.sum(&ns, &Bounds::all())?);
        assert!(matches!(
            forest.insert(&ns, Entry::new(3i64, "c").with_summand(1.0)),
            Err(Error::ModeConflict { .. })
        ));
        assert_eq!(2, forest.count(&ns, &Bounds::all())?);
        Ok(())
    }

    #[test]
    fn root_strategy_does_not_change_results() -> Result<()> {
        let forest = forest(2, true)?;
        let ns = Namespace::GLOBAL;
        for key in 0..40 {
            forest.insert(&ns, scored((key * 7) % 40))?;
        }
        let bounds = [
            Bounds::all(),
            Bounds::between(KeyBound::inclusive(5i64), KeyBound::exclusive(30i64)),
        ];
        let results = |forest: &Forest| -> Result<Vec<Tally>> {
            bounds.iter().map(|b| forest.aggregate(&ns, b)).collect()
        };
        let lazy = results(&forest)?;

        forest.set_root_lazy(&ns, false)?;
        forest.validate(&ns)?;
        assert_eq!(lazy, results(&forest)?);

        forest.insert(&ns, scored(100))?;
        forest.delete(&ns, 100i64, "100")?;
        assert_eq!(lazy, results(&forest)?);

        forest.make_root_lazy(&ns)?;
        forest.validate(&ns)?;
        assert_eq!(lazy, results(&forest)?);
        Ok(())
    }

    #[test]
    fn missing_namespace_reads_empty() -> Result<()> {
        let forest = forest(16, true)?;
        let ns = Namespace::new("nothing");
        let all = Bounds::all();
        assert_eq!(0, forest.count(&ns, &all)?);
        assert_eq!(Summand::Single(0.0), forest.sum(&ns, &all)?);
        assert_eq!(Err(Error::RangeError { offset: 0, count: 0 }), forest.at(&ns, 0, &all));
        assert_eq!(None, forest.min(&ns, &all)?);
        assert_eq!(None, forest.random(&ns, &all)?);
        assert_eq!(0, forest.index_of(&ns, 1i64, &IndexOptions::default())?);
        assert!(forest.paginate(&ns, &PageRequest::default())?.is_done);
        assert_eq!(None, forest.get(&ns, 1i64, "1")?);

        assert_eq!(
            Err(Error::TreeNotFound("\"nothing\"".into())),
            forest.delete(&ns, 1i64, "1")
        );
        assert_eq!(None, forest.delete_if_exists(&ns, 1i64, "1")?);
        assert!(forest.iter_namespaces(10).next().is_none());
        Ok(())
    }

    #[test]
    fn idempotent_writes() -> Result<()> {
        let forest = forest(2, true)?;
        let ns = Namespace::GLOBAL;
        assert!(forest.insert_if_does_not_exist(&ns, scored(1))?);
        assert!(!forest.insert_if_does_not_exist(&ns, scored(1).with_summand(9.0))?);
        assert_eq!(Some(1.0), forest.sum(&ns, &Bounds::all())?.as_single());

        forest.replace_or_insert(&ns, 5i64, "5", &ns, scored(5))?;
        forest.replace_or_insert(&ns, 5i64, "5", &ns, scored(5))?;
        assert_eq!(2, forest.count(&ns, &Bounds::all())?);

        assert!(forest.delete_if_exists(&ns, 5i64, "5")?.is_some());
        assert!(forest.delete_if_exists(&ns, 5i64, "5")?.is_none());
        assert_eq!(1, forest.count(&ns, &Bounds::all())?);
        forest.validate(&ns)
    }

    #[test]
    fn failed_replace_changes_nothing() -> Result<()> {
        let forest = forest(2, true)?;
        let (from, to) = (Namespace::new("from"), Namespace::new("to"));
        forest.insert(&from, scored(1))?;
        forest.insert(&to, scored(2))?;

        assert!(matches!(
            forest.replace(&from, 1i64, "1", &to, scored(2)),
            Err(Error::DuplicateKey(_))
        ));
        assert!(forest.get(&from, 1i64, "1")?.is_some());
        assert_eq!(1, forest.count(&to, &Bounds::all())?);

        forest.replace(&from, 1i64, "1", &to, scored(3))?;
        assert_eq!(0, forest.count(&from, &Bounds::all())?);
        assert_eq!(Some(5.0), forest.sum(&to, &Bounds::all())?.as_single());
        Ok(())
    }

    #[test]
    fn min_max_random_and_iter() -> Result<()> {
        let forest = forest(2, true)?;
        let ns = Namespace::new(7i64);
        for key in 0..30 {
            forest.insert(&ns, scored(key))?;
        }
        let bounds = Bounds::between(KeyBound::exclusive(10i64), KeyBound::inclusive(20i64));
        assert_eq!(Some(Value::Int(11)), forest.min(&ns, &bounds)?.as_ref().map(key_of));
        assert_eq!(Some(Value::Int(20)), forest.max(&ns, &bounds)?.as_ref().map(key_of));
        for _ in 0..20 {
            let key = forest.random(&ns, &bounds)?.as_ref().map(key_of);
            assert!(matches!(key, Some(Value::Int(11..=20))), "{:?}", key);
        }

        let keys = forest
            .iter(&ns, bounds.clone(), Order::Desc)
            .map(|item| item.map(|item| key_of(&item)))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!((11..=20).rev().map(Value::Int).collect::<Vec<_>>(), keys);
        assert_eq!(30, forest.iter(&ns, Bounds::all(), Order::Asc).count());
        Ok(())
    }

    #[test]
    fn batches_read_one_snapshot() -> Result<()> {
        let forest = forest(4, true)?;
        let (a, b) = (Namespace::new("a"), Namespace::new("b"));
        for key in 0..10 {
            forest.insert(&a, scored(key))?;
            forest.insert(&b, scored(key * 10))?;
        }
        let queries = vec![
            RangeQuery { namespace: a.clone(), bounds: Bounds::upper(KeyBound::exclusive(5i64)) },
            RangeQuery { namespace: b.clone(), bounds: Bounds::all() },
            RangeQuery { namespace: Namespace::new("c"), bounds: Bounds::all() },
        ];
        assert_eq!(vec![5, 10, 0], forest.count_batch(&queries)?);
        let sums = forest.sum_batch(&queries)?;
        let sums: Vec<_> = sums.iter().map(Summand::as_single).collect();
        assert_eq!(vec![Some(10.0), Some(450.0), Some(0.0)], sums);

        let at = vec![
            AtQuery { namespace: a.clone(), offset: 2, bounds: Bounds::all() },
            AtQuery { namespace: b.clone(), offset: -1, bounds: Bounds::all() },
        ];
        let items = forest.at_batch(&at)?;
        let keys: Vec<_> = items.iter().map(key_of).collect();
        assert_eq!(vec![Value::Int(2), Value::Int(90)], keys);
        Ok(())
    }

    #[test]
    fn prefix_bounds_select_tuples() -> Result<()> {
        let forest = forest(2, true)?;
        let ns = Namespace::GLOBAL;
        for (user, day) in [("ann", 1i64), ("ann", 2), ("bob", 1), ("ann", 3), ("cid", 9)] {
            let key = Value::from(vec![Value::from(user), Value::Int(day)]);
            forest.insert(&ns, Entry::new(key, format!("{}{}", user, day)).with_summand(1.0))?;
        }
        let prefix = Bounds::prefix(vec![Value::from("ann")]);
        assert_eq!(3, forest.count(&ns, &prefix)?);
        let last = forest.at(&ns, -1, &prefix)?;
        assert_eq!(Value::from(vec![Value::from("ann"), Value::Int(3)]), last.position.key());
        let raw = RawBounds { prefix: Some(vec![Value::from("bob")]), ..Default::default() };
        assert_eq!(1, forest.count(&ns, &Bounds::try_from(raw)?)?);
        Ok(())
    }

    #[test]
    fn namespaces_enumerate_and_bulk_operations() -> Result<()> {
        let forest = forest(2, false)?;
        let mut expected = Vec::new();
        for n in 0..7i64 {
            let ns = Namespace::new(n);
            forest.insert(&ns, scored(n))?;
            expected.push(ns);
        }
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = forest.paginate_namespaces(cursor, 3)?;
            assert!(page.namespaces.len() <= 3);
            seen.extend(page.namespaces);
            cursor = page.cursor;
            if page.is_done {
                break;
            }
        }
        seen.sort();
        assert_eq!(expected, seen);
        assert_eq!(7, forest.iter_namespaces(2).count());

        forest.make_all_roots_lazy()?;
        for ns in &expected {
            forest.validate(ns)?;
        }
        forest.clear_all(&ClearOptions { max_node_size: Some(3), root_lazy: None })?;
        for ns in &expected {
            assert_eq!(0, forest.count(ns, &Bounds::all())?);
            forest.validate(ns)?;
        }
        assert_eq!(7, forest.iter_namespaces(100).count());
        Ok(())
    }

    #[test]
    fn clear_rejects_invalid_node_size() -> Result<()> {
        let forest = forest(2, true)?;
        let options = ClearOptions { max_node_size: Some(0), root_lazy: None };
        assert!(matches!(forest.clear(&Namespace::GLOBAL, &options), Err(Error::Config(_))));
        assert!(forest.iter_namespaces(10).next().is_none());
        let tiny = TreeConfig::new().with_max_node_size(1);
        assert!(Forest::new(ForestConfig::new().with_tree(tiny)).is_err());
        Ok(())
    }

    #[test]
    fn concurrent_writers_retry() -> Result<()> {
        for root_lazy in [true, false] {
            let tree = TreeConfig::new().with_max_node_size(3).with_root_lazy(root_lazy);
            let config = ForestConfig::new().with_tree(tree).with_max_retries(usize::MAX);
            let forest = Arc::new(Forest::new(config)?);
            let handles: Vec<_> = (0..4i64)
                .map(|t| {
                    let forest = forest.clone();
                    thread::spawn(move || -> Result<()> {
                        for i in 0..25 {
                            forest.insert(&Namespace::GLOBAL, scored(i * 4 + t))?;
                        }
                        Ok(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("writer panicked")?;
            }
            assert_eq!(100, forest.count(&Namespace::GLOBAL, &Bounds::all())?);
            assert_eq!(Some(4950.0), forest.sum(&Namespace::GLOBAL, &Bounds::all())?.as_single());
            forest.validate(&Namespace::GLOBAL)?;
            assert_eq!(0, forest.status()?.txns_active);
        }
        Ok(())
    }

    #[test]
    fn storage_tracks_contents_not_history() -> Result<()> {
        for root_lazy in [true, false] {
            let forest = forest(2, root_lazy)?;
            let ns = Namespace::new("kept");
            forest.insert(&ns, scored(1))?;
            let baseline = forest.status()?.keys;

            for _ in 0..200 {
                assert_eq!(1, forest.count(&ns, &Bounds::all())?);
            }
            assert_eq!(baseline, forest.status()?.keys);

            for _ in 0..100 {
                forest.insert(&ns, scored(2))?;
                forest.delete(&ns, 2i64, "2")?;
            }
            assert_eq!(baseline, forest.status()?.keys);

            forest.clear(&ns, &ClearOptions::default())?;
            assert_eq!(baseline, forest.status()?.keys);
            forest.validate(&ns)?;
        }
        Ok(())
    }

    #[test]
    fn conflicts_surface_without_retries() -> Result<()> {
        let forest = Forest::new(ForestConfig::new().with_max_retries(0))?;
        let mut txn = forest.mvcc.begin()?;
        mutation::insert(&mut txn, &Namespace::GLOBAL, scored(1), &forest.config.tree)?;
        assert_eq!(Err(Error::Serialization), forest.insert(&Namespace::GLOBAL, scored(2)));
        txn.commit()?;
        assert_eq!(1, forest.count(&Namespace::GLOBAL, &Bounds::all())?);
        Ok(())
    }
}
