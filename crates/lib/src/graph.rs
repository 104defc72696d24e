//! Memoized folds and traversals over id-keyed dependency DAGs.
//!
//! Nodes are identified by [`GraphNode::id`], not by reference identity: two
//! distinct values with the same id are the same node. The graph is assumed to
//! be acyclic; a cycle makes [`topological_fold`] recurse without bound, so cycle
//! detection belongs to whoever constructs the graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// A node in a dependency DAG.
pub trait GraphNode {
  /// Stable identity of the node.
  fn id(&self) -> &str;

  /// Direct dependencies, in a deterministic order.
  fn dependencies(&self) -> Vec<&Self>;
}

/// Insertion-ordered map from node id to a fold result.
///
/// The first insertion of an id wins; later insertions of the same id are
/// ignored, so iteration order is discovery order.
#[derive(Debug, Clone)]
pub struct DepMap<V> {
  order: Vec<String>,
  values: HashMap<String, V>,
}

impl<V> Default for DepMap<V> {
  fn default() -> Self {
    Self {
      order: Vec::new(),
      values: HashMap::new(),
    }
  }
}

impl<V> DepMap<V> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert `value` under `id` unless the id is already present.
  ///
  /// Returns `true` if the value was inserted.
  pub fn insert_if_absent(&mut self, id: &str, value: V) -> bool {
    if self.values.contains_key(id) {
      return false;
    }
    self.order.push(id.to_string());
    self.values.insert(id.to_string(), value);
    true
  }

  pub fn get(&self, id: &str) -> Option<&V> {
    self.values.get(id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.values.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Ids in discovery order.
  pub fn ids(&self) -> impl DoubleEndedIterator<Item = &str> {
    self.order.iter().map(String::as_str)
  }

  /// `(id, value)` pairs in discovery order.
  pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &V)> {
    self
      .order
      .iter()
      .filter_map(|id| self.values.get(id).map(|value| (id.as_str(), value)))
  }

  pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
    self.iter().map(|(_, value)| value)
  }
}

struct Memo<V> {
  value: V,
  all: Rc<DepMap<V>>,
}

/// Fold a DAG bottom-up, computing one value per unique node id.
///
/// `f(direct, all, node)` is called exactly once per id, after every
/// dependency of `node` has been folded. `direct` holds the results of the
/// node's declared dependencies; `all` holds the results of its entire
/// transitive closure, deduplicated, in depth-first discovery order (a
/// dependency's own dependencies appear before it).
///
/// A node reached through several paths is folded once; every later visit
/// replays the memoized value together with its memoized transitive set.
pub fn topological_fold<N, V, F>(root: &N, mut f: F) -> V
where
  N: GraphNode,
  V: Clone,
  F: FnMut(&DepMap<V>, &DepMap<V>, &N) -> V,
{
  let mut memo: HashMap<String, Memo<V>> = HashMap::new();
  let (value, _) = fold_node(root, &mut f, &mut memo);
  value
}

fn fold_node<N, V, F>(node: &N, f: &mut F, memo: &mut HashMap<String, Memo<V>>) -> (V, Rc<DepMap<V>>)
where
  N: GraphNode,
  V: Clone,
  F: FnMut(&DepMap<V>, &DepMap<V>, &N) -> V,
{
  if let Some(cached) = memo.get(node.id()) {
    return (cached.value.clone(), Rc::clone(&cached.all));
  }

  let dependencies = node.dependencies();
  let mut need: HashSet<String> = dependencies.iter().map(|dep| dep.id().to_string()).collect();
  let mut direct = DepMap::new();
  let mut all = DepMap::new();

  for dep in dependencies {
    let (value, dep_all) = fold_node(dep, f, memo);
    for (id, transitive) in dep_all.iter() {
      record(id, transitive, &mut need, &mut direct, &mut all);
    }
    record(dep.id(), &value, &mut need, &mut direct, &mut all);
  }

  let value = f(&direct, &all, node);
  let all = Rc::new(all);
  memo.insert(
    node.id().to_string(),
    Memo {
      value: value.clone(),
      all: Rc::clone(&all),
    },
  );
  (value, all)
}

fn record<V: Clone>(
  id: &str,
  value: &V,
  need: &mut HashSet<String>,
  direct: &mut DepMap<V>,
  all: &mut DepMap<V>,
) {
  all.insert_if_absent(id, value.clone());
  if need.remove(id) {
    direct.insert_if_absent(id, value.clone());
  }
}

/// Visit every node once in breadth-first order, starting with `root`.
pub fn traverse<'a, N: GraphNode>(root: &'a N, mut f: impl FnMut(&'a N)) {
  let mut seen: HashSet<&'a str> = HashSet::new();
  let mut queue: VecDeque<&'a N> = VecDeque::new();
  seen.insert(root.id());
  queue.push_back(root);

  while let Some(node) = queue.pop_front() {
    f(node);
    for dep in node.dependencies() {
      if seen.insert(dep.id()) {
        queue.push_back(dep);
      }
    }
  }
}

/// Visit every node once in depth-first post-order: dependencies before
/// dependents, `root` last.
pub fn traverse_deep_first<'a, N: GraphNode>(root: &'a N, mut f: impl FnMut(&'a N)) {
  let mut seen: HashSet<&'a str> = HashSet::new();
  visit_post_order(root, &mut seen, &mut f);
}

fn visit_post_order<'a, N: GraphNode>(node: &'a N, seen: &mut HashSet<&'a str>, f: &mut impl FnMut(&'a N)) {
  if !seen.insert(node.id()) {
    return;
  }
  for dep in node.dependencies() {
    visit_post_order(dep, seen, f);
  }
  f(node);
}
