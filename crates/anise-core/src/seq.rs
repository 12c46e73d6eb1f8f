use std::sync::{Arc, Mutex, MutexGuard};

use crate::ast::Value;
use crate::error::AniseError;

/// Deferred tail of a lazy sequence. Runs once; the node it lives in is
/// rewritten in place with the result.
pub type TailThunk = Box<dyn FnOnce() -> Result<Value, AniseError> + Send>;

/// One cell of the list representation. `Pair` is the classic cons cell
/// with a memoized size. `Thunk` is an unforced lazy tail. `Concat` makes
/// append amortized O(1). `Coded` is an array-backed view with O(1)
/// indexing, used for evaluated argument lists.
pub enum Node {
    Empty,
    Pair {
        head: Value,
        tail: ListHandle,
        size: Option<usize>,
    },
    Thunk(Option<TailThunk>),
    Concat {
        left: ListHandle,
        right: ListHandle,
    },
    Coded {
        items: Arc<Vec<Value>>,
        start: usize,
    },
}

/// Shared, mutable handle to a list node. Cloning the handle shares the
/// node; the evaluator relies on that stable identity when it rewrites
/// macro call sites.
#[derive(Clone)]
pub struct ListHandle {
    inner: Arc<Mutex<Node>>,
}

/// Anything `first`/`rest` style primitives can walk.
pub trait Sequence {
    fn seq_first(&self) -> Result<Value, AniseError>;
    fn seq_rest(&self) -> Result<Value, AniseError>;
    fn seq_is_empty(&self) -> Result<bool, AniseError>;
}

impl ListHandle {
    fn with_node(node: Node) -> Self {
        Self {
            inner: Arc::new(Mutex::new(node)),
        }
    }

    pub fn empty() -> Self {
        Self::with_node(Node::Empty)
    }

    pub fn cons(head: Value, tail: ListHandle) -> Self {
        let size = tail.known_size().map(|n| n + 1);
        Self::with_node(Node::Pair { head, tail, size })
    }

    /// Pair-chain construction, sizes memoized up front. The parser uses
    /// this for every form it reads.
    pub fn from_vec(items: Vec<Value>) -> Self {
        let mut list = Self::empty();
        let mut size = 0usize;
        for item in items.into_iter().rev() {
            size += 1;
            list = Self::with_node(Node::Pair {
                head: item,
                tail: list,
                size: Some(size),
            });
        }
        list
    }

    /// Array-backed list over an existing buffer. O(1) `get`, O(1) `tail`.
    pub fn coded(items: Arc<Vec<Value>>) -> Self {
        Self::with_node(Node::Coded { items, start: 0 })
    }

    /// Eager head, deferred tail.
    pub fn lazy(head: Value, thunk: TailThunk) -> Self {
        let tail = Self::with_node(Node::Thunk(Some(thunk)));
        Self::with_node(Node::Pair {
            head,
            tail,
            size: None,
        })
    }

    pub fn append(&self, other: &ListHandle) -> ListHandle {
        if self.is_definitely_empty() {
            return other.clone();
        }
        if other.is_definitely_empty() {
            return self.clone();
        }
        Self::with_node(Node::Concat {
            left: self.clone(),
            right: other.clone(),
        })
    }

    pub fn ptr_eq(&self, other: &ListHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, Node> {
        self.inner.lock().unwrap()
    }

    /// Non-forcing emptiness check. `false` means "not known to be empty";
    /// truthiness uses this so printing a condition never forces a tail.
    /// Walks concat chains with an explicit worklist, never the host stack.
    pub fn is_definitely_empty(&self) -> bool {
        let mut work = vec![self.clone()];
        while let Some(handle) = work.pop() {
            let node = handle.lock();
            match &*node {
                Node::Empty => {}
                Node::Pair { .. } | Node::Thunk(_) => return false,
                Node::Concat { left, right } => {
                    work.push(right.clone());
                    work.push(left.clone());
                }
                Node::Coded { items, start } => {
                    if *start < items.len() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Size without forcing or traversal, if already known.
    pub fn known_size(&self) -> Option<usize> {
        let mut total = 0usize;
        let mut work = vec![self.clone()];
        while let Some(handle) = work.pop() {
            let node = handle.lock();
            match &*node {
                Node::Empty => {}
                Node::Pair { size: Some(n), .. } => total += n,
                Node::Pair { size: None, .. } | Node::Thunk(_) => return None,
                Node::Concat { left, right } => {
                    work.push(right.clone());
                    work.push(left.clone());
                }
                Node::Coded { items, start } => total += items.len().saturating_sub(*start),
            }
        }
        Some(total)
    }

    /// Forces an unforced tail node in place. Idempotent; everything else
    /// is a no-op.
    fn force_top(&self) -> Result<(), AniseError> {
        let thunk = {
            let mut node = self.lock();
            match &mut *node {
                Node::Thunk(slot) => match slot.take() {
                    Some(f) => f,
                    None => {
                        return Err(AniseError::application(
                            "lazy tail evaluation failed or is in progress",
                        ))
                    }
                },
                _ => return Ok(()),
            }
        };
        let replacement = match thunk()? {
            Value::Nothing => Node::Empty,
            Value::List(h) => h.shallow_node()?,
            other => {
                return Err(AniseError::type_error(format!(
                    "lazy tail produced {}, expected a sequence",
                    other.type_name()
                )))
            }
        };
        *self.lock() = replacement;
        Ok(())
    }

    fn shallow_node(&self) -> Result<Node, AniseError> {
        self.force_top()?;
        let node = self.lock();
        Ok(match &*node {
            Node::Empty => Node::Empty,
            Node::Pair { head, tail, size } => Node::Pair {
                head: head.clone(),
                tail: tail.clone(),
                size: *size,
            },
            Node::Concat { left, right } => Node::Concat {
                left: left.clone(),
                right: right.clone(),
            },
            Node::Coded { items, start } => Node::Coded {
                items: items.clone(),
                start: *start,
            },
            Node::Thunk(_) => {
                return Err(AniseError::application(
                    "lazy tail evaluation failed or is in progress",
                ))
            }
        })
    }

    /// Normalizes the node for traversal: forces an unforced tail and
    /// flattens a `Concat` in place into a `Pair` (or `Empty`). The left
    /// spine is walked with an explicit worklist, so chain depth never
    /// grows the host stack, and the rewrite memoizes the walk for every
    /// later traversal of the same node.
    fn settle(&self) -> Result<(), AniseError> {
        self.force_top()?;
        let (mut cur, mut pending) = {
            let node = self.lock();
            match &*node {
                Node::Concat { left, right } => (left.clone(), vec![right.clone()]),
                _ => return Ok(()),
            }
        };
        loop {
            cur.force_top()?;
            let descend = {
                let node = cur.lock();
                match &*node {
                    Node::Concat { left, right } => {
                        pending.push(right.clone());
                        Some(left.clone())
                    }
                    _ => None,
                }
            };
            if let Some(left) = descend {
                cur = left;
                continue;
            }
            let exhausted = {
                let node = cur.lock();
                match &*node {
                    Node::Empty => true,
                    Node::Coded { items, start } => *start >= items.len(),
                    _ => false,
                }
            };
            if !exhausted {
                break;
            }
            match pending.pop() {
                Some(next) => cur = next,
                None => {
                    *self.lock() = Node::Empty;
                    return Ok(());
                }
            }
        }
        let head = cur.head()?;
        let tail = cur.tail()?;
        // parts still pending hang off to the right, later ones outermost
        let rest = if pending.is_empty() {
            tail
        } else {
            let mut chain = pending[0].clone();
            for part in pending.iter().skip(1) {
                chain = Self::with_node(Node::Concat {
                    left: part.clone(),
                    right: chain,
                });
            }
            Self::with_node(Node::Concat {
                left: tail,
                right: chain,
            })
        };
        *self.lock() = Node::Pair {
            head,
            tail: rest,
            size: None,
        };
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, AniseError> {
        self.settle()?;
        let node = self.lock();
        match &*node {
            Node::Empty => Ok(true),
            Node::Pair { .. } => Ok(false),
            Node::Coded { items, start } => Ok(*start >= items.len()),
            Node::Concat { .. } | Node::Thunk(_) => Err(AniseError::application(
                "lazy tail evaluation failed or is in progress",
            )),
        }
    }

    /// Head of the list. `Nothing` on an empty list.
    pub fn head(&self) -> Result<Value, AniseError> {
        self.settle()?;
        let node = self.lock();
        match &*node {
            Node::Empty => Ok(Value::Nothing),
            Node::Pair { head, .. } => Ok(head.clone()),
            Node::Coded { items, start } => {
                Ok(items.get(*start).cloned().unwrap_or(Value::Nothing))
            }
            Node::Concat { .. } | Node::Thunk(_) => Err(AniseError::application(
                "lazy tail evaluation failed or is in progress",
            )),
        }
    }

    /// Rest of the list; forces a lazy tail. Empty stays empty.
    pub fn tail(&self) -> Result<ListHandle, AniseError> {
        self.settle()?;
        let node = self.lock();
        match &*node {
            Node::Empty => Ok(ListHandle::empty()),
            Node::Pair { tail, .. } => Ok(tail.clone()),
            Node::Coded { items, start } => {
                if *start + 1 < items.len() {
                    Ok(Self::with_node(Node::Coded {
                        items: items.clone(),
                        start: *start + 1,
                    }))
                } else {
                    Ok(ListHandle::empty())
                }
            }
            Node::Concat { .. } | Node::Thunk(_) => Err(AniseError::application(
                "lazy tail evaluation failed or is in progress",
            )),
        }
    }

    /// Full size. Walks the whole spine and memoizes on the way back, so
    /// repeated calls are O(1). Must not be called on infinite sequences.
    pub fn size(&self) -> Result<usize, AniseError> {
        if let Some(n) = self.known_size() {
            return Ok(n);
        }
        let mut spine: Vec<ListHandle> = Vec::new();
        let mut cur = self.clone();
        let mut total;
        loop {
            cur.settle()?;
            let node = cur.lock();
            match &*node {
                Node::Empty => {
                    total = 0;
                    break;
                }
                Node::Coded { items, start } => {
                    total = items.len().saturating_sub(*start);
                    break;
                }
                Node::Pair {
                    size: Some(n), ..
                } => {
                    total = *n;
                    break;
                }
                Node::Pair { tail, .. } => {
                    let next = tail.clone();
                    drop(node);
                    spine.push(cur.clone());
                    cur = next;
                }
                Node::Concat { .. } | Node::Thunk(_) => {
                    return Err(AniseError::application(
                        "lazy tail evaluation failed or is in progress",
                    ))
                }
            }
        }
        for handle in spine.iter().rev() {
            total += 1;
            if let Node::Pair { size, .. } = &mut *handle.lock() {
                *size = Some(total);
            }
        }
        Ok(total)
    }

    /// Index access. O(1) on coded lists, linear otherwise. Out of range
    /// yields `Nothing`.
    pub fn get(&self, index: usize) -> Result<Value, AniseError> {
        self.settle()?;
        {
            let node = self.lock();
            if let Node::Coded { items, start } = &*node {
                return Ok(items.get(start + index).cloned().unwrap_or(Value::Nothing));
            }
        }
        let mut cur = self.clone();
        for _ in 0..index {
            if cur.is_empty()? {
                return Ok(Value::Nothing);
            }
            cur = cur.tail()?;
        }
        cur.head()
    }

    /// Element-wise equality, short-circuiting when both sizes are already
    /// known and differ. Forcing failures compare unequal.
    pub fn structural_eq(&self, other: &ListHandle) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if let (Some(a), Some(b)) = (self.known_size(), other.known_size()) {
            if a != b {
                return false;
            }
        }
        let mut left = self.iter();
        let mut right = other.iter();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return true,
                (Some(Ok(a)), Some(Ok(b))) => {
                    if a != b {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    pub fn iter(&self) -> ListIter {
        ListIter {
            cur: self.clone(),
            done: false,
        }
    }

    pub fn to_vec(&self) -> Result<Vec<Value>, AniseError> {
        self.iter().collect()
    }

    /// Macro-expansion rewrite support. The call node keeps its identity;
    /// only its contents change.
    pub(crate) fn set_head(&self, value: Value) {
        let mut node = self.lock();
        match &mut *node {
            Node::Pair { head, .. } => *head = value,
            other => {
                let converted = match other {
                    Node::Coded { items, start } => {
                        let tail = if *start + 1 < items.len() {
                            Self::with_node(Node::Coded {
                                items: items.clone(),
                                start: *start + 1,
                            })
                        } else {
                            ListHandle::empty()
                        };
                        Node::Pair {
                            head: value,
                            tail,
                            size: Some(items.len().saturating_sub(*start).max(1)),
                        }
                    }
                    _ => Node::Pair {
                        head: value,
                        tail: ListHandle::empty(),
                        size: Some(1),
                    },
                };
                *node = converted;
            }
        }
    }

    pub(crate) fn set_tail(&self, tail: ListHandle) {
        let mut node = self.lock();
        match &mut *node {
            Node::Pair {
                tail: slot, size, ..
            } => {
                *slot = tail;
                *size = None;
            }
            other => {
                let head = match other {
                    Node::Coded { items, start } => {
                        items.get(*start).cloned().unwrap_or(Value::Nothing)
                    }
                    _ => Value::Nothing,
                };
                *node = Node::Pair {
                    head,
                    tail,
                    size: None,
                };
            }
        }
    }
}

pub struct ListIter {
    cur: ListHandle,
    done: bool,
}

impl Iterator for ListIter {
    type Item = Result<Value, AniseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cur.is_empty() {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
            Ok(true) => {
                self.done = true;
                None
            }
            Ok(false) => {
                let head = self.cur.head();
                match self.cur.tail() {
                    Ok(next) => {
                        self.cur = next;
                        Some(head)
                    }
                    Err(e) => {
                        self.done = true;
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

impl Sequence for ListHandle {
    fn seq_first(&self) -> Result<Value, AniseError> {
        self.head()
    }

    fn seq_rest(&self) -> Result<Value, AniseError> {
        Ok(Value::List(self.tail()?))
    }

    fn seq_is_empty(&self) -> Result<bool, AniseError> {
        self.is_empty()
    }
}

impl Sequence for im::Vector<Value> {
    fn seq_first(&self) -> Result<Value, AniseError> {
        Ok(self.front().cloned().unwrap_or(Value::Nothing))
    }

    fn seq_rest(&self) -> Result<Value, AniseError> {
        if self.is_empty() {
            Ok(Value::Vector(im::Vector::new()))
        } else {
            Ok(Value::Vector(self.clone().split_off(1)))
        }
    }

    fn seq_is_empty(&self) -> Result<bool, AniseError> {
        Ok(self.is_empty())
    }
}
