//! Array-backed binary heap used for k-way merges
//!
//! The ordering is supplied at construction through [`HeapOrder`], so the
//! same heap type serves both min and max queues over any item type.

/// Ordering capability for heap items
pub trait HeapOrder<T> {
    fn less(&self, a: &T, b: &T) -> bool;
}

/// Orders items by their natural `Ord`
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

impl<T: Ord> HeapOrder<T> for Natural {
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}

/// Binary heap over a `Vec`
///
/// A min heap pops the least item first, a max heap the greatest.
#[derive(Debug, Clone)]
pub struct Heap<T, O> {
    items: Vec<T>,
    order: O,
    max: bool,
}

impl<T, O: HeapOrder<T>> Heap<T, O> {
    pub fn min(order: O) -> Self {
        Self {
            items: Vec::new(),
            order,
            max: false,
        }
    }

    pub fn max(order: O) -> Self {
        Self {
            items: Vec::new(),
            order,
            max: true,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    /// True when `a` must be popped before `b`
    fn before(&self, a: usize, b: usize) -> bool {
        if self.max {
            self.order.less(&self.items[b], &self.items[a])
        } else {
            self.order.less(&self.items[a], &self.items[b])
        }
    }

    fn sift_up(&mut self, mut ix: usize) {
        while ix > 0 {
            let parent = (ix - 1) / 2;
            if !self.before(ix, parent) {
                break;
            }
            self.items.swap(ix, parent);
            ix = parent;
        }
    }

    fn sift_down(&mut self, mut ix: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * ix + 1;
            let right = left + 1;
            let mut best = ix;
            if left < len && self.before(left, best) {
                best = left;
            }
            if right < len && self.before(right, best) {
                best = right;
            }
            if best == ix {
                break;
            }
            self.items.swap(ix, best);
            ix = best;
        }
    }
}

impl<T: Ord> Heap<T, Natural> {
    pub fn natural_min() -> Self {
        Self::min(Natural)
    }
}
