//! List-editing operations.

use crate::format::{
    LIST_OP_HAS_ADDED, LIST_OP_HAS_APPENDED, LIST_OP_HAS_DELETED, LIST_OP_HAS_EXPLICIT,
    LIST_OP_HAS_ORDERED, LIST_OP_HAS_PREPENDED, LIST_OP_IS_EXPLICIT,
};

/// An edit applied to an inherited list: either an explicit replacement or
/// a set of additive, subtractive and reordering edits.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOp<T> {
    pub is_explicit: bool,
    pub explicit_items: Vec<T>,
    pub added_items: Vec<T>,
    pub prepended_items: Vec<T>,
    pub appended_items: Vec<T>,
    pub deleted_items: Vec<T>,
    pub ordered_items: Vec<T>,
}

impl<T> Default for ListOp<T> {
    fn default() -> Self {
        Self {
            is_explicit: false,
            explicit_items: Vec::new(),
            added_items: Vec::new(),
            prepended_items: Vec::new(),
            appended_items: Vec::new(),
            deleted_items: Vec::new(),
            ordered_items: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq> ListOp<T> {
    /// An explicit list holding `items`.
    pub fn explicit(items: Vec<T>) -> Self {
        Self { is_explicit: true, explicit_items: items, ..Default::default() }
    }

    pub fn prepended(items: Vec<T>) -> Self {
        Self { prepended_items: items, ..Default::default() }
    }

    pub fn appended(items: Vec<T>) -> Self {
        Self { appended_items: items, ..Default::default() }
    }

    /// Header byte describing which item lists are present.
    pub fn header(&self) -> u8 {
        let mut bits = 0;
        if self.is_explicit {
            bits |= LIST_OP_IS_EXPLICIT;
        }
        for (items, bit) in [
            (&self.explicit_items, LIST_OP_HAS_EXPLICIT),
            (&self.added_items, LIST_OP_HAS_ADDED),
            (&self.deleted_items, LIST_OP_HAS_DELETED),
            (&self.ordered_items, LIST_OP_HAS_ORDERED),
            (&self.prepended_items, LIST_OP_HAS_PREPENDED),
            (&self.appended_items, LIST_OP_HAS_APPENDED),
        ] {
            if !items.is_empty() {
                bits |= bit;
            }
        }
        bits
    }

    /// Whether the op uses prepend or append edits.
    pub fn uses_prepend_or_append(&self) -> bool {
        !self.prepended_items.is_empty() || !self.appended_items.is_empty()
    }

    /// Apply the op to an empty list.
    pub fn apply(&self) -> Vec<T> {
        if self.is_explicit {
            return self.explicit_items.clone();
        }
        let mut out: Vec<T> = Vec::new();
        for item in &self.added_items {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
        out.retain(|x| !self.deleted_items.contains(x));
        let mut front: Vec<T> = Vec::new();
        for item in &self.prepended_items {
            if !front.contains(item) {
                front.push(item.clone());
            }
        }
        out.retain(|x| !front.contains(x));
        front.append(&mut out);
        let mut out = front;
        for item in &self.appended_items {
            out.retain(|x| x != item);
            out.push(item.clone());
        }
        if !self.ordered_items.is_empty() {
            let mut ordered: Vec<T> = self
                .ordered_items
                .iter()
                .filter(|x| out.contains(x))
                .cloned()
                .collect();
            ordered.extend(out.into_iter().filter(|x| !self.ordered_items.contains(x)));
            out = ordered;
        }
        out
    }

    /// True if `item` is added by this op (explicitly, or by an add,
    /// prepend or append edit).
    pub fn contains_added(&self, item: &T) -> bool {
        if self.is_explicit {
            self.explicit_items.contains(item)
        } else {
            self.added_items.contains(item)
                || self.prepended_items.contains(item)
                || self.appended_items.contains(item)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits() {
        let op = ListOp::<i32>::explicit(vec![1]);
        assert_eq!(op.header(), LIST_OP_IS_EXPLICIT | LIST_OP_HAS_EXPLICIT);

        let op = ListOp::<i32>::explicit(Vec::new());
        assert_eq!(op.header(), LIST_OP_IS_EXPLICIT);

        let op = ListOp { deleted_items: vec![2], ..ListOp::prepended(vec![1]) };
        assert_eq!(op.header(), LIST_OP_HAS_PREPENDED | LIST_OP_HAS_DELETED);
        assert!(op.uses_prepend_or_append());
    }

    #[test]
    fn test_apply() {
        let op = ListOp {
            added_items: vec![1, 2, 3],
            deleted_items: vec![2],
            prepended_items: vec![9],
            appended_items: vec![1],
            ..Default::default()
        };
        assert_eq!(op.apply(), vec![9, 3, 1]);
        assert!(op.contains_added(&9));
        assert!(!op.contains_added(&2));
        assert_eq!(ListOp::explicit(vec![4, 5]).apply(), vec![4, 5]);
    }
}
