use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::delayed::{DelayItem, Delayed};

/// Items that have not matured yet.
///
/// Appends are cheap and leave the tail unsorted; ordering by expiry is only established by
/// `sort`. Peeking takes the lock shared, every mutation takes it exclusively.
#[derive(Debug)]
pub(crate) struct WaitList<T> {
    items: RwLock<VecDeque<DelayItem<T>>>,
}

impl<T> WaitList<T> {
    pub(crate) fn new() -> WaitList<T> {
        WaitList {
            items: RwLock::new(VecDeque::new()),
        }
    }

    /// Appends `item` to the tail without sorting.
    pub(crate) fn add(&self, item: DelayItem<T>) {
        self.items.write().push_back(item);
    }

    /// Stable sort by ascending expiry.
    pub(crate) fn sort(&self) {
        if self.items.read().len() <= 1 {
            return;
        }

        let mut items = self.items.write();
        items
            .make_contiguous()
            .sort_by_key(|item| item.delayed_until());
    }

    /// Removes the first item, sorted or not.
    pub(crate) fn pop_head(&self) -> Option<DelayItem<T>> {
        self.items.write().pop_front()
    }

    /// Borrows the first item. Writers are blocked while the guard is alive.
    pub(crate) fn peek_head(&self) -> Option<MappedRwLockReadGuard<'_, DelayItem<T>>> {
        RwLockReadGuard::try_map(self.items.read(), |items| items.front()).ok()
    }

    /// Expiry of the first item.
    pub(crate) fn head_expiry(&self) -> Option<Instant> {
        self.peek_head().map(|head| head.delayed_until())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Drops every item and releases the backing storage.
    pub(crate) fn clear(&self) {
        *self.items.write() = VecDeque::new();
    }
}

#[cfg(test)]
mod tests {
    use super::WaitList;
    use crate::delayed::{DelayItem, Delayed};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn drain(list: &WaitList<&'static str>) -> Vec<&'static str> {
        let mut values = vec![];
        while let Some(item) = list.pop_head() {
            values.push(item.value);
        }
        values
    }

    #[test]
    fn empty_list() {
        let list: WaitList<i32> = WaitList::new();

        assert!(list.is_empty());
        assert!(list.pop_head().is_none());
        assert!(list.peek_head().is_none());
        assert!(list.head_expiry().is_none());

        list.sort();
        assert!(list.is_empty());
    }

    #[test]
    fn add_keeps_insertion_order_until_sorted() {
        let list = WaitList::new();

        list.add(DelayItem::for_duration("3rd", Duration::from_millis(30)));
        list.add(DelayItem::for_duration("1st", Duration::from_millis(10)));
        list.add(DelayItem::for_duration("2nd", Duration::from_millis(20)));

        assert_eq!(list.len(), 3);
        assert_eq!(list.peek_head().unwrap().value, "3rd");

        list.sort();

        assert_eq!(list.peek_head().unwrap().value, "1st");
        assert_eq!(drain(&list), vec!["1st", "2nd", "3rd"]);
    }

    #[test]
    fn sort_is_stable() {
        let list = WaitList::new();
        let until = Instant::now() + Duration::from_secs(1);

        list.add(DelayItem::for_duration("late", Duration::from_secs(60)));
        list.add(DelayItem::until_instant("a", until));
        list.add(DelayItem::until_instant("b", until));
        list.add(DelayItem::until_instant("c", until));

        list.sort();

        assert_eq!(drain(&list), vec!["a", "b", "c", "late"]);
    }

    #[test]
    fn peek_does_not_remove() {
        let list = WaitList::new();
        let item = DelayItem::for_duration(7, Duration::from_secs(1));
        let until = item.delayed_until();

        list.add(item);

        assert_eq!(list.head_expiry(), Some(until));
        assert_eq!(list.peek_head().unwrap().value, 7);
        assert_eq!(list.len(), 1);
        assert_eq!(list.pop_head().unwrap().value, 7);
        assert!(list.is_empty());
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let list = Arc::new(WaitList::new());
        let mut handles = vec![];

        for t in 0..4 {
            let list = list.clone();
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    list.add(DelayItem::for_duration(t * 1000 + i, Duration::from_millis(i as u64)));
                    if i % 50 == 0 {
                        list.sort();
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(list.len(), 1000);

        list.sort();
        let mut last = None;
        while let Some(item) = list.pop_head() {
            if let Some(last) = last {
                assert!(last <= item.delayed_until());
            }
            last = Some(item.delayed_until());
        }
    }

    #[test]
    fn clear_drops_items() {
        let list = WaitList::new();
        list.add(DelayItem::for_duration("x", Duration::from_secs(1)));

        list.clear();

        assert!(list.is_empty());
    }
}
