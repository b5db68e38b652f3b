use std::collections::VecDeque;

use parking_lot::Mutex;

/// FIFO of matured values waiting for a consumer.
#[derive(Debug)]
pub(crate) struct ReadyBuffer<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> ReadyBuffer<T> {
    pub(crate) fn new() -> ReadyBuffer<T> {
        ReadyBuffer {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn append(&self, value: T) {
        self.items.lock().push_back(value);
    }

    pub(crate) fn pop_head(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn clear(&self) {
        *self.items.lock() = VecDeque::new();
    }
}
