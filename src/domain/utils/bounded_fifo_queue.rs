use std::collections::VecDeque;

/// FIFO buffer that drops its oldest element once `max_size` is reached.
#[derive(Debug, Clone)]
pub struct BoundedFifoQueue<T> {
    max_size: usize,
    elements: VecDeque<T>,
}

impl<T> BoundedFifoQueue<T> {
    pub fn new(max_size: usize) -> Self {
        BoundedFifoQueue { max_size, elements: VecDeque::with_capacity(max_size) }
    }

    pub fn add(&mut self, element: T) {
        if self.max_size == 0 {
            return;
        }
        if self.elements.len() == self.max_size {
            self.elements.pop_front();
        }
        self.elements.push_back(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.elements.iter_mut()
    }
}

impl<T: Clone> BoundedFifoQueue<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.elements.iter().cloned().collect()
    }
}
