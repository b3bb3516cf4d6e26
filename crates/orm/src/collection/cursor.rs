//! Restartable forward cursor

use std::fmt;

/// A stateful forward iterator over an array or a lazily read source.
///
/// Rows pulled from a source are buffered so [`Cursor::rewind`] replays
/// them without reading the source again.
pub struct Cursor<T> {
    buffer: Vec<T>,
    source: Option<Box<dyn Iterator<Item = T> + Send>>,
    position: usize,
}

impl<T: Clone> Cursor<T> {
    /// Cursor over a fixed set of items
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            buffer: items,
            source: None,
            position: 0,
        }
    }

    /// Cursor reading from a source on demand
    pub fn from_source<I>(source: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        Self {
            buffer: Vec::new(),
            source: Some(Box::new(source)),
            position: 0,
        }
    }

    fn fill(&mut self) -> bool {
        while self.position >= self.buffer.len() {
            match self.source.as_mut().and_then(Iterator::next) {
                Some(item) => self.buffer.push(item),
                None => {
                    self.source = None;
                    return false;
                }
            }
        }
        true
    }

    /// Whether the cursor points at an item
    pub fn valid(&mut self) -> bool {
        self.fill()
    }

    /// The item under the cursor
    pub fn current(&mut self) -> Option<&T> {
        if self.fill() {
            self.buffer.get(self.position)
        } else {
            None
        }
    }

    /// Position of the item under the cursor
    pub fn key(&mut self) -> Option<usize> {
        self.fill().then_some(self.position)
    }

    /// Move to the next item and return it
    pub fn advance(&mut self) -> Option<&T> {
        if self.fill() {
            self.position += 1;
        }
        self.current()
    }

    /// Go back to the first item
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<T: Clone> Iterator for Cursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if !self.fill() {
            return None;
        }
        let item = self.buffer.get(self.position).cloned();
        self.position += 1;
        item
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("buffered", &self.buffer.len())
            .field("position", &self.position)
            .field("streaming", &self.source.is_some())
            .finish()
    }
}
