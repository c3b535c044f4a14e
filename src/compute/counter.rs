/// Monotonic call counter owned by the computation that reports it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counter {
    value: u64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new value.
    pub fn increase(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    pub fn get(&self) -> u64 {
        self.value
    }
}
