/// Mutex-guarded state of the channel: at most one value awaiting consumption.
pub struct Slot<T> {
    pub value: Option<T>,
}

impl<T> Slot<T> {
    pub fn empty() -> Self {
        Self { value: None }
    }

    pub fn is_occupied(&self) -> bool {
        self.value.is_some()
    }
}
