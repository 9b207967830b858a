/// Depth beyond which chain re-organizations are assumed not to occur
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationDepth {
    value: u64,
}

impl ConfirmationDepth {
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Returns `None` while the chain is still shallower than the depth itself
    pub fn deduct_from(&self, block_number: u64) -> Option<u64> {
        block_number.checked_sub(self.value)
    }

    pub fn is_final(&self, block_number: u64, current_block_number: u64) -> bool {
        self.deduct_from(current_block_number)
            .is_some_and(|finalized_head| block_number <= finalized_head)
    }
}
