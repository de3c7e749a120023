/// Default number of captures drained into one detector batch
pub const DEFAULT_BATCH_SIZE: usize = 12;
