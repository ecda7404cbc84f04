pub mod dispatcher;
pub mod receiver;

pub use dispatcher::BufferDispatcher;
pub use receiver::{BufferReceiver, ReadStatus};

use std::time::Duration;

pub const DEFAULT_MAX_CAPACITY: usize = 500;
pub const DEFAULT_CAPACITY_INCREMENT: usize = 100;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
