//! Hardware drivers: motor H-bridge bank, GPIO init shims, and the
//! core-pinned thread spawn helper.

pub mod hw_init;
pub mod motor;
pub mod task_pin;
