// Storage-agnostic engine core: rows, values, indexes, planning, and the memory store.
pub mod condition;
pub mod error;
pub mod index;
pub mod memory;
pub mod plan;
pub mod row;
pub mod store;
pub mod value;
