//! Filter sets that can be installed on a [`FilterManager`](crate::FilterManager).

pub mod meta;
