//! Core type definitions using newtype patterns for type safety.
//!
//! These types make invalid port numbers and unresolvable ranges
//! unrepresentable once configuration has been accepted.

mod port;
mod target;

pub use port::{resolve, Port, PortRange, RangeSpec};
pub use target::{Protocol, Target, Transport};
