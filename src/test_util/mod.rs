//! This module contains utilities that are useful for testing code based on the HotStuff
//!  transport. They are used for testing the transport itself, but they are also exported for
//!  testing consensus engines built on top of it.

pub mod node;
pub mod message;
