//! Identifiers for core entities.

use serde::{Deserialize, Serialize};

/// Stable identity of a character instance (assigned by the host).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

/// Index of an attachment socket within an instance's attachment map.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SocketIndex(pub u32);
