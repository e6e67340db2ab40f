//! Passive, read-only observer for a UDP game-client protocol: reconstructs
//! a live world model (observers, loot, corpses) by demultiplexing captured
//! datagrams and replaying their application-level effects onto a shared
//! world snapshot.

pub mod bitstream;
pub mod descriptor;
pub mod dispatch;
pub mod loot_db;
pub mod pipeline;
pub mod session;
pub mod unet;
pub mod util;
pub mod world;
