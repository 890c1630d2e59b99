pub mod affinity;
pub mod aggregate;
pub mod az;
pub mod cpu;
pub mod disk;
pub mod diversity;
pub mod dynamic_aggregate;
pub mod exclusivity;
pub mod mem;
pub mod no_exclusivity;
pub mod numa;
pub mod quorum_diversity;
pub mod utils;
