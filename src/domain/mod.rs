// Domain layer: location records, run settings, state table and ports.

pub mod model;
pub mod ports;
pub mod settings;
pub mod states;
