// Everything the middle layer owns: the pattern, the voices and their
// parameters, the transport, the sequencer and the knobs.

pub mod controller;
pub mod effects;
pub mod pattern;
pub mod sequencer;
pub mod session;
pub mod transport;
pub mod voices;
