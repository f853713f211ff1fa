// Terminal projection: reads DisplayState, raises InputEvents. Owns no
// sequencer state of its own beyond cursor and selection.

pub mod grid;
pub mod input;
pub mod mode;
pub mod view;
