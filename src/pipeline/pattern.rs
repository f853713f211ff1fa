// The track x step grid. Each cell holds at most one note; the dimensions are
// fixed for the life of the process, only the contents change.

use crate::error::CoreError;
use crate::shared::{Note, STEP_COUNT, TRACK_COUNT};

#[derive(Clone, Debug, PartialEq)]
pub struct PatternGrid {
    cells: [[Option<Note>; STEP_COUNT]; TRACK_COUNT],
}

impl Default for PatternGrid {
    fn default() -> Self {
        Self {
            cells: [[None; STEP_COUNT]; TRACK_COUNT],
        }
    }
}

impl PatternGrid {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn cell(&self, track: usize, step: usize) -> Result<Option<Note>, CoreError> {
        self.cells
            .get(track)
            .and_then(|row| row.get(step))
            .copied()
            .ok_or(CoreError::InvalidIndex { track, step })
    }

    // Same note clears the cell, anything else (empty or a different note)
    // overwrites it. Returns what the cell holds afterwards.
    pub fn toggle_cell(&mut self, track: usize, step: usize, note: Note) -> Result<Option<Note>, CoreError> {
        let cell = self
            .cells
            .get_mut(track)
            .and_then(|row| row.get_mut(step))
            .ok_or(CoreError::InvalidIndex { track, step })?;

        *cell = if *cell == Some(note) { None } else { Some(note) };
        Ok(*cell)
    }

    pub fn clear_all(&mut self) {
        for row in &mut self.cells {
            row.fill(None);
        }
    }

    // the non-empty cells of one column, in track order
    pub fn read_step(&self, step: usize) -> Vec<(usize, Note)> {
        if step >= STEP_COUNT {
            return Vec::new();
        }
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(track, row)| row[step].map(|note| (track, note)))
            .collect()
    }

    // every filled cell as (track, step, note)
    pub fn filled(&self) -> impl Iterator<Item = (usize, usize, Note)> + '_ {
        self.cells.iter().enumerate().flat_map(|(track, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(step, cell)| cell.map(|note| (track, step, note)))
        })
    }

    pub fn rows(&self) -> &[[Option<Note>; STEP_COUNT]; TRACK_COUNT] {
        &self.cells
    }
}
