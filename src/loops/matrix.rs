//! Loop matrix
//!
//! A grid of loops where each row and each column is a lane that can be
//! locked. A locked lane plays at most one loop: pressing a cell first
//! stops whatever plays in its locked row and column. Columns start
//! locked, rows unlocked. All cells share one loop clock.

use log::debug;

use crate::engine::graph::{AudioGraph, Time};
use crate::engine::session::AudioSession;
use crate::error::{LoopLabError, Result};
use crate::loops::clock::LoopClock;
use crate::loops::player::Loop;
use crate::meter::IntensityMapping;

/// Grid position, (row, column)
pub type Cell = (usize, usize);

/// Pan of column `col` in a matrix of `cols` columns, centered
///
/// With a step of 0.4 four columns sit at -0.6, -0.2, 0.2 and 0.6.
pub fn column_pan(col: usize, cols: usize, step: f32) -> f32 {
    let center = (cols.saturating_sub(1)) as f32 / 2.0;
    ((col as f32 - center) * step).clamp(-1.0, 1.0)
}

/// A row or column of the matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lane {
    locked: bool,
    /// Playing cells in the order they started
    active: Vec<Cell>,
}

impl Lane {
    fn new(locked: bool) -> Self {
        Self {
            locked,
            active: Vec::new(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn active(&self) -> &[Cell] {
        &self.active
    }

    fn remove(&mut self, cell: Cell) {
        self.active.retain(|&c| c != cell);
    }
}

#[derive(Debug)]
pub struct LoopMatrix {
    cells: Vec<Vec<Option<Loop>>>,
    rows: Vec<Lane>,
    cols: Vec<Lane>,
    clock: LoopClock,
    mapping: IntensityMapping,
}

impl LoopMatrix {
    /// Build a matrix; empty cells are `None`
    ///
    /// # Errors
    /// `InvalidConfig` if the rows differ in length.
    pub fn new(cells: Vec<Vec<Option<Loop>>>) -> Result<Self> {
        let num_cols = cells.first().map_or(0, Vec::len);
        if let Some(row) = cells.iter().position(|r| r.len() != num_cols) {
            return Err(LoopLabError::InvalidConfig {
                reason: format!(
                    "matrix row {} has {} cells, expected {}",
                    row,
                    cells[row].len(),
                    num_cols
                ),
            });
        }

        Ok(Self {
            rows: vec![Lane::new(false); cells.len()],
            cols: vec![Lane::new(true); num_cols],
            cells,
            clock: LoopClock::new(),
            mapping: IntensityMapping::BUTTON,
        })
    }

    /// Spread the columns across the stereo field
    pub fn with_column_pan(mut self, step: f32) -> Self {
        let num_cols = self.num_cols();
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(j, cell)| cell.map(|lp| lp.with_pan(column_pan(j, num_cols, step))))
                    .collect()
            })
            .collect();
        self
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn row(&self, row: usize) -> Option<&Lane> {
        self.rows.get(row)
    }

    pub fn col(&self, col: usize) -> Option<&Lane> {
        self.cols.get(col)
    }

    pub fn get(&self, (row, col): Cell) -> Option<&Loop> {
        self.cells.get(row)?.get(col)?.as_ref()
    }

    pub fn clock(&self) -> &LoopClock {
        &self.clock
    }

    pub fn is_active(&self, cell: Cell) -> bool {
        self.get(cell).map_or(false, Loop::is_playing)
    }

    /// Playing cells, row by row
    pub fn active(&self) -> Vec<Cell> {
        self.rows.iter().flat_map(|lane| lane.active.iter().copied()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.rows.iter().map(|lane| lane.active.len()).sum()
    }

    /// Press a cell; returns whether it plays afterwards
    ///
    /// Pressing an empty cell does nothing.
    pub fn press<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        cell: Cell,
    ) -> Result<bool> {
        session.activate()?;
        let graph = session.graph_mut()?;
        self.check_cell(cell)?;

        let (row, col) = cell;
        let Some(lp) = self.cells[row][col].as_ref() else {
            return Ok(false);
        };

        let now = graph.current_time();
        let playing = if lp.is_playing() {
            self.stop_cell(graph, now, cell);
            false
        } else {
            let sync = self.active_count() > 0;
            if self.rows[row].locked {
                let others = self.rows[row].active.clone();
                self.stop_lane(graph, now, others);
            }
            if self.cols[col].locked {
                let others = self.cols[col].active.clone();
                self.stop_lane(graph, now, others);
            }

            if let Some(lp) = self.cells[row][col].as_mut() {
                lp.start(graph, &mut self.clock, now, sync);
            }
            self.rows[row].active.push(cell);
            self.cols[col].active.push(cell);
            true
        };

        self.settle();
        Ok(playing)
    }

    /// Toggle a row lock; returns whether the row is locked afterwards
    ///
    /// Locking keeps the first loop that started in the row and stops the
    /// others.
    pub fn toggle_row_lock<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        row: usize,
    ) -> Result<bool> {
        if row >= self.rows.len() {
            return Err(LoopLabError::IndexOutOfRange {
                what: "row",
                index: row,
                len: self.rows.len(),
            });
        }
        session.activate()?;
        let graph = session.graph_mut()?;
        let now = graph.current_time();

        let lane = &mut self.rows[row];
        lane.locked = !lane.locked;
        let locked = lane.locked;
        if locked {
            let extra = lane.active.iter().skip(1).copied().collect();
            self.stop_lane(graph, now, extra);
        }

        debug!("[MATRIX] row {} {}", row, if locked { "locked" } else { "unlocked" });
        self.settle();
        Ok(locked)
    }

    /// Toggle a column lock; returns whether the column is locked afterwards
    pub fn toggle_col_lock<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        col: usize,
    ) -> Result<bool> {
        if col >= self.cols.len() {
            return Err(LoopLabError::IndexOutOfRange {
                what: "column",
                index: col,
                len: self.cols.len(),
            });
        }
        session.activate()?;
        let graph = session.graph_mut()?;
        let now = graph.current_time();

        let lane = &mut self.cols[col];
        lane.locked = !lane.locked;
        let locked = lane.locked;
        if locked {
            let extra = lane.active.iter().skip(1).copied().collect();
            self.stop_lane(graph, now, extra);
        }

        debug!("[MATRIX] column {} {}", col, if locked { "locked" } else { "unlocked" });
        self.settle();
        Ok(locked)
    }

    /// Button opacity of every playing cell
    pub fn intensities<G: AudioGraph>(
        &mut self,
        session: &AudioSession<G>,
    ) -> Result<Vec<(Cell, f32)>> {
        let graph = session.graph()?;
        let mapping = self.mapping;
        let mut levels = Vec::new();
        for cell in self.active() {
            if let Some(lp) = self.cells[cell.0][cell.1].as_mut() {
                if let Some(rms) = lp.intensity(graph) {
                    levels.push((cell, mapping.map(rms)));
                }
            }
        }
        Ok(levels)
    }

    fn check_cell(&self, (row, col): Cell) -> Result<()> {
        if row >= self.rows.len() {
            return Err(LoopLabError::IndexOutOfRange {
                what: "row",
                index: row,
                len: self.rows.len(),
            });
        }
        if col >= self.cols.len() {
            return Err(LoopLabError::IndexOutOfRange {
                what: "column",
                index: col,
                len: self.cols.len(),
            });
        }
        Ok(())
    }

    fn stop_lane<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, now: Time, cells: Vec<Cell>) {
        for cell in cells {
            self.stop_cell(graph, now, cell);
        }
    }

    fn stop_cell<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, now: Time, cell: Cell) {
        let (row, col) = cell;
        if let Some(lp) = self.cells[row][col].as_mut() {
            lp.stop(graph, now);
        }
        self.rows[row].remove(cell);
        self.cols[col].remove(cell);
    }

    fn settle(&mut self) {
        if self.active_count() == 0 {
            self.clock.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBuffer, OfflineGraph};
    use approx::assert_relative_eq;

    fn matrix(rows: usize, cols: usize) -> LoopMatrix {
        let cells = (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| {
                        let buffer = AudioBuffer::mono(vec![0.1; 2000], 1000).unwrap();
                        Some(Loop::new(buffer, 2.0).unwrap())
                    })
                    .collect()
            })
            .collect();
        LoopMatrix::new(cells).unwrap()
    }

    fn session() -> AudioSession<OfflineGraph> {
        AudioSession::new(OfflineGraph::new(1000))
    }

    #[test]
    fn test_column_pan() {
        let pans: Vec<f32> = (0..4).map(|j| column_pan(j, 4, 0.4)).collect();
        for (pan, expected) in pans.iter().zip([-0.6, -0.2, 0.2, 0.6]) {
            assert_relative_eq!(*pan, expected, epsilon = 1e-6);
        }
        assert_eq!(column_pan(0, 1, 0.4), 0.0);
    }

    #[test]
    fn test_default_locks() {
        let matrix = matrix(2, 3);
        assert!(!matrix.row(0).unwrap().is_locked());
        assert!(matrix.col(2).unwrap().is_locked());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let buffer = AudioBuffer::mono(vec![0.1; 10], 1000).unwrap();
        let lp = || Some(Loop::from_buffer(buffer.clone()).unwrap());
        let err = LoopMatrix::new(vec![vec![lp(), lp()], vec![lp()]]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_locked_column_keeps_one_loop() {
        let mut session = session();
        let mut matrix = matrix(3, 2);

        assert!(matrix.press(&mut session, (0, 0)).unwrap());
        session.graph_mut().unwrap().render_to(0.5);
        assert!(matrix.press(&mut session, (1, 0)).unwrap());

        assert!(!matrix.is_active((0, 0)));
        assert!(matrix.is_active((1, 0)));
        // The clock survives the swap within one press
        assert_eq!(matrix.clock().origin(), Some(0.0));
        let phase = matrix.get((1, 0)).unwrap().phase_at(0.5).unwrap();
        assert_relative_eq!(phase, 0.5);
    }

    #[test]
    fn test_unlocked_row_allows_many() {
        let mut session = session();
        let mut matrix = matrix(2, 3);
        matrix.press(&mut session, (0, 0)).unwrap();
        matrix.press(&mut session, (0, 1)).unwrap();
        matrix.press(&mut session, (0, 2)).unwrap();
        assert_eq!(matrix.active(), vec![(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn test_locking_row_keeps_first() {
        let mut session = session();
        let mut matrix = matrix(2, 3);
        matrix.press(&mut session, (0, 1)).unwrap();
        matrix.press(&mut session, (0, 0)).unwrap();
        matrix.press(&mut session, (0, 2)).unwrap();

        assert!(matrix.toggle_row_lock(&mut session, 0).unwrap());
        assert_eq!(matrix.active(), vec![(0, 1)]);

        assert!(!matrix.toggle_row_lock(&mut session, 0).unwrap());
        assert!(!matrix.toggle_col_lock(&mut session, 1).unwrap());
    }

    #[test]
    fn test_press_playing_cell_stops_it() {
        let mut session = session();
        let mut matrix = matrix(1, 1);
        matrix.press(&mut session, (0, 0)).unwrap();
        assert!(!matrix.press(&mut session, (0, 0)).unwrap());
        assert_eq!(matrix.active_count(), 0);
        assert!(!matrix.clock().is_established());
    }

    #[test]
    fn test_empty_cell_and_bounds() {
        let mut session = session();
        let mut matrix = LoopMatrix::new(vec![vec![None]]).unwrap();
        assert!(!matrix.press(&mut session, (0, 0)).unwrap());

        let err = matrix.press(&mut session, (0, 3)).unwrap_err();
        assert_eq!(err.error_code(), "INDEX_OUT_OF_RANGE");
        assert!(matrix.toggle_row_lock(&mut session, 4).is_err());
    }

    #[test]
    fn test_column_pan_applied_to_loops() {
        let matrix = matrix(1, 4).with_column_pan(0.4);
        assert_relative_eq!(matrix.get((0, 3)).unwrap().pan().unwrap(), 0.6, epsilon = 1e-6);
    }
}
